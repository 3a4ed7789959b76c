//! Test doubles shared by the unit tests.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use serde_json::json;

use crate::analyze::{CellAnalysis, SyntaxError};
use crate::error::{Error, Result};
use crate::execute::{
    Exception, ExecutionOutcome, ExecutionRequest, Executor, Output, RunContext,
};
use crate::graph::{Cell, CellId, VariableKind};
use crate::state::{Namespace, Value};

/// Build a cell defining `def` and reading `refs`.
pub fn cell(id: usize, def: &str, refs: &[&str]) -> Cell {
    let analysis = CellAnalysis::new()
        .with_defs([def])
        .with_refs(refs.iter().copied());
    Cell::new(CellId::new(id), format!("{} <- {:?}", def, refs), analysis)
}

/// Analyzer for a token notation: `def:x ref:y del:z`.
///
/// A token `!` makes the code a syntax error.
pub fn token_analyzer(code: &str) -> std::result::Result<CellAnalysis, SyntaxError> {
    let mut analysis = CellAnalysis::new();
    for token in code.split_whitespace() {
        if token == "!" {
            return Err(SyntaxError::new("unexpected '!'"));
        }
        match token.split_once(':') {
            Some(("def", name)) => analysis.define(name, VariableKind::Variable),
            Some(("ref", name)) => {
                analysis.refs.insert(name.to_string());
            }
            Some(("del", name)) => {
                analysis.deleted_refs.insert(name.to_string());
            }
            _ => return Err(SyntaxError::new(format!("bad token '{}'", token))),
        }
    }
    Ok(analysis)
}

#[derive(Debug, Clone)]
enum Script {
    Raise(String),
    Stop,
    Interrupt,
    Fail,
    /// Bind every def to a fresh state.
    CreateState,
    /// Bind defs as usual, then write the state bound to this name.
    WriteState(String),
}

/// Executor that binds every def and follows a per-cell script.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: FxHashMap<usize, Script>,
    pub executed: Vec<CellId>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise_on(mut self, id: usize, type_name: &str) -> Self {
        self.scripts.insert(id, Script::Raise(type_name.to_string()));
        self
    }

    pub fn stop_on(mut self, id: usize) -> Self {
        self.scripts.insert(id, Script::Stop);
        self
    }

    pub fn interrupt_on(mut self, id: usize) -> Self {
        self.scripts.insert(id, Script::Interrupt);
        self
    }

    pub fn fail_on(mut self, id: usize) -> Self {
        self.scripts.insert(id, Script::Fail);
        self
    }

    pub fn create_state_on(mut self, id: usize) -> Self {
        self.scripts.insert(id, Script::CreateState);
        self
    }

    pub fn write_state_on(mut self, id: usize, name: &str) -> Self {
        self.scripts.insert(id, Script::WriteState(name.to_string()));
        self
    }

    pub fn clear_script(&mut self, id: usize) {
        self.scripts.remove(&id);
    }

    pub fn executed_set(&self) -> BTreeSet<CellId> {
        self.executed.iter().copied().collect()
    }
}

impl Executor for ScriptedExecutor {
    fn execute(
        &mut self,
        request: &ExecutionRequest<'_>,
        namespace: &mut Namespace,
        ctx: &mut RunContext<'_>,
    ) -> Result<ExecutionOutcome> {
        let id = request.cell_id;
        match self.scripts.get(&id.as_usize()) {
            Some(Script::Fail) => {
                return Err(Error::ExecutorUnavailable("scripted failure".into()));
            }
            Some(Script::Raise(type_name)) => {
                self.executed.push(id);
                return Ok(ExecutionOutcome::Raised(Exception::new(type_name.clone(), "")));
            }
            Some(Script::Interrupt) => {
                self.executed.push(id);
                return Ok(ExecutionOutcome::Interrupted);
            }
            Some(Script::Stop) => {
                self.executed.push(id);
                return Ok(ExecutionOutcome::Stopped(Some(Output::text("stopped"))));
            }
            Some(Script::CreateState) => {
                self.executed.push(id);
                for name in request.defs {
                    let state = ctx.create_state(json!(0));
                    namespace.insert(name.clone(), Value::State(state));
                }
                return Ok(ExecutionOutcome::Completed(None));
            }
            Some(Script::WriteState(_)) | None => {}
        }

        self.executed.push(id);
        let runs = self.executed.iter().filter(|&&c| c == id).count();
        for name in request.defs {
            namespace.insert(name.clone(), json!({"cell": id.as_usize(), "run": runs}));
        }
        if let Some(Script::WriteState(name)) = self.scripts.get(&id.as_usize())
            && let Some(state) = namespace.get(name).and_then(Value::as_state)
        {
            ctx.set_state(state, json!(runs))?;
        }
        Ok(ExecutionOutcome::Completed(None))
    }
}
