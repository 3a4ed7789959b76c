//! The reactive kernel.
//!
//! [`Kernel`] is the single entry point front ends talk to. Every request
//! runs to completion, including the follow-up passes triggered by state
//! writes, before the next one is accepted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::analyze::Analyzer;
use crate::config::KernelConfig;
use crate::console::ConsoleHandle;
use crate::error::{Error, Result};
use crate::events::{Notification, NotificationSink, VariableDeclaration};
use crate::execute::{
    CellError, ExecutionError, Executor, InterruptHandle, RunEnv, RunReport, Runner,
};
use crate::graph::{CellConfig, CellId, CellStatus, DependencyGraph};
use crate::mutate::{MutationBatch, Orchestrator};
use crate::state::{
    self, BindingProvider, Bindings, ElementId, ElementRegistry, Namespace, StateId,
    StateRegistry, StateWrite, Value, WriteOrigin,
};

/// A reactive notebook kernel.
pub struct Kernel {
    config: KernelConfig,
    graph: DependencyGraph,
    orchestrator: Orchestrator,
    namespace: Namespace,
    states: StateRegistry,
    elements: ElementRegistry,
    execution_errors: BTreeMap<CellId, ExecutionError>,
    analyzer: Box<dyn Analyzer + Send>,
    executor: Box<dyn Executor>,
    sink: Arc<dyn NotificationSink>,
    interrupt: InterruptHandle,
    console: Option<ConsoleHandle>,
    /// Set once the executor reported it can no longer run cells.
    failed: bool,
}

impl Kernel {
    pub fn new(
        config: KernelConfig,
        analyzer: impl Analyzer + Send + 'static,
        executor: impl Executor + 'static,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            graph: DependencyGraph::new(),
            orchestrator: Orchestrator::new(),
            namespace: Namespace::new(),
            states: StateRegistry::new(),
            elements: ElementRegistry::new(),
            execution_errors: BTreeMap::new(),
            analyzer: Box::new(analyzer),
            executor: Box::new(executor),
            sink,
            interrupt: InterruptHandle::new(),
            console: None,
            failed: false,
        })
    }

    /// Route cell console output through `console`.
    pub fn with_console(mut self, console: ConsoleHandle) -> Self {
        self.console = Some(console);
        self
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn states(&self) -> &StateRegistry {
        &self.states
    }

    pub fn elements(&self) -> &ElementRegistry {
        &self.elements
    }

    /// Handle that interrupts the pass currently running.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Whether the kernel can still run cells.
    pub fn is_alive(&self) -> bool {
        !self.failed
    }

    pub fn status(&self, id: CellId) -> Option<CellStatus> {
        self.graph.get(id).map(|c| c.status)
    }

    pub fn is_stale(&self, id: CellId) -> bool {
        self.graph.get(id).is_some_and(|c| c.stale)
    }

    /// Configuration of a cell, including cells held back by syntax errors.
    pub fn cell_config(&self, id: CellId) -> Option<CellConfig> {
        self.orchestrator.config(&self.graph, id)
    }

    /// Every error currently shown on a cell.
    pub fn cell_errors(&self, id: CellId) -> Vec<CellError> {
        let mut errors: Vec<CellError> = self
            .orchestrator
            .errors_for(id)
            .iter()
            .cloned()
            .map(CellError::from)
            .collect();
        if let Some(error) = self.execution_errors.get(&id) {
            errors.push(error.clone().into());
        }
        errors
    }

    /// Errors of every cell that has any.
    pub fn errors(&self) -> BTreeMap<CellId, Vec<CellError>> {
        let ids: BTreeSet<CellId> = self
            .orchestrator
            .errored_cells()
            .into_iter()
            .chain(self.execution_errors.keys().copied())
            .collect();
        ids.into_iter().map(|id| (id, self.cell_errors(id))).collect()
    }

    /// Current value of a name, with state and element handles resolved.
    pub fn value(&self, name: &str) -> Option<serde_json::Value> {
        match self.namespace.get(name)? {
            Value::Data(value) => Some(value.clone()),
            Value::State(id) => self.states.value(*id).ok().cloned(),
            Value::Element(id) => self.elements.value(*id).ok(),
        }
    }

    /// Declared variables with their definers and readers.
    pub fn variables(&self) -> Vec<VariableDeclaration> {
        self.graph
            .definitions()
            .into_iter()
            .map(|(name, definers)| VariableDeclaration {
                name: name.clone(),
                declared_by: definers.iter().copied().collect(),
                used_by: self.graph.referring_cells(name).into_iter().collect(),
            })
            .collect()
    }

    /// Register and delete cells, then run what the change affects.
    pub fn run(&mut self, batch: MutationBatch) -> Result<RunReport> {
        self.begin()?;
        if batch.is_empty() {
            return Ok(RunReport::default());
        }

        let outcome = self
            .orchestrator
            .apply(&mut self.graph, self.analyzer.as_ref(), batch);

        for (id, defs) in &outcome.invalidate {
            state::release_cell(
                &mut self.namespace,
                &mut self.states,
                &mut self.elements,
                *id,
                defs,
                &outcome.keep,
            );
        }
        for id in &outcome.deleted {
            self.execution_errors.remove(id);
        }
        for (id, errors) in outcome.changed_errors {
            if !errors.is_empty() {
                self.execution_errors.remove(&id);
            }
            self.sink.notify(Notification::CellErrored {
                cell_id: id,
                errors: errors.into_iter().map(CellError::from).collect(),
            });
        }
        self.sink.notify(Notification::VariablesChanged {
            variables: self.variables(),
        });

        self.dispatch(outcome.run_set, &outcome.registered)
    }

    /// Register or replace cells.
    pub fn run_cells<I, S>(&mut self, cells: I) -> Result<RunReport>
    where
        I: IntoIterator<Item = (CellId, S)>,
        S: Into<String>,
    {
        let batch = cells
            .into_iter()
            .fold(MutationBatch::new(), |batch, (id, code)| batch.register(id, code));
        self.run(batch)
    }

    /// Delete cells.
    pub fn delete(&mut self, ids: impl IntoIterator<Item = CellId>) -> Result<RunReport> {
        let batch = ids
            .into_iter()
            .fold(MutationBatch::new(), |batch, id| batch.delete(id));
        self.run(batch)
    }

    /// Change a cell's configuration.
    ///
    /// Re-enabling a cell runs the stale cells it was blocking.
    pub fn set_cell_config(&mut self, id: CellId, config: CellConfig) -> Result<RunReport> {
        self.begin()?;
        let Some(cell) = self.graph.get(id) else {
            return if self.orchestrator.set_detached_config(id, config) {
                Ok(RunReport::default())
            } else {
                Err(Error::CellNotFound(id))
            };
        };

        let was_disabled = cell.config.disabled;
        if config.disabled == was_disabled {
            return Ok(RunReport::default());
        }

        if config.disabled {
            for descendant in self.graph.disable(id)? {
                self.notify_status(descendant);
            }
            Ok(RunReport::default())
        } else {
            for restored in self.graph.enable(id)? {
                self.notify_status(restored);
            }
            let stale: BTreeSet<CellId> = self
                .graph
                .transitive_closure(&BTreeSet::from([id]))
                .into_iter()
                .filter(|&c| self.is_stale(c) && !self.orchestrator.has_errors(c))
                .collect();
            let run_set = self.expand(&stale);
            self.dispatch(run_set, &stale)
        }
    }

    /// Run every stale cell and what depends on it.
    pub fn run_stale(&mut self) -> Result<RunReport> {
        self.begin()?;
        let stale: BTreeSet<CellId> = self
            .graph
            .stale_cells()
            .into_iter()
            .filter(|&c| !self.orchestrator.has_errors(c))
            .collect();
        let run_set = self.expand(&stale);
        let mut report = self.run_pass(&run_set)?;
        let follow_up = self.propagate_state_writes(report.interrupted)?;
        report.merge(follow_up);
        Ok(report)
    }

    /// Apply front-end updates to UI elements and re-run their readers.
    ///
    /// Updates to elements that no longer exist are ignored.
    pub fn set_ui_element_values<I>(&mut self, updates: I) -> Result<RunReport>
    where
        I: IntoIterator<Item = (ElementId, serde_json::Value)>,
    {
        self.begin()?;
        let mut roots = BTreeSet::new();
        for (id, value) in updates {
            let bindings = Bindings {
                elements: &self.elements,
                namespace: &self.namespace,
            };
            let (source, resolved) = match bindings.resolve_view(id, value) {
                Ok(resolved) => resolved,
                Err(Error::UnknownElement(_)) => {
                    tracing::warn!(element = %id, "Ignoring update for unknown UI element");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let names = bindings.bound_names(source);
            self.elements.set_value(source, resolved)?;

            for name in &names {
                let definers = self.graph.defining_cells(name);
                roots.extend(
                    self.graph
                        .referring_cells(name)
                        .into_iter()
                        .filter(|c| !definers.contains(c)),
                );
            }
        }

        let run_set = self.expand(&roots);
        self.dispatch(run_set, &roots)
    }

    /// Create a state owned by no cell.
    pub fn create_state(&mut self, initial: serde_json::Value) -> StateId {
        self.states
            .create(None, initial, self.config.allow_self_loops_by_default)
    }

    /// Write a state from outside any cell and re-run its readers.
    pub fn set_state(&mut self, id: StateId, value: serde_json::Value) -> Result<RunReport> {
        self.begin()?;
        self.states.set(id, value, WriteOrigin::External)?;
        self.propagate_state_writes(false)
    }

    /// Start a request: refuse if the kernel failed, and clear any interrupt
    /// left over from the previous one.
    fn begin(&self) -> Result<()> {
        if self.failed {
            return Err(Error::ExecutorUnavailable(
                "kernel stopped after an executor failure".to_string(),
            ));
        }
        self.interrupt.reset();
        Ok(())
    }

    fn notify_status(&self, id: CellId) {
        if let Some(status) = self.status(id) {
            self.sink.notify(Notification::CellStatusChanged {
                cell_id: id,
                status,
            });
        }
    }

    /// Transitive closure of `roots`, minus errored cells.
    fn expand(&self, roots: &BTreeSet<CellId>) -> BTreeSet<CellId> {
        self.graph
            .transitive_closure(roots)
            .into_iter()
            .filter(|&c| !self.orchestrator.has_errors(c))
            .collect()
    }

    fn mark_stale(&mut self, id: CellId) {
        if !self.graph.contains(id) {
            return;
        }
        if !self.is_stale(id) {
            self.graph.set_stale(id, true);
            self.sink.notify(Notification::CellStale {
                cell_id: id,
                stale: true,
            });
        }
        if self.status(id) != Some(CellStatus::DisabledTransitively) {
            self.graph.set_status(id, CellStatus::Stale);
            self.notify_status(id);
        }
    }

    /// Run `run_set`, or in lazy mode only its `requested` members with the
    /// rest marked stale. State writes made by the pass are followed up.
    fn dispatch(
        &mut self,
        run_set: BTreeSet<CellId>,
        requested: &BTreeSet<CellId>,
    ) -> Result<RunReport> {
        let to_run = if self.config.is_lazy() {
            let (run, deferred): (BTreeSet<CellId>, BTreeSet<CellId>) =
                run_set.into_iter().partition(|c| requested.contains(c));
            for id in deferred {
                self.mark_stale(id);
            }
            run
        } else {
            run_set
        };

        let mut report = self.run_pass(&to_run)?;
        let follow_up = self.propagate_state_writes(report.interrupted)?;
        report.merge(follow_up);
        Ok(report)
    }

    /// Re-run the readers of written states until no writes remain.
    ///
    /// Once a pass is interrupted no further pass starts; readers of writes
    /// still pending are marked stale instead.
    fn propagate_state_writes(&mut self, interrupted: bool) -> Result<RunReport> {
        let mut report = RunReport::default();
        let mut interrupted = interrupted;
        loop {
            let writes = self.states.drain_writes();
            if writes.is_empty() {
                break;
            }
            let roots = self.state_readers(&writes);
            let run_set = self.expand(&roots);
            interrupted |= self.interrupt.is_interrupted();
            if interrupted || self.config.is_lazy() {
                if interrupted {
                    tracing::debug!(cells = run_set.len(), "Deferring state readers after interrupt");
                }
                for id in run_set {
                    self.mark_stale(id);
                }
                continue;
            }
            let pass = self.run_pass(&run_set)?;
            interrupted = pass.interrupted;
            report.merge(pass);
        }
        Ok(report)
    }

    /// Cells reading a name bound to a written state.
    ///
    /// A cell does not re-trigger itself through its own write unless the
    /// state allows self loops.
    fn state_readers(&self, writes: &BTreeSet<StateWrite>) -> BTreeSet<CellId> {
        let mut readers = BTreeSet::new();
        for write in writes {
            let allow_self_loops = self.states.allows_self_loops(write.state).unwrap_or(false);
            for name in self.namespace.names_bound_to_state(write.state) {
                for reader in self.graph.referring_cells(&name) {
                    if write.origin.cell() == Some(reader) && !allow_self_loops {
                        tracing::debug!(
                            cell = %reader,
                            state = %write.state,
                            "Suppressing self-triggered run"
                        );
                        continue;
                    }
                    readers.insert(reader);
                }
            }
        }
        readers
    }

    fn run_pass(&mut self, cells: &BTreeSet<CellId>) -> Result<RunReport> {
        if cells.is_empty() {
            return Ok(RunReport::default());
        }
        let runner = Runner::new(&self.graph, cells);
        let mut env = RunEnv {
            graph: &mut self.graph,
            namespace: &mut self.namespace,
            states: &mut self.states,
            elements: &mut self.elements,
            executor: self.executor.as_mut(),
            sink: self.sink.as_ref(),
            interrupt: &self.interrupt,
            console: self.console.as_ref(),
            execution_errors: &mut self.execution_errors,
            allow_self_loops_by_default: self.config.allow_self_loops_by_default,
        };
        let result = runner.run(&mut env);
        if let Err(e) = &result
            && e.is_fatal()
        {
            tracing::error!("Kernel stopped: {}", e);
            self.failed = true;
        }
        result
    }
}
