//! In-process executor for calc cells.

use orrery_core::{
    Exception, ExecutionOutcome, ExecutionRequest, Executor, Namespace, Output, RunContext,
    Stream, Value,
};

use crate::eval::{EvalError, Scope, display, evaluate};
use crate::parser::{Expr, Statement, parse};

/// Runs calc cells directly against the kernel namespace.
///
/// Statements run top to bottom. The value of the last bare expression
/// becomes the cell's output. Long cells are checked for interrupts between
/// statements.
#[derive(Debug, Default, Clone, Copy)]
pub struct CalcExecutor;

impl CalcExecutor {
    pub fn new() -> Self {
        Self
    }
}

/// Names resolved through the namespace, with state and element handles
/// read from the running context.
struct CellScope<'s, 'c> {
    namespace: &'s Namespace,
    ctx: &'s RunContext<'c>,
}

impl Scope for CellScope<'_, '_> {
    fn lookup(&self, name: &str) -> Option<serde_json::Value> {
        match self.namespace.get(name)? {
            Value::Data(value) => Some(value.clone()),
            Value::State(id) => self.ctx.state_value(*id).ok().cloned(),
            Value::Element(id) => self.ctx.element_value(*id).ok(),
        }
    }
}

fn eval(
    expr: &Expr,
    namespace: &Namespace,
    ctx: &RunContext<'_>,
) -> Result<serde_json::Value, Exception> {
    evaluate(expr, &CellScope { namespace, ctx }).map_err(raised)
}

fn raised(error: EvalError) -> Exception {
    Exception::new(error.exception_type(), error.to_string())
}

fn runtime(error: orrery_core::Error) -> Exception {
    Exception::new("RuntimeError", error.to_string())
}

fn render(value: serde_json::Value) -> Output {
    Output {
        text: Some(display(&value)),
        json: Some(value),
    }
}

impl Executor for CalcExecutor {
    fn execute(
        &mut self,
        request: &ExecutionRequest<'_>,
        namespace: &mut Namespace,
        ctx: &mut RunContext<'_>,
    ) -> orrery_core::Result<ExecutionOutcome> {
        // The analyzer already accepted this code; a failure here means the
        // source changed underneath us.
        let program = match parse(request.code) {
            Ok(program) => program,
            Err(e) => {
                return Ok(ExecutionOutcome::Raised(Exception::new(
                    "SyntaxError",
                    e.message,
                )));
            }
        };

        let mut output = None;
        for line in &program.lines {
            if ctx.is_interrupted() {
                tracing::debug!(cell = %request.cell_id, line = line.number, "Interrupted");
                return Ok(ExecutionOutcome::Interrupted);
            }
            match run_statement(&line.statement, namespace, ctx) {
                Ok(Step::Continue) => {}
                Ok(Step::Output(value)) => output = Some(render(value)),
                Ok(Step::Stop) => return Ok(ExecutionOutcome::Stopped(output)),
                Err(exception) => {
                    tracing::debug!(
                        cell = %request.cell_id,
                        line = line.number,
                        "{}",
                        exception
                    );
                    return Ok(ExecutionOutcome::Raised(exception));
                }
            }
        }

        Ok(ExecutionOutcome::Completed(output))
    }
}

enum Step {
    Continue,
    Output(serde_json::Value),
    Stop,
}

fn run_statement(
    statement: &Statement,
    namespace: &mut Namespace,
    ctx: &mut RunContext<'_>,
) -> Result<Step, Exception> {
    match statement {
        Statement::Assign { name, expr } => {
            let value = eval(expr, namespace, ctx)?;
            namespace.insert(name.clone(), value);
        }
        Statement::Delete { name } => {
            if namespace.remove(name).is_none() {
                return Err(raised(EvalError::UndefinedName(name.clone())));
            }
        }
        Statement::Print { expr } => {
            let value = eval(expr, namespace, ctx)?;
            if let Err(e) = ctx.print(Stream::Stdout, format!("{}\n", display(&value))) {
                tracing::warn!(cell = %ctx.cell_id(), "Dropping console output: {}", e);
            }
        }
        Statement::Raise { kind, message } => {
            return Err(Exception::new(kind.clone(), message.clone()));
        }
        Statement::Stop => return Ok(Step::Stop),
        Statement::State {
            name,
            expr,
            allow_self_loops,
        } => {
            let value = eval(expr, namespace, ctx)?;
            let id = if *allow_self_loops {
                ctx.create_state_with(value, true)
            } else {
                ctx.create_state(value)
            };
            namespace.insert(name.clone(), Value::State(id));
        }
        Statement::Set { name, expr } => {
            let id = match namespace.get(name) {
                Some(Value::State(id)) => *id,
                Some(_) => {
                    return Err(raised(EvalError::Type(format!("'{}' is not a state", name))));
                }
                None => return Err(raised(EvalError::UndefinedName(name.clone()))),
            };
            let value = eval(expr, namespace, ctx)?;
            ctx.set_state(id, value).map_err(runtime)?;
        }
        Statement::Slider { name, expr } => {
            let value = eval(expr, namespace, ctx)?;
            let id = ctx.create_element(value);
            namespace.insert(name.clone(), Value::Element(id));
        }
        Statement::View { name, parent, key } => {
            let parent_id = match namespace.get(parent) {
                Some(Value::Element(id)) => *id,
                Some(_) => {
                    return Err(raised(EvalError::Type(format!(
                        "'{}' is not a UI element",
                        parent
                    ))));
                }
                None => return Err(raised(EvalError::UndefinedName(parent.clone()))),
            };
            let id = ctx.create_view(parent_id, key.clone()).map_err(runtime)?;
            namespace.insert(name.clone(), Value::Element(id));
        }
        Statement::Expr(expr) => return Ok(Step::Output(eval(expr, namespace, ctx)?)),
    }
    Ok(Step::Continue)
}
