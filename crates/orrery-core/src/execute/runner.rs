//! Run passes.
//!
//! A [`Runner`] executes one set of cells in topological order. Failures
//! propagate forward within the pass: descendants of a cell that raised or
//! stopped are cancelled, and an interrupt cancels everything still queued.

use std::collections::{BTreeMap, BTreeSet};

use crate::console::ConsoleHandle;
use crate::error::{Error, Result};
use crate::events::{Notification, NotificationSink};
use crate::graph::{CellId, CellStatus, DependencyGraph, Name};
use crate::state::{self, ElementRegistry, Namespace, StateRegistry};

use super::context::{InterruptHandle, RunContext};
use super::outcome::{ExecutionError, ExecutionOutcome};
use super::{ExecutionRequest, Executor};

/// Summary of one or more run passes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Cells handed to the executor, in execution order.
    pub ran: Vec<CellId>,
    /// Cells skipped because of an ancestor failure or an interrupt.
    pub cancelled: BTreeSet<CellId>,
    /// Cells not run because they are disabled, now marked stale.
    pub stale: BTreeSet<CellId>,
    /// Execution errors recorded in the pass, cancellations included.
    pub errors: BTreeMap<CellId, ExecutionError>,
    /// Whether the pass was interrupted.
    pub interrupted: bool,
}

impl RunReport {
    /// Fold a later pass into this one.
    pub fn merge(&mut self, other: RunReport) {
        self.ran.extend(other.ran);
        self.cancelled.extend(other.cancelled);
        self.stale.extend(other.stale);
        self.errors.extend(other.errors);
        self.interrupted |= other.interrupted;
    }

    /// Whether every scheduled cell ran without error.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && !self.interrupted
    }
}

/// Everything a pass reads and writes.
pub struct RunEnv<'a> {
    pub graph: &'a mut DependencyGraph,
    pub namespace: &'a mut Namespace,
    pub states: &'a mut StateRegistry,
    pub elements: &'a mut ElementRegistry,
    pub executor: &'a mut dyn Executor,
    pub sink: &'a dyn NotificationSink,
    pub interrupt: &'a InterruptHandle,
    pub console: Option<&'a ConsoleHandle>,
    pub execution_errors: &'a mut BTreeMap<CellId, ExecutionError>,
    pub allow_self_loops_by_default: bool,
}

enum Step {
    Completed,
    Raised { exception_type: String },
    Stopped,
    Interrupted,
}

impl RunEnv<'_> {
    fn set_status(&mut self, id: CellId, status: CellStatus) {
        self.graph.set_status(id, status);
        self.sink.notify(Notification::CellStatusChanged {
            cell_id: id,
            status,
        });
    }

    fn set_stale(&mut self, id: CellId, stale: bool) {
        let was_stale = self.graph.get(id).is_some_and(|c| c.stale);
        if was_stale != stale {
            self.graph.set_stale(id, stale);
            self.sink.notify(Notification::CellStale { cell_id: id, stale });
        }
    }

    fn defs_of(&self, id: CellId) -> BTreeSet<Name> {
        self.graph
            .get(id)
            .map(|c| c.defs.clone())
            .unwrap_or_default()
    }

    fn release(&mut self, id: CellId) {
        let defs = self.defs_of(id);
        state::release_cell(
            self.namespace,
            self.states,
            self.elements,
            id,
            &defs,
            &BTreeSet::new(),
        );
    }

    fn record_error(&mut self, id: CellId, error: ExecutionError, report: &mut RunReport) {
        self.sink.notify(Notification::CellErrored {
            cell_id: id,
            errors: vec![error.clone().into()],
        });
        self.execution_errors.insert(id, error.clone());
        report.errors.insert(id, error);
    }

    fn clear_error(&mut self, id: CellId) {
        if self.execution_errors.remove(&id).is_some() {
            self.sink.notify(Notification::CellErrored {
                cell_id: id,
                errors: Vec::new(),
            });
        }
    }

    fn cancel(&mut self, id: CellId, error: ExecutionError, report: &mut RunReport) {
        if !self.graph.contains(id) {
            return;
        }
        tracing::debug!(cell = %id, reason = %error.describe(), "Cancelling cell");
        self.release(id);
        self.set_status(id, CellStatus::Cancelled);
        self.record_error(id, error, report);
        report.cancelled.insert(id);
    }

    fn skip_disabled(&mut self, id: CellId, report: &mut RunReport) {
        let self_disabled = self.graph.get(id).is_some_and(|c| c.config.disabled);
        self.set_stale(id, true);
        let status = if self_disabled {
            CellStatus::Stale
        } else {
            CellStatus::DisabledTransitively
        };
        self.set_status(id, status);
        report.stale.insert(id);
    }

    fn execute(&mut self, id: CellId, report: &mut RunReport) -> Result<Step> {
        let cell = self.graph.get(id).ok_or(Error::CellNotFound(id))?;
        let code = cell.code.clone();
        let defs = cell.defs.clone();
        let refs = cell.refs.clone();

        self.release(id);
        self.clear_error(id);
        self.set_status(id, CellStatus::Running);

        let request = ExecutionRequest {
            cell_id: id,
            code: &code,
            defs: &defs,
            refs: &refs,
        };
        let mut ctx = RunContext::new(
            id,
            self.states,
            self.elements,
            self.interrupt,
            self.console,
            self.allow_self_loops_by_default,
        );
        let outcome = match self.executor.execute(&request, self.namespace, &mut ctx) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(cell = %id, "Executor failed: {}", e);
                self.set_status(id, CellStatus::Idle);
                return Err(e);
            }
        };
        report.ran.push(id);

        let step = match outcome {
            ExecutionOutcome::Completed(output) => {
                if let Some(output) = output {
                    self.sink.notify(Notification::CellOutput {
                        cell_id: id,
                        output,
                    });
                }
                for name in &defs {
                    if let Some(value) = self.namespace.get(name) {
                        self.sink.notify(Notification::VariableValue {
                            name: name.clone(),
                            value: value.clone(),
                            cell_id: id,
                        });
                    }
                }
                Step::Completed
            }
            ExecutionOutcome::Raised(exception) => {
                tracing::debug!(cell = %id, "Cell raised {}", exception);
                self.release(id);
                self.record_error(id, ExecutionError::from(&exception), report);
                Step::Raised {
                    exception_type: exception.type_name,
                }
            }
            ExecutionOutcome::Stopped(output) => {
                if let Some(output) = output {
                    self.sink.notify(Notification::CellOutput {
                        cell_id: id,
                        output,
                    });
                }
                self.release(id);
                Step::Stopped
            }
            ExecutionOutcome::Interrupted => {
                self.release(id);
                self.record_error(id, ExecutionError::Interrupted, report);
                Step::Interrupted
            }
        };

        self.set_stale(id, false);
        self.set_status(id, CellStatus::Idle);
        Ok(step)
    }
}

/// Executes one run set in dependency order.
#[derive(Debug, Clone)]
pub struct Runner {
    order: Vec<CellId>,
}

impl Runner {
    pub fn new(graph: &DependencyGraph, cells: &BTreeSet<CellId>) -> Self {
        Self {
            order: graph.topological_sort(cells),
        }
    }

    /// Execution order of the pass.
    pub fn order(&self) -> &[CellId] {
        &self.order
    }

    /// Run the pass.
    ///
    /// The interrupt flag is not cleared here; the kernel clears it once per
    /// request, so an interrupt raised between passes cancels the next one.
    ///
    /// Returns `Err` only when the executor reports it can no longer run
    /// cells; per-cell failures are recorded in the report.
    pub fn run(self, env: &mut RunEnv<'_>) -> Result<RunReport> {
        let mut report = RunReport::default();
        if self.order.is_empty() {
            return Ok(report);
        }

        tracing::info!(cells = self.order.len(), "Starting run pass");

        for &id in &self.order {
            env.set_status(id, CellStatus::Queued);
        }

        let run_set: BTreeSet<CellId> = self.order.iter().copied().collect();
        let mut pending_cancellations: BTreeMap<CellId, ExecutionError> = BTreeMap::new();

        for (index, &id) in self.order.iter().enumerate() {
            if !env.graph.contains(id) {
                continue;
            }

            if env.interrupt.is_interrupted() {
                report.interrupted = true;
                for &rest in &self.order[index..] {
                    env.cancel(rest, ExecutionError::Interrupted, &mut report);
                }
                break;
            }

            if let Some(error) = pending_cancellations.remove(&id) {
                env.cancel(id, error, &mut report);
                continue;
            }

            if env.graph.is_disabled(id) {
                env.skip_disabled(id, &mut report);
                continue;
            }

            let step = match env.execute(id, &mut report) {
                Ok(step) => step,
                Err(e) => {
                    for &rest in &self.order[index + 1..] {
                        env.set_status(rest, CellStatus::Idle);
                    }
                    return Err(e);
                }
            };

            let cancellation = match step {
                Step::Completed => None,
                Step::Raised { exception_type } => Some(ExecutionError::AncestorRaised {
                    raising_cell: id,
                    exception_type,
                }),
                Step::Stopped => Some(ExecutionError::AncestorStopped { stopping_cell: id }),
                Step::Interrupted => {
                    report.interrupted = true;
                    for &rest in &self.order[index + 1..] {
                        env.cancel(rest, ExecutionError::Interrupted, &mut report);
                    }
                    break;
                }
            };

            if let Some(error) = cancellation {
                for descendant in env.graph.descendants(id) {
                    if descendant != id && run_set.contains(&descendant) {
                        pending_cancellations
                            .entry(descendant)
                            .or_insert_with(|| error.clone());
                    }
                }
            }
        }

        tracing::info!(
            ran = report.ran.len(),
            cancelled = report.cancelled.len(),
            errors = report.errors.len(),
            interrupted = report.interrupted,
            "Run pass finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use crate::testing::{ScriptedExecutor, cell};

    struct Fixture {
        graph: DependencyGraph,
        namespace: Namespace,
        states: StateRegistry,
        elements: ElementRegistry,
        executor: ScriptedExecutor,
        sink: RecordingSink,
        interrupt: InterruptHandle,
        errors: BTreeMap<CellId, ExecutionError>,
    }

    impl Fixture {
        fn new(cells: Vec<crate::graph::Cell>, executor: ScriptedExecutor) -> Self {
            let mut graph = DependencyGraph::new();
            for c in cells {
                graph.register(c);
            }
            Self {
                graph,
                namespace: Namespace::new(),
                states: StateRegistry::new(),
                elements: ElementRegistry::new(),
                executor,
                sink: RecordingSink::new(),
                interrupt: InterruptHandle::new(),
                errors: BTreeMap::new(),
            }
        }

        fn run(&mut self, ids: &[usize]) -> Result<RunReport> {
            let cells: BTreeSet<CellId> = ids.iter().map(|&i| CellId::new(i)).collect();
            let runner = Runner::new(&self.graph, &cells);
            let mut env = RunEnv {
                graph: &mut self.graph,
                namespace: &mut self.namespace,
                states: &mut self.states,
                elements: &mut self.elements,
                executor: &mut self.executor,
                sink: &self.sink,
                interrupt: &self.interrupt,
                console: None,
                execution_errors: &mut self.errors,
                allow_self_loops_by_default: false,
            };
            runner.run(&mut env)
        }
    }

    fn chain() -> Vec<crate::graph::Cell> {
        vec![
            cell(0, "a", &[]),
            cell(1, "b", &["a"]),
            cell(2, "c", &["b"]),
        ]
    }

    #[test]
    fn test_runs_in_topological_order() {
        let mut fx = Fixture::new(chain(), ScriptedExecutor::new());
        let report = fx.run(&[2, 0, 1]).unwrap();

        assert_eq!(report.ran, vec![CellId::new(0), CellId::new(1), CellId::new(2)]);
        assert!(report.is_success());
        assert!(fx.namespace.contains("c"));
    }

    #[test]
    fn test_status_sequence_per_cell() {
        let mut fx = Fixture::new(chain(), ScriptedExecutor::new());
        fx.run(&[0]).unwrap();

        let statuses: Vec<CellStatus> = fx
            .sink
            .for_cell(CellId::new(0))
            .into_iter()
            .filter_map(|n| match n {
                Notification::CellStatusChanged { status, .. } => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![CellStatus::Queued, CellStatus::Running, CellStatus::Idle]
        );
    }

    #[test]
    fn test_raise_cancels_descendants() {
        let executor = ScriptedExecutor::new().raise_on(1, "ValueError");
        let mut fx = Fixture::new(chain(), executor);
        let report = fx.run(&[0, 1, 2]).unwrap();

        assert_eq!(report.ran, vec![CellId::new(0), CellId::new(1)]);
        assert_eq!(report.cancelled, BTreeSet::from([CellId::new(2)]));
        assert_eq!(
            report.errors[&CellId::new(2)],
            ExecutionError::AncestorRaised {
                raising_cell: CellId::new(1),
                exception_type: "ValueError".into(),
            }
        );
        assert_eq!(fx.graph.get(CellId::new(2)).unwrap().status, CellStatus::Cancelled);
        assert!(!fx.namespace.contains("b"));
        assert!(fx.namespace.contains("a"));
    }

    #[test]
    fn test_raise_marks_every_descendant_with_raising_cell() {
        let executor = ScriptedExecutor::new().raise_on(0, "KeyError");
        let mut fx = Fixture::new(chain(), executor);
        let report = fx.run(&[0, 1, 2]).unwrap();

        assert_eq!(
            report.errors[&CellId::new(0)],
            ExecutionError::ExceptionRaised {
                exception_type: "KeyError".into(),
                message: String::new(),
            }
        );
        for cancelled in [1, 2] {
            assert_eq!(
                report.errors[&CellId::new(cancelled)],
                ExecutionError::AncestorRaised {
                    raising_cell: CellId::new(0),
                    exception_type: "KeyError".into(),
                }
            );
        }
    }

    #[test]
    fn test_stop_cancels_descendants_but_keeps_output() {
        let executor = ScriptedExecutor::new().stop_on(0);
        let mut fx = Fixture::new(chain(), executor);
        let report = fx.run(&[0, 1, 2]).unwrap();

        assert_eq!(report.ran, vec![CellId::new(0)]);
        assert!(!report.errors.contains_key(&CellId::new(0)));
        assert_eq!(
            report.errors[&CellId::new(1)],
            ExecutionError::AncestorStopped {
                stopping_cell: CellId::new(0)
            }
        );
        assert!(fx.sink.for_cell(CellId::new(0)).iter().any(|n| matches!(n, Notification::CellOutput { .. })));
    }

    #[test]
    fn test_interrupt_cancels_remaining() {
        let executor = ScriptedExecutor::new().interrupt_on(1);
        let mut fx = Fixture::new(chain(), executor);
        let report = fx.run(&[0, 1, 2]).unwrap();

        assert!(report.interrupted);
        assert_eq!(report.errors[&CellId::new(1)], ExecutionError::Interrupted);
        assert_eq!(report.errors[&CellId::new(2)], ExecutionError::Interrupted);
        assert!(report.cancelled.contains(&CellId::new(2)));
    }

    #[test]
    fn test_disabled_cells_become_stale() {
        let mut fx = Fixture::new(chain(), ScriptedExecutor::new());
        fx.graph.disable(CellId::new(1)).unwrap();
        let report = fx.run(&[0, 1, 2]).unwrap();

        assert_eq!(report.ran, vec![CellId::new(0)]);
        assert_eq!(report.stale, BTreeSet::from([CellId::new(1), CellId::new(2)]));
        assert_eq!(fx.graph.get(CellId::new(1)).unwrap().status, CellStatus::Stale);
        assert_eq!(
            fx.graph.get(CellId::new(2)).unwrap().status,
            CellStatus::DisabledTransitively
        );
        assert!(fx.graph.get(CellId::new(2)).unwrap().stale);
    }

    #[test]
    fn test_rerun_clears_previous_error() {
        let executor = ScriptedExecutor::new().raise_on(0, "Boom");
        let mut fx = Fixture::new(chain(), executor);
        fx.run(&[0]).unwrap();
        assert!(fx.errors.contains_key(&CellId::new(0)));

        fx.executor.clear_script(0);
        fx.sink.take();
        fx.run(&[0]).unwrap();

        assert!(fx.errors.is_empty());
        assert!(fx.sink.snapshot().iter().any(|n| matches!(
            n,
            Notification::CellErrored { errors, .. } if errors.is_empty()
        )));
    }

    #[test]
    fn test_fatal_executor_error_propagates() {
        let executor = ScriptedExecutor::new().fail_on(1);
        let mut fx = Fixture::new(chain(), executor);
        let err = fx.run(&[0, 1, 2]).unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(fx.graph.get(CellId::new(2)).unwrap().status, CellStatus::Idle);
    }

    #[test]
    fn test_pending_interrupt_cancels_whole_pass() {
        let mut fx = Fixture::new(chain(), ScriptedExecutor::new());
        fx.interrupt.interrupt();
        let report = fx.run(&[0, 1, 2]).unwrap();

        assert!(report.interrupted);
        assert!(report.ran.is_empty());
        assert_eq!(report.cancelled.len(), 3);
        assert_eq!(report.errors[&CellId::new(0)], ExecutionError::Interrupted);
    }

    #[test]
    fn test_report_merge() {
        let mut first = RunReport {
            ran: vec![CellId::new(0)],
            ..RunReport::default()
        };
        let second = RunReport {
            ran: vec![CellId::new(1)],
            interrupted: true,
            ..RunReport::default()
        };
        first.merge(second);
        assert_eq!(first.ran.len(), 2);
        assert!(first.interrupted);
        assert!(!first.is_success());
    }
}
