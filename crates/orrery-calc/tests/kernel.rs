//! End-to-end kernel behavior driven by calc cells.

use std::sync::Arc;

use orrery_core::{
    CellConfig, CellError, CellId, CellStatus, ConsoleRouter, ElementId, ExecutionError,
    GraphError, Kernel, KernelConfig, MutationBatch, Notification, RecordingSink, Stream, Value,
};
use serde_json::json;

fn id(n: usize) -> CellId {
    CellId::new(n)
}

fn calc_kernel(config: KernelConfig) -> (Kernel, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let kernel = orrery_calc::kernel(config, sink.clone()).unwrap();
    (kernel, sink)
}

fn graph_errors(kernel: &Kernel, cell: usize) -> Vec<GraphError> {
    kernel
        .cell_errors(id(cell))
        .into_iter()
        .filter_map(|e| match e {
            CellError::Graph(g) => Some(g),
            CellError::Execution(_) => None,
        })
        .collect()
}

fn execution_error(kernel: &Kernel, cell: usize) -> Option<ExecutionError> {
    kernel
        .cell_errors(id(cell))
        .into_iter()
        .find_map(|e| match e {
            CellError::Execution(e) => Some(e),
            CellError::Graph(_) => None,
        })
}

#[test]
fn test_updates_flow_to_dependents() {
    let (mut kernel, _) = calc_kernel(KernelConfig::default());
    kernel
        .run_cells([
            (id(0), "x = 1"),
            (id(1), "y = x + 1"),
            (id(2), "z = x + y"),
            (id(3), "w = 7"),
        ])
        .unwrap();
    assert_eq!(kernel.value("x"), Some(json!(1)));
    assert_eq!(kernel.value("y"), Some(json!(2)));
    assert_eq!(kernel.value("z"), Some(json!(3)));

    let report = kernel.run_cells([(id(0), "x = 2")]).unwrap();
    assert_eq!(report.ran, vec![id(0), id(1), id(2)]);
    assert_eq!(kernel.value("x"), Some(json!(2)));
    assert_eq!(kernel.value("y"), Some(json!(3)));
    assert_eq!(kernel.value("z"), Some(json!(5)));
    assert_eq!(kernel.value("w"), Some(json!(7)));
}

#[test]
fn test_cell_output_is_last_expression() {
    let (mut kernel, sink) = calc_kernel(KernelConfig::default());
    kernel.run_cells([(id(0), "a = 3\na * 2")]).unwrap();

    let output = sink.for_cell(id(0)).into_iter().find_map(|n| match n {
        Notification::CellOutput { output, .. } => Some(output),
        _ => None,
    });
    let output = output.unwrap();
    assert_eq!(output.text.as_deref(), Some("6"));
    assert_eq!(output.json, Some(json!(6)));
}

#[test]
fn test_multiple_definition_blocks_both_cells() {
    let (mut kernel, _) = calc_kernel(KernelConfig::default());
    kernel.run_cells([(id(0), "x = 1")]).unwrap();
    assert_eq!(kernel.value("x"), Some(json!(1)));

    let report = kernel.run_cells([(id(1), "x = 2")]).unwrap();
    assert!(report.ran.is_empty());
    assert_eq!(
        graph_errors(&kernel, 0),
        vec![GraphError::MultipleDefinition {
            name: "x".into(),
            other_cells: vec![id(1)],
        }]
    );
    assert_eq!(
        graph_errors(&kernel, 1),
        vec![GraphError::MultipleDefinition {
            name: "x".into(),
            other_cells: vec![id(0)],
        }]
    );
    assert_eq!(kernel.value("x"), None);
}

#[test]
fn test_deleting_one_definer_reruns_the_other() {
    let (mut kernel, _) = calc_kernel(KernelConfig::default());
    kernel.run_cells([(id(0), "x = 1"), (id(1), "x = 2")]).unwrap();
    assert_eq!(kernel.errors().len(), 2);

    let report = kernel.delete([id(1)]).unwrap();
    assert_eq!(report.ran, vec![id(0)]);
    assert!(kernel.cell_errors(id(0)).is_empty());
    assert!(kernel.errors().is_empty());
    assert_eq!(kernel.value("x"), Some(json!(1)));
}

#[test]
fn test_two_cycle_reported_on_both_cells() {
    let (mut kernel, _) = calc_kernel(KernelConfig::default());
    let report = kernel.run_cells([(id(0), "x = y"), (id(1), "y = x")]).unwrap();
    assert!(report.ran.is_empty());

    let first = graph_errors(&kernel, 0);
    let second = graph_errors(&kernel, 1);
    assert_eq!(first.len(), 1);
    assert!(matches!(first[0], GraphError::Cycle { .. }));
    assert_eq!(first, second);

    let report = kernel.run_cells([(id(1), "y = 1")]).unwrap();
    assert!(kernel.errors().is_empty());
    assert_eq!(report.ran, vec![id(1), id(0)]);
    assert_eq!(kernel.value("x"), Some(json!(1)));
    assert_eq!(kernel.value("y"), Some(json!(1)));
}

#[test]
fn test_delete_nonlocal() {
    let (mut kernel, _) = calc_kernel(KernelConfig::default());
    kernel.run_cells([(id(0), "x = 1"), (id(1), "del x")]).unwrap();

    assert!(graph_errors(&kernel, 1).iter().any(|e| matches!(
        e,
        GraphError::DeleteNonlocal { name, defining_cells } if name == "x" && defining_cells == &vec![id(0)]
    )));
}

#[test]
fn test_syntax_error_then_fix() {
    let (mut kernel, _) = calc_kernel(KernelConfig::default());
    kernel
        .run_cells([(id(0), "x = (1"), (id(1), "y = 2")])
        .unwrap();
    assert!(graph_errors(&kernel, 0)[0].is_syntax());
    assert_eq!(kernel.value("y"), Some(json!(2)));

    let report = kernel.run_cells([(id(0), "x = (1)")]).unwrap();
    assert_eq!(report.ran, vec![id(0)]);
    assert!(kernel.errors().is_empty());
    assert_eq!(kernel.value("x"), Some(json!(1)));
}

#[test]
fn test_exception_cancels_descendants_only() {
    let (mut kernel, _) = calc_kernel(KernelConfig::default());
    kernel
        .run_cells([
            (id(0), "a = 1"),
            (id(1), "b = a + 1"),
            (id(2), "c = b * 2"),
            (id(3), "d = a + 10"),
        ])
        .unwrap();
    assert_eq!(kernel.value("c"), Some(json!(4)));

    let report = kernel
        .run_cells([(id(0), "a = 2"), (id(1), "b = a / 0")])
        .unwrap();

    assert_eq!(
        execution_error(&kernel, 1),
        Some(ExecutionError::ExceptionRaised {
            exception_type: "ZeroDivisionError".into(),
            message: "division by zero".into(),
        })
    );
    assert_eq!(
        execution_error(&kernel, 2),
        Some(ExecutionError::AncestorRaised {
            raising_cell: id(1),
            exception_type: "ZeroDivisionError".into(),
        })
    );
    assert!(report.cancelled.contains(&id(2)));
    assert_eq!(kernel.status(id(2)), Some(CellStatus::Cancelled));
    assert_eq!(kernel.value("b"), None);
    assert_eq!(kernel.value("c"), None);

    // The sibling branch still ran with the new input.
    assert_eq!(kernel.value("d"), Some(json!(12)));
    assert!(execution_error(&kernel, 3).is_none());

    // Fixing the raising cell clears the errors on the whole branch.
    kernel.run_cells([(id(1), "b = a / 2")]).unwrap();
    assert!(kernel.errors().is_empty());
    assert_eq!(kernel.value("c"), Some(json!(2)));
}

#[test]
fn test_raise_statement() {
    let (mut kernel, _) = calc_kernel(KernelConfig::default());
    kernel.run_cells([(id(0), "raise ValueError \"bad input\"")]).unwrap();
    assert_eq!(
        execution_error(&kernel, 0),
        Some(ExecutionError::ExceptionRaised {
            exception_type: "ValueError".into(),
            message: "bad input".into(),
        })
    );
}

#[test]
fn test_integer_overflow_raises_in_cell() {
    let (mut kernel, _) = calc_kernel(KernelConfig::default());
    kernel
        .run_cells([(id(0), "m = -9223372036854775807 - 1\nq = m / -1")])
        .unwrap();
    assert!(matches!(
        execution_error(&kernel, 0),
        Some(ExecutionError::ExceptionRaised { exception_type, .. }) if exception_type == "OverflowError"
    ));
    assert!(kernel.is_alive());
}

#[test]
fn test_stop_cancels_descendants() {
    let (mut kernel, sink) = calc_kernel(KernelConfig::default());
    kernel
        .run_cells([(id(0), "a = 1\na\nstop"), (id(1), "b = a")])
        .unwrap();

    assert!(execution_error(&kernel, 0).is_none());
    assert_eq!(
        execution_error(&kernel, 1),
        Some(ExecutionError::AncestorStopped {
            stopping_cell: id(0)
        })
    );
    assert_eq!(kernel.value("b"), None);
    assert!(sink.for_cell(id(0)).iter().any(|n| matches!(
        n,
        Notification::CellOutput { output, .. } if output.json == Some(json!(1))
    )));
}

#[test]
fn test_disable_and_enable_without_changes() {
    let (mut kernel, _) = calc_kernel(KernelConfig::default());
    kernel
        .run_cells([(id(0), "x = 1"), (id(1), "y = x + 1"), (id(2), "z = y + 1")])
        .unwrap();

    kernel
        .set_cell_config(id(0), CellConfig { disabled: true })
        .unwrap();
    assert_eq!(kernel.status(id(1)), Some(CellStatus::DisabledTransitively));
    assert_eq!(kernel.status(id(2)), Some(CellStatus::DisabledTransitively));

    let report = kernel
        .set_cell_config(id(0), CellConfig { disabled: false })
        .unwrap();
    assert!(report.ran.is_empty());
    assert_eq!(kernel.status(id(1)), Some(CellStatus::Idle));
    assert_eq!(kernel.value("z"), Some(json!(3)));
}

#[test]
fn test_enable_reruns_stale_descendants() {
    let (mut kernel, _) = calc_kernel(KernelConfig::default());
    kernel
        .run_cells([(id(0), "x = 1"), (id(1), "y = x + 1"), (id(2), "other = 5")])
        .unwrap();

    kernel
        .set_cell_config(id(0), CellConfig { disabled: true })
        .unwrap();
    let report = kernel.run_cells([(id(0), "x = 10")]).unwrap();
    assert!(report.ran.is_empty());
    assert!(kernel.is_stale(id(0)));
    assert!(kernel.is_stale(id(1)));
    assert_eq!(kernel.status(id(0)), Some(CellStatus::Stale));
    assert_eq!(kernel.status(id(1)), Some(CellStatus::DisabledTransitively));

    let report = kernel
        .set_cell_config(id(0), CellConfig { disabled: false })
        .unwrap();
    assert_eq!(report.ran, vec![id(0), id(1)]);
    assert!(!kernel.is_stale(id(1)));
    assert_eq!(kernel.value("y"), Some(json!(11)));
}

#[test]
fn test_state_write_does_not_retrigger_writer() {
    let (mut kernel, _) = calc_kernel(KernelConfig::default());
    let report = kernel
        .run_cells([
            (id(0), "state count = 0"),
            (id(1), "set count = min(count + 1, 3)"),
        ])
        .unwrap();

    assert_eq!(report.ran, vec![id(0), id(1)]);
    assert_eq!(kernel.value("count"), Some(json!(1)));
}

#[test]
fn test_state_with_self_loops_runs_until_stable() {
    let (mut kernel, _) = calc_kernel(KernelConfig::default());
    let report = kernel
        .run_cells([
            (id(0), "state! count = 0"),
            (id(1), "set count = min(count + 1, 3)"),
        ])
        .unwrap();

    assert_eq!(kernel.value("count"), Some(json!(3)));
    assert_eq!(report.ran.iter().filter(|&&c| c == id(1)).count(), 4);
}

#[test]
fn test_state_readers_rerun_after_write() {
    let (mut kernel, _) = calc_kernel(KernelConfig::default());
    kernel
        .run_cells([
            (id(0), "state total = 1"),
            (id(1), "shown = total * 100"),
            (id(2), "bump = 5\nset total = bump"),
        ])
        .unwrap();

    assert_eq!(kernel.value("total"), Some(json!(5)));
    assert_eq!(kernel.value("shown"), Some(json!(500)));
}

#[test]
fn test_external_state_write() {
    let (mut kernel, _) = calc_kernel(KernelConfig::default());
    kernel
        .run_cells([
            (id(0), "state count = 0"),
            (id(1), "seen = count + 1"),
        ])
        .unwrap();
    assert_eq!(kernel.value("seen"), Some(json!(1)));

    let state = kernel
        .namespace()
        .get("count")
        .and_then(Value::as_state)
        .unwrap();
    let report = kernel.set_state(state, json!(41)).unwrap();
    assert_eq!(report.ran, vec![id(1)]);
    assert_eq!(kernel.value("seen"), Some(json!(42)));
}

#[test]
fn test_ui_view_update_reaches_readers() {
    let (mut kernel, _) = calc_kernel(KernelConfig::default());
    kernel
        .run_cells([
            (id(0), "slider form = {speed: 5, size: 2}"),
            (id(1), "view speed = form.speed"),
            (id(2), "doubled = speed * 2"),
            (id(3), "area = form.size * form.size"),
        ])
        .unwrap();
    assert_eq!(kernel.value("doubled"), Some(json!(10)));

    let view = kernel
        .namespace()
        .get("speed")
        .and_then(Value::as_element)
        .unwrap();
    let report = kernel.set_ui_element_values([(view, json!(7))]).unwrap();

    assert!(!report.ran.contains(&id(0)));
    assert!(report.ran.contains(&id(2)));
    assert_eq!(kernel.value("form"), Some(json!({"speed": 7, "size": 2})));
    assert_eq!(kernel.value("doubled"), Some(json!(14)));
    assert_eq!(kernel.value("area"), Some(json!(4)));
}

#[test]
fn test_unknown_ui_element_is_ignored() {
    let (mut kernel, _) = calc_kernel(KernelConfig::default());
    kernel.run_cells([(id(0), "slider s = 1")]).unwrap();

    let report = kernel
        .set_ui_element_values([(ElementId::new(999), json!(3))])
        .unwrap();
    assert!(report.ran.is_empty());
    assert_eq!(kernel.value("s"), Some(json!(1)));
}

#[test]
fn test_lazy_mode_marks_descendants_stale() {
    let (mut kernel, _) = calc_kernel(KernelConfig::lazy());
    kernel
        .run_cells([(id(0), "x = 1"), (id(1), "y = x + 1")])
        .unwrap();
    assert_eq!(kernel.value("y"), Some(json!(2)));

    let report = kernel.run_cells([(id(0), "x = 5")]).unwrap();
    assert_eq!(report.ran, vec![id(0)]);
    assert!(kernel.is_stale(id(1)));
    assert_eq!(kernel.status(id(1)), Some(CellStatus::Stale));
    assert_eq!(kernel.value("y"), Some(json!(2)));

    let report = kernel.run_stale().unwrap();
    assert_eq!(report.ran, vec![id(1)]);
    assert!(!kernel.is_stale(id(1)));
    assert_eq!(kernel.value("y"), Some(json!(6)));
}

#[test]
fn test_mixed_batch() {
    let (mut kernel, sink) = calc_kernel(KernelConfig::default());
    kernel
        .run_cells([(id(0), "a = 1"), (id(1), "b = 2"), (id(2), "c = a + b")])
        .unwrap();
    sink.take();

    let batch = MutationBatch::new().register(id(1), "b = 3").delete(id(0));
    kernel.run(batch).unwrap();

    assert_eq!(kernel.value("a"), None);
    assert_eq!(kernel.value("b"), Some(json!(3)));
    assert_eq!(
        execution_error(&kernel, 2),
        Some(ExecutionError::ExceptionRaised {
            exception_type: "NameError".into(),
            message: "name 'a' is not defined".into(),
        })
    );
    assert!(
        sink.snapshot()
            .iter()
            .any(|n| matches!(n, Notification::VariablesChanged { .. }))
    );
}

#[tokio::test]
async fn test_console_output_is_routed_per_cell() {
    let sink = Arc::new(RecordingSink::new());
    let (console, router) = ConsoleRouter::spawn(16, sink.clone());
    let mut kernel = orrery_calc::kernel(KernelConfig::default(), sink.clone())
        .unwrap()
        .with_console(console);

    kernel
        .run_cells([(id(0), "print \"hello\"\nprint 1 + 2"), (id(1), "print \"other\"")])
        .unwrap();
    drop(kernel);
    router.await.unwrap();

    let text = |cell: CellId| -> String {
        sink.for_cell(cell)
            .into_iter()
            .filter_map(|n| match n {
                Notification::ConsoleOutput { stream, text, .. } => {
                    assert_eq!(stream, Stream::Stdout);
                    Some(text)
                }
                _ => None,
            })
            .collect()
    };
    assert_eq!(text(id(0)), "hello\n3\n");
    assert_eq!(text(id(1)), "other\n");
}
