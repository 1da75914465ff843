// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::invoker::{FakeInvoker, WorkflowOutcome};
use polka_core::Task;

fn limits(max_concurrency: usize, max_task_minutes: u64) -> LimitsConfig {
    LimitsConfig { max_concurrency, max_task_minutes, ..LimitsConfig::default() }
}

fn executor_with(
    invoker: &FakeInvoker,
    limits_config: LimitsConfig,
) -> (Executor<FakeInvoker>, CancellationToken) {
    let root = CancellationToken::new();
    (Executor::new(Arc::new(invoker.clone()), &limits_config, root.clone()), root)
}

#[tokio::test]
async fn successful_execution_returns_data() {
    let invoker = FakeInvoker::new();
    invoker.push_outcome(WorkflowOutcome::ok_with_data(serde_json::json!({"pr": 7})));
    let (executor, _root) = executor_with(&invoker, limits(1, 30));

    let task = Task::builder().build();
    let outcome = executor.execute(&task).await;

    assert!(outcome.success);
    assert!(!outcome.cancelled);
    assert_eq!(outcome.data, Some(serde_json::json!({"pr": 7})));
    assert_eq!(invoker.call_count(), 1);
    assert_eq!(invoker.calls()[0].workflow, task.workflow);
    assert!(!executor.is_running(&task.id), "handle removed on exit");
}

#[tokio::test]
async fn workflow_failure_is_reported_not_thrown() {
    let invoker = FakeInvoker::new();
    invoker.push_failure("compile error in generated patch");
    let (executor, _root) = executor_with(&invoker, limits(1, 30));

    let outcome = executor.execute(&Task::builder().build()).await;
    assert!(!outcome.success);
    assert!(!outcome.cancelled);
    assert_eq!(outcome.error.as_deref(), Some("compile error in generated patch"));
}

#[tokio::test(start_paused = true)]
async fn timeout_cancels_and_reports() {
    let invoker = FakeInvoker::new();
    invoker.set_delay(Duration::from_secs(600));
    let (executor, _root) = executor_with(&invoker, limits(1, 1));

    let outcome = executor.execute(&Task::builder().build()).await;
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn cancel_running_task() {
    let invoker = FakeInvoker::new();
    invoker.set_delay(Duration::from_secs(60));
    let (executor, _root) = executor_with(&invoker, limits(1, 30));
    let executor = Arc::new(executor);

    let task = Task::builder().build();
    let id = task.id;
    let runner = Arc::clone(&executor);
    let handle = tokio::spawn(async move { runner.execute(&task).await });

    // Wait until the task registers as running.
    for _ in 0..100 {
        if executor.is_running(&id) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(executor.is_running(&id));
    assert_eq!(executor.running_count(), 1);
    assert!(executor.longest_running().is_some());

    assert!(executor.cancel(&id));
    let outcome = handle.await.unwrap();
    assert!(outcome.cancelled);
    assert!(!outcome.success);
    assert_eq!(executor.running_count(), 0);
}

#[tokio::test]
async fn cancel_unknown_task_returns_false() {
    let invoker = FakeInvoker::new();
    let (executor, _root) = executor_with(&invoker, limits(1, 30));
    assert!(!executor.cancel(&TaskId::from_string("task-ghost")));
}

#[tokio::test]
async fn cancel_all_resolves_every_inflight_task() {
    let invoker = FakeInvoker::new();
    invoker.set_delay(Duration::from_secs(60));
    let (executor, _root) = executor_with(&invoker, limits(2, 30));
    let executor = Arc::new(executor);

    let t1 = Task::builder().build();
    let t2 = Task::builder().build();
    let (r1, r2) = (Arc::clone(&executor), Arc::clone(&executor));
    let h1 = tokio::spawn(async move { r1.execute(&t1).await });
    let h2 = tokio::spawn(async move { r2.execute(&t2).await });

    for _ in 0..100 {
        if executor.running_count() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(executor.running_count(), 2);

    executor.cancel_all();
    assert!(h1.await.unwrap().cancelled);
    assert!(h2.await.unwrap().cancelled);
    assert_eq!(executor.running_count(), 0);
}

#[tokio::test]
async fn root_cancellation_cascades_to_tasks() {
    let invoker = FakeInvoker::new();
    invoker.set_delay(Duration::from_secs(60));
    let (executor, root) = executor_with(&invoker, limits(1, 30));
    let executor = Arc::new(executor);

    let task = Task::builder().build();
    let runner = Arc::clone(&executor);
    let handle = tokio::spawn(async move { runner.execute(&task).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    root.cancel();

    let outcome = handle.await.unwrap();
    assert!(outcome.cancelled);
}

#[tokio::test]
async fn concurrency_limit_queues_excess_tasks() {
    let invoker = FakeInvoker::new();
    invoker.set_delay(Duration::from_millis(150));
    let (executor, _root) = executor_with(&invoker, limits(1, 30));
    let executor = Arc::new(executor);

    let start = std::time::Instant::now();
    let tasks: Vec<Task> = (0..3).map(|_| Task::builder().build()).collect();
    let handles: Vec<_> = tasks
        .into_iter()
        .map(|t| {
            let runner = Arc::clone(&executor);
            tokio::spawn(async move { runner.execute(&t).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().success);
    }
    // Three 150 ms tasks through one slot cannot finish in parallel time.
    assert!(start.elapsed() >= Duration::from_millis(400));
}

#[tokio::test]
async fn overlapping_files_are_refused() {
    let invoker = FakeInvoker::new();
    invoker.set_delay(Duration::from_secs(60));
    let (executor, _root) = executor_with(&invoker, limits(2, 30));
    let executor = Arc::new(executor);

    let t1 = Task::builder().files(vec!["src/shared.rs".into()]).build();
    let id1 = t1.id;
    let runner = Arc::clone(&executor);
    let h1 = tokio::spawn(async move { runner.execute(&t1).await });

    for _ in 0..100 {
        if executor.is_running(&id1) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let t2 = Task::builder().files(vec!["src/shared.rs".into(), "src/other.rs".into()]).build();
    let outcome = executor.execute(&t2).await;
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("file conflict"));

    // Disjoint files are fine.
    executor.cancel(&id1);
    h1.await.unwrap();
    let t3 = Task::builder().files(vec!["src/other.rs".into()]).build();
    let invoker2 = invoker.clone();
    invoker2.set_delay(Duration::ZERO);
    assert!(executor.execute(&t3).await.success);
}

#[tokio::test]
async fn outcome_minutes_rounds_up() {
    let outcome = ExecutionOutcome {
        success: true,
        data: None,
        error: None,
        cancelled: false,
        duration: Duration::from_secs(61),
    };
    assert_eq!(outcome.minutes(), 2);
    let zero = ExecutionOutcome { duration: Duration::ZERO, ..outcome };
    assert_eq!(zero.minutes(), 0);
}
