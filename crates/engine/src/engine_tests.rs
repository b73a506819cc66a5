// SPDX-License-Identifier: MIT

use super::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex as PMutex;

struct FakeRunner {
    order: Arc<PMutex<Vec<String>>>,
    should_fail: Arc<PMutex<HashSet<TaskId>>>,
    delay: Duration,
}

impl FakeRunner {
    fn new() -> Self {
        Self {
            order: Arc::new(PMutex::new(Vec::new())),
            should_fail: Arc::new(PMutex::new(HashSet::new())),
            delay: Duration::from_millis(10),
        }
    }

    fn fail(&self, id: TaskId) {
        self.should_fail.lock().insert(id);
    }
}

#[async_trait::async_trait]
impl TaskRunner for FakeRunner {
    async fn run(&self, task: ExecutionTask) -> ExecutionResult {
        tokio::time::sleep(self.delay).await;
        let started_at = SystemTime::now();
        self.order.lock().push(task.task_type.clone());
        let success = !self.should_fail.lock().contains(&task.id);
        let completed_at = SystemTime::now();
        ExecutionResult {
            task_id: task.id,
            execution_id: task.id,
            success,
            exit_code: Some(if success { 0 } else { 1 }),
            output: String::new(),
            error: if success { None } else { Some("boom".into()) },
            started_at,
            completed_at,
            duration: completed_at.duration_since(started_at).unwrap_or_default(),
        }
    }
}

fn task(task_type: &str) -> ExecutionTask {
    ExecutionTask::new(task_type, "", ".")
}

#[tokio::test]
async fn linear_dependency_chain_completes_in_order() {
    let runner = Arc::new(FakeRunner::new());
    let order = runner.order.clone();
    let engine = ExecutionEngine::new(EngineConfig { max_concurrent: 4 }, runner);

    let a = task("A");
    let a_id = a.id;
    let b = task("B").dependencies([a_id]);
    let b_id = b.id;
    let c = task("C").dependencies([b_id]);
    let c_id = c.id;

    engine.submit_tasks([a, b, c]).unwrap();
    engine.wait_for_task(c_id).await.unwrap();

    assert_eq!(order.lock().clone(), vec!["A", "B", "C"]);
    let final_status = engine.get_task_status(b_id).unwrap();
    assert_eq!(final_status.state, TaskState::Completed);
}

#[tokio::test]
async fn dependency_failure_propagates_transitively() {
    let runner = Arc::new(FakeRunner::new());
    let engine = ExecutionEngine::new(EngineConfig { max_concurrent: 4 }, runner.clone());

    let a = task("A");
    let a_id = a.id;
    runner.fail(a_id);
    let b = task("B").dependencies([a_id]);
    let b_id = b.id;
    let c = task("C").dependencies([b_id]);
    let c_id = c.id;

    engine.submit_tasks([a, b, c]).unwrap();
    let c_result = engine.wait_for_task(c_id).await.unwrap();

    assert!(!c_result.success);
    assert_eq!(engine.get_task_status(b_id).unwrap().state, TaskState::Failed);
    assert_eq!(engine.get_task_status(c_id).unwrap().state, TaskState::Failed);

    let metrics = engine.metrics();
    assert_eq!(metrics.failed_tasks, 3);
    assert_eq!(metrics.completed_tasks, 0);
    // C never ran: its only recorded reason is "dependency failure".
    assert_eq!(engine.get_task_status(c_id).unwrap().error.as_deref(), Some("dependency failure"));
}

#[tokio::test]
async fn unresolved_dependency_keeps_task_queued() {
    let runner = Arc::new(FakeRunner::new());
    let engine = ExecutionEngine::new(EngineConfig { max_concurrent: 4 }, runner);

    let unknown = TaskId::new();
    let b = task("B").dependencies([unknown]);
    let b_id = b.id;
    engine.submit_task(b).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.get_task_status(b_id).unwrap().state, TaskState::Queued);
}

#[tokio::test]
async fn concurrency_cap_is_respected() {
    let runner = Arc::new(FakeRunner::new());
    let engine = ExecutionEngine::new(EngineConfig { max_concurrent: 2 }, runner);

    for _ in 0..6 {
        engine.submit_task(task("work")).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(engine.metrics().currently_running <= 2);
}

#[tokio::test]
async fn priority_runs_before_lower_priority_when_slots_scarce() {
    let runner = Arc::new(FakeRunner::new());
    let order = runner.order.clone();
    let engine = ExecutionEngine::new(EngineConfig { max_concurrent: 1 }, runner);

    let low = task("low").priority(0);
    let high = task("high").priority(10);
    let high_id = high.id;
    engine.submit_task(low).unwrap();
    engine.submit_task(high).unwrap();
    engine.wait_for_task(high_id).await.unwrap();

    assert_eq!(order.lock().first().cloned(), Some("low".to_string()));
}

#[tokio::test]
async fn cancel_queued_task_is_terminal_and_idempotent() {
    let runner = Arc::new(FakeRunner::new());
    let engine = ExecutionEngine::new(EngineConfig { max_concurrent: 0 }, runner);

    let t = task("A");
    let id = t.id;
    engine.submit_task(t).unwrap();
    engine.cancel_task(id).unwrap();
    engine.cancel_task(id).unwrap();

    assert_eq!(engine.get_task_status(id).unwrap().state, TaskState::Cancelled);
}

#[tokio::test]
async fn on_task_complete_fires_exactly_once() {
    let runner = Arc::new(FakeRunner::new());
    let engine = ExecutionEngine::new(EngineConfig { max_concurrent: 4 }, runner);

    let count = Arc::new(PMutex::new(0));
    let counter = count.clone();
    engine.on_task_complete(move |_| {
        *counter.lock() += 1;
    });

    let t = task("A");
    let id = t.id;
    engine.submit_task(t).unwrap();
    engine.wait_for_task(id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(*count.lock(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_completion_handler_does_not_delay_next_dispatch() {
    let runner = Arc::new(FakeRunner::new());
    let engine = ExecutionEngine::new(EngineConfig { max_concurrent: 1 }, runner);

    let a = task("A");
    let a_id = a.id;
    let b = task("B");
    let b_id = b.id;

    engine.on_task_complete(move |result| {
        if result.task_id == a_id {
            std::thread::sleep(Duration::from_millis(250));
        }
    });

    engine.submit_tasks([a, b]).unwrap();

    let start = std::time::Instant::now();
    engine.wait_for_task(b_id).await.unwrap();
    assert!(start.elapsed() < Duration::from_millis(150), "B's dispatch waited on A's slow handler");
}

#[tokio::test]
async fn shutdown_cancels_queued_tasks() {
    let runner = Arc::new(FakeRunner::new());
    let engine = ExecutionEngine::new(EngineConfig { max_concurrent: 0 }, runner);

    let t = task("A");
    let id = t.id;
    engine.submit_task(t).unwrap();
    engine.shutdown().await;

    assert_eq!(engine.get_task_status(id).unwrap().state, TaskState::Cancelled);
    assert!(matches!(engine.submit_task(task("B")), Err(EngineError::ShuttingDown)));
}
