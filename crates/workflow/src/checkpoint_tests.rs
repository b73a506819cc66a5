// SPDX-License-Identifier: MIT

use super::*;
use crate::model::{StepState, StepStatus, WorkflowDefinition, WorkflowStep};
use forge_core::SystemClock;
use forge_engine::ExecutionResult;
use forge_resilient::{ExecutionAttempt, ResilientExecutionResult};
use serde_json::json;

fn sample_execution() -> WorkflowExecution {
    let definition = WorkflowDefinition::new(
        WorkflowId::new(),
        vec![WorkflowStep::new("step-1", "custom", "hello ${name}")],
    )
    .initial_context(json!({"name": "world"}));
    let mut execution = WorkflowExecution::new(definition);
    execution.context = json!({"name": "world"});
    execution
}

fn retried_step_result() -> ResilientExecutionResult {
    let now = std::time::SystemTime::now();
    let attempt = |attempt_number: u32, success: bool| ExecutionAttempt {
        attempt_number,
        result: ExecutionResult {
            task_id: forge_engine::TaskId::new(),
            execution_id: forge_engine::TaskId::new(),
            success,
            exit_code: Some(if success { 0 } else { 1 }),
            output: String::new(),
            error: if success { None } else { Some("transient".into()) },
            started_at: now,
            completed_at: now,
            duration: std::time::Duration::ZERO,
        },
        will_retry: !success,
        next_delay_ms: if success { None } else { Some(100) },
    };
    ResilientExecutionResult {
        attempts: vec![attempt(1, false), attempt(2, false), attempt(3, true)],
        total_attempts: 3,
        success: true,
        exit_code: Some(0),
        circuit_breaker_triggered: false,
    }
}

#[tokio::test]
async fn save_then_load_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path());
    let execution = sample_execution();
    let checkpoint = WorkflowCheckpoint::from_execution(&execution, &SystemClock);

    store.save_checkpoint(&checkpoint).await.unwrap();
    let loaded = store.load_checkpoint(&execution.execution_id).await.unwrap().unwrap();

    assert_eq!(loaded.execution_id, checkpoint.execution_id);
    assert_eq!(loaded.definition.steps.len(), 1);
    assert_eq!(loaded.context, json!({"name": "world"}));
}

#[test]
fn from_execution_stamps_the_current_schema_version() {
    let checkpoint = WorkflowCheckpoint::from_execution(&sample_execution(), &SystemClock);
    assert_eq!(checkpoint.schema_version, CURRENT_CHECKPOINT_VERSION);
}

#[test]
fn checkpoints_without_a_schema_version_load_as_version_one() {
    let execution = sample_execution();
    let mut value = serde_json::to_value(WorkflowCheckpoint::from_execution(&execution, &SystemClock)).unwrap();
    value.as_object_mut().unwrap().remove("v");

    let checkpoint: WorkflowCheckpoint = serde_json::from_value(value).unwrap();
    assert_eq!(checkpoint.schema_version, 1);
}

#[tokio::test]
async fn checkpoint_and_resume_preserves_attempt_count_and_result() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path());
    let mut execution = sample_execution();
    let retried = retried_step_result();
    execution.step_results[0] = Some(StepStatus {
        step_id: "step-1".to_string(),
        state: StepState::Completed,
        attempts: retried.total_attempts,
        result: Some(retried),
    });

    let checkpoint = WorkflowCheckpoint::from_execution(&execution, &SystemClock);
    store.save_checkpoint(&checkpoint).await.unwrap();
    let loaded = store.load_checkpoint(&execution.execution_id).await.unwrap().unwrap();

    let snapshot = loaded.step_results[0].as_ref().unwrap();
    assert_eq!(snapshot.attempts, 3);
    assert_eq!(snapshot.result.as_ref().unwrap().attempts.len(), 3);
    assert!(snapshot.result.as_ref().unwrap().success);
}

#[tokio::test]
async fn load_unknown_execution_returns_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path());
    let missing = WorkflowExecutionId::new();
    assert!(store.load_checkpoint(&missing).await.unwrap().is_none());
}

#[tokio::test]
async fn resaving_overwrites_and_keeps_a_backup() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path());
    let mut execution = sample_execution();
    let first = WorkflowCheckpoint::from_execution(&execution, &SystemClock);
    store.save_checkpoint(&first).await.unwrap();

    execution.current_step_index = 1;
    let second = WorkflowCheckpoint::from_execution(&execution, &SystemClock);
    store.save_checkpoint(&second).await.unwrap();

    let loaded = store.load_checkpoint(&execution.execution_id).await.unwrap().unwrap();
    assert_eq!(loaded.current_step_index, 1);

    let backup = dir.path().join(format!("{}.json.bak", execution.execution_id));
    assert!(backup.exists());
}

#[tokio::test]
async fn list_checkpoints_filters_by_workflow_id() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path());
    let exec_a = sample_execution();
    let exec_b = sample_execution();
    store.save_checkpoint(&WorkflowCheckpoint::from_execution(&exec_a, &SystemClock)).await.unwrap();
    store.save_checkpoint(&WorkflowCheckpoint::from_execution(&exec_b, &SystemClock)).await.unwrap();

    let all = store.list_checkpoints(None).await.unwrap();
    assert_eq!(all.len(), 2);

    let only_a = store.list_checkpoints(Some(&exec_a.workflow_id)).await.unwrap();
    assert_eq!(only_a.len(), 1);
    assert_eq!(only_a[0].workflow_id, exec_a.workflow_id.to_string());
}

#[tokio::test]
async fn list_checkpoints_on_empty_directory_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path().join("does-not-exist-yet"));
    assert!(store.list_checkpoints(None).await.unwrap().is_empty());
}
