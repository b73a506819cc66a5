// SPDX-License-Identifier: MIT

//! Task, status, and result types owned by the engine.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

forge_core::define_id! {
    /// Identifies an [`ExecutionTask`] uniquely within one engine instance.
    pub struct TaskId("tsk-");
}

/// An in-flight submission's identity. Equal to the [`TaskId`] of the task
/// that was submitted: each retry attempt resubmits a freshly-id'd task, so
/// task identity and execution identity coincide one-to-one.
pub type ExecutionId = TaskId;

/// A unit of work submitted to the engine.
#[derive(Debug, Clone)]
pub struct ExecutionTask {
    pub id: TaskId,
    pub task_type: String,
    pub prompt: String,
    pub work_dir: std::path::PathBuf,
    pub priority: i32,
    pub dependencies: Vec<TaskId>,
    pub created_at: SystemTime,
    pub config: HashMap<String, serde_json::Value>,
}

impl ExecutionTask {
    pub fn new(task_type: impl Into<String>, prompt: impl Into<String>, work_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            id: TaskId::new(),
            task_type: task_type.into(),
            prompt: prompt.into(),
            work_dir: work_dir.into(),
            priority: 0,
            dependencies: Vec::new(),
            created_at: SystemTime::now(),
            config: HashMap::new(),
        }
    }

    forge_core::setters! {
        set { priority: i32 }
    }

    pub fn dependencies(mut self, dependencies: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies = dependencies.into_iter().collect();
        self
    }

    pub fn config(mut self, config: HashMap<String, serde_json::Value>) -> Self {
        self.config = config;
        self
    }

    /// Clone this task's intent under a fresh id, for a resilient-executor retry attempt.
    pub fn retry_clone(&self) -> Self {
        Self {
            id: TaskId::new(),
            created_at: SystemTime::now(),
            ..self.clone()
        }
    }
}

/// Lifecycle state of a submitted task.
///
/// Monotonic: `Queued → Running → {Completed, Failed, Cancelled}`.
/// `Cancelled` may be entered from `Queued` or `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

forge_core::simple_display! {
    TaskState {
        Queued => "queued",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
    }
}

/// Full status record for a tracked task.
#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    pub attempt_count: u32,
    pub started_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
    pub error: Option<String>,
}

impl TaskStatus {
    pub(crate) fn queued(task_id: TaskId) -> Self {
        Self {
            task_id,
            state: TaskState::Queued,
            attempt_count: 0,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }
}

/// Outcome of running one [`ExecutionTask`] to completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub task_id: TaskId,
    pub execution_id: ExecutionId,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub output: String,
    pub error: Option<String>,
    pub started_at: SystemTime,
    pub completed_at: SystemTime,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn failure(task_id: TaskId, started_at: SystemTime, error: impl Into<String>) -> Self {
        let completed_at = SystemTime::now();
        Self {
            task_id,
            execution_id: task_id,
            success: false,
            exit_code: None,
            output: String::new(),
            error: Some(error.into()),
            started_at,
            completed_at,
            duration: completed_at.duration_since(started_at).unwrap_or_default(),
        }
    }
}
