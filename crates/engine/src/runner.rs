// SPDX-License-Identifier: MIT

//! The pluggable task body: how an [`ExecutionTask`] actually gets run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

use forge_process::{ProcessConfig, ProcessManager};

use crate::task::{ExecutionResult, ExecutionTask, TaskId};

/// Executes task bodies on behalf of the engine.
///
/// Implementations typically delegate to a [`forge_process::ProcessManager`];
/// in-process adapters (for tests, or for task types that don't spawn a
/// subprocess) are equally valid.
#[async_trait::async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: ExecutionTask) -> ExecutionResult;

    /// Best-effort cancellation of an in-flight task. The default
    /// implementation does nothing; runners backed by a cancellable
    /// resource (a subprocess, a remote job) should override this.
    async fn cancel(&self, _task_id: TaskId) {}
}

/// Maps a task's `task_type` to the executable + base argv used to run it.
pub type ProcessTemplate = Arc<dyn Fn(&ExecutionTask) -> ProcessConfig + Send + Sync>;

/// A [`TaskRunner`] that spawns one child process per task via a shared
/// [`ProcessManager`], feeding the task's prompt on stdin and capturing
/// stdout as the result's output.
pub struct ProcessTaskRunner {
    manager: ProcessManager,
    template: ProcessTemplate,
    in_flight: Mutex<HashMap<TaskId, forge_process::ProcessId>>,
}

impl ProcessTaskRunner {
    pub fn new(manager: ProcessManager, template: ProcessTemplate) -> Self {
        Self {
            manager,
            template,
            in_flight: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl TaskRunner for ProcessTaskRunner {
    async fn run(&self, task: ExecutionTask) -> ExecutionResult {
        let started_at = SystemTime::now();
        let config = (self.template)(&task);

        let process_id = match self.manager.acquire_process(&config).await {
            Ok(id) => id,
            Err(err) => return ExecutionResult::failure(task.id, started_at, err.to_string()),
        };
        self.in_flight.lock().insert(task.id, process_id);

        let output = Arc::new(Mutex::new(String::new()));
        let sink = output.clone();
        let _ = self.manager.on_output(process_id, move |line| {
            let mut buf = sink.lock();
            buf.push_str(&String::from_utf8_lossy(&line.bytes));
            buf.push('\n');
        });

        if !task.prompt.is_empty() {
            let _ = self.manager.send_input(process_id, &task.prompt).await;
        }

        let exit_code = loop {
            match self.manager.get_process(process_id) {
                Ok(process) if process.exit_code.is_some() => break process.exit_code,
                Ok(_) => tokio::time::sleep(std::time::Duration::from_millis(20)).await,
                // Process already reaped and swept from the active map
                // (past the cleanup retention window) before we observed
                // its exit code; treat as an untracked failure.
                Err(_) => break None,
            }
        };
        self.in_flight.lock().remove(&task.id);

        let success = exit_code == Some(0);
        let completed_at = SystemTime::now();
        ExecutionResult {
            task_id: task.id,
            execution_id: task.id,
            success,
            exit_code,
            output: output.lock().clone(),
            error: if success { None } else { Some(format!("process exited with code {exit_code:?}")) },
            started_at,
            completed_at,
            duration: completed_at.duration_since(started_at).unwrap_or_default(),
        }
    }

    async fn cancel(&self, task_id: TaskId) {
        let process_id = self.in_flight.lock().get(&task_id).copied();
        if let Some(process_id) = process_id {
            let _ = self.manager.terminate_process(process_id).await;
        }
    }
}
