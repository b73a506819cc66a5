// SPDX-License-Identifier: MIT

//! The execution engine: admission, dependency resolution, and dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{EngineError, EngineResult};
use crate::metrics::{EngineMetrics, MetricsAccumulator};
use crate::runner::TaskRunner;
use crate::task::{ExecutionId, ExecutionResult, ExecutionTask, TaskId, TaskState, TaskStatus};

type CompletionHandler = Box<dyn Fn(ExecutionResult) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    on_complete: Vec<CompletionHandler>,
    on_failed: Vec<CompletionHandler>,
}

struct TaskRecord {
    task: ExecutionTask,
    status: TaskStatus,
    result: Option<ExecutionResult>,
}

#[derive(Default)]
struct EngineState {
    tasks: HashMap<TaskId, TaskRecord>,
    /// Queued task ids in submission order; priority/FIFO ordering is
    /// derived at dispatch time from `task.priority` / `task.created_at`.
    queued: Vec<TaskId>,
    running: std::collections::HashSet<TaskId>,
    shutting_down: bool,
    metrics: MetricsAccumulator,
}

/// Configuration for an [`ExecutionEngine`].
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_concurrent: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_concurrent: 4 }
    }
}

/// A single-host task scheduler over a pluggable [`TaskRunner`].
///
/// Cheaply cloneable; every clone shares the same underlying task table.
#[derive(Clone)]
pub struct ExecutionEngine {
    inner: Arc<Inner>,
}

struct Inner {
    config: EngineConfig,
    runner: Arc<dyn TaskRunner>,
    state: Mutex<EngineState>,
    handlers: Mutex<Handlers>,
    notify: Notify,
    started_at: Instant,
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig, runner: Arc<dyn TaskRunner>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                runner,
                state: Mutex::new(EngineState::default()),
                handlers: Mutex::new(Handlers::default()),
                notify: Notify::new(),
                started_at: Instant::now(),
            }),
        }
    }

    /// Enqueue a task; may trigger immediate dispatch. Returns its execution id.
    pub fn submit_task(&self, task: ExecutionTask) -> EngineResult<ExecutionId> {
        let mut state = self.inner.state.lock();
        if state.shutting_down {
            return Err(EngineError::ShuttingDown);
        }
        let id = task.id;
        state.queued.push(id);
        state.tasks.insert(id, TaskRecord { status: TaskStatus::queued(id), task, result: None });
        drop(state);
        self.dispatch();
        Ok(id)
    }

    /// Submit several tasks, preserving relative order.
    pub fn submit_tasks(&self, tasks: impl IntoIterator<Item = ExecutionTask>) -> EngineResult<Vec<ExecutionId>> {
        tasks.into_iter().map(|task| self.submit_task(task)).collect()
    }

    /// Mark a queued task cancelled, or request termination of a running one.
    pub fn cancel_task(&self, task_id: TaskId) -> EngineResult<()> {
        let mut state = self.inner.state.lock();
        let record = state.tasks.get_mut(&task_id).ok_or(EngineError::NotFound(task_id))?;
        if record.status.state.is_terminal() {
            return Ok(());
        }
        let was_running = record.status.state == TaskState::Running;
        record.status.state = TaskState::Cancelled;
        record.status.completed_at = Some(SystemTime::now());
        state.queued.retain(|id| *id != task_id);
        drop(state);
        self.inner.notify.notify_waiters();

        if was_running {
            let runner = self.inner.runner.clone();
            tokio::spawn(async move { runner.cancel(task_id).await });
        } else {
            self.dispatch();
        }
        Ok(())
    }

    pub fn get_task_status(&self, task_id: TaskId) -> Option<TaskStatus> {
        self.inner.state.lock().tasks.get(&task_id).map(|r| r.status.clone())
    }

    /// Resolve once the task reaches a terminal state.
    pub async fn wait_for_task(&self, task_id: TaskId) -> EngineResult<ExecutionResult> {
        loop {
            let notified = self.inner.notify.notified();
            {
                let state = self.inner.state.lock();
                let record = state.tasks.get(&task_id).ok_or(EngineError::NotFound(task_id))?;
                if record.status.state.is_terminal() {
                    return match &record.result {
                        Some(result) => Ok(result.clone()),
                        None => Ok(ExecutionResult::failure(
                            task_id,
                            record.status.started_at.unwrap_or_else(SystemTime::now),
                            record.status.error.clone().unwrap_or_else(|| "cancelled".into()),
                        )),
                    };
                }
            }
            notified.await;
        }
    }

    pub async fn wait_for_tasks(&self, task_ids: impl IntoIterator<Item = TaskId>) -> EngineResult<Vec<ExecutionResult>> {
        let mut results = Vec::new();
        for id in task_ids {
            results.push(self.wait_for_task(id).await?);
        }
        Ok(results)
    }

    pub fn on_task_complete(&self, handler: impl Fn(ExecutionResult) + Send + Sync + 'static) {
        self.inner.handlers.lock().on_complete.push(Box::new(handler));
    }

    pub fn on_task_failed(&self, handler: impl Fn(ExecutionResult) + Send + Sync + 'static) {
        self.inner.handlers.lock().on_failed.push(Box::new(handler));
    }

    pub fn metrics(&self) -> EngineMetrics {
        let state = self.inner.state.lock();
        let elapsed_secs = self.inner.started_at.elapsed().as_secs_f64().max(1e-6);
        EngineMetrics {
            max_concurrent: self.inner.config.max_concurrent,
            currently_running: state.running.len(),
            available_slots: self.inner.config.max_concurrent.saturating_sub(state.running.len()),
            queued_tasks: state.queued.len(),
            completed_tasks: state.metrics.completed_tasks,
            failed_tasks: state.metrics.failed_tasks,
            average_duration_ms: state.metrics.average_duration_ms(),
            success_rate: state.metrics.success_rate(),
            throughput: state.metrics.completed_tasks as f64 / elapsed_secs,
        }
    }

    /// Stop accepting submissions, cancel everything queued, and request
    /// termination of everything running via the task runner.
    pub async fn shutdown(&self) {
        let (queued, running): (Vec<TaskId>, Vec<TaskId>) = {
            let mut state = self.inner.state.lock();
            state.shutting_down = true;
            (state.queued.clone(), state.running.iter().copied().collect())
        };
        for id in queued {
            let _ = self.cancel_task(id);
        }
        for id in running {
            self.inner.runner.cancel(id).await;
        }
    }

    /// Re-entrant dispatch: propagate dependency failures, then admit as
    /// many runnable tasks as the concurrency cap allows.
    fn dispatch(&self) {
        let to_spawn: Vec<ExecutionTask> = {
            let mut state = self.inner.state.lock();
            if state.shutting_down {
                return;
            }
            propagate_dependency_failures(&mut state, &self.inner.handlers);

            let mut candidates: Vec<TaskId> = state
                .queued
                .iter()
                .copied()
                .filter(|id| is_runnable(&state, *id))
                .collect();
            candidates.sort_by(|a, b| {
                let ra = &state.tasks[a];
                let rb = &state.tasks[b];
                rb.task.priority.cmp(&ra.task.priority).then(ra.task.created_at.cmp(&rb.task.created_at))
            });

            let slots = self.inner.config.max_concurrent.saturating_sub(state.running.len());
            let chosen: Vec<TaskId> = candidates.into_iter().take(slots).collect();

            let mut tasks = Vec::with_capacity(chosen.len());
            for id in &chosen {
                state.queued.retain(|qid| qid != id);
                state.running.insert(*id);
                let Some(record) = state.tasks.get_mut(id) else { continue };
                record.status.state = TaskState::Running;
                record.status.attempt_count += 1;
                record.status.started_at = Some(SystemTime::now());
                tasks.push(record.task.clone());
            }
            tasks
        };

        for task in to_spawn {
            let this = self.clone();
            tokio::spawn(async move { this.run_and_complete(task).await });
        }
    }

    async fn run_and_complete(&self, task: ExecutionTask) {
        let task_id = task.id;
        let result = self.inner.runner.run(task).await;

        let mut state = self.inner.state.lock();
        state.running.remove(&task_id);
        // A concurrent cancel_task may have already marked this terminal.
        if let Some(record) = state.tasks.get_mut(&task_id) {
            if record.status.state == TaskState::Running {
                record.status.state = if result.success { TaskState::Completed } else { TaskState::Failed };
                record.status.completed_at = Some(result.completed_at);
                record.status.error = result.error.clone();
                record.result = Some(result.clone());
                state.metrics.record(result.success, result.duration.as_millis() as u64);
            }
        }
        drop(state);

        // Free the slot and wake any waiter before running handlers: a slow
        // or blocking handler must not delay dispatch of the next task.
        self.inner.notify.notify_waiters();
        self.dispatch();

        let handlers = self.inner.handlers.lock();
        if result.success {
            for handler in &handlers.on_complete {
                handler(result.clone());
            }
        } else {
            for handler in &handlers.on_failed {
                handler(result.clone());
            }
        }
        drop(handlers);
    }
}

fn is_runnable(state: &EngineState, id: TaskId) -> bool {
    let Some(record) = state.tasks.get(&id) else { return false };
    if record.status.state != TaskState::Queued {
        return false;
    }
    record.task.dependencies.iter().all(|dep| match state.tasks.get(dep) {
        Some(dep_record) => dep_record.status.state == TaskState::Completed,
        None => false,
    })
}

/// Any queued task whose dependency list names a failed/cancelled task
/// transitions directly to failed, without ever running. Runs to a fixed
/// point so transitive failures propagate within one dispatch cycle.
fn propagate_dependency_failures(state: &mut EngineState, handlers: &Mutex<Handlers>) {
    loop {
        let blocked: Vec<TaskId> = state
            .queued
            .iter()
            .copied()
            .filter(|id| {
                let record = &state.tasks[id];
                record.task.dependencies.iter().any(|dep| match state.tasks.get(dep) {
                    Some(dep_record) => matches!(dep_record.status.state, TaskState::Failed | TaskState::Cancelled),
                    None => false,
                })
            })
            .collect();
        if blocked.is_empty() {
            return;
        }
        for id in &blocked {
            state.queued.retain(|qid| qid != id);
            let Some(record) = state.tasks.get_mut(id) else { continue };
            record.status.state = TaskState::Failed;
            record.status.completed_at = Some(SystemTime::now());
            record.status.error = Some("dependency failure".to_string());
            let result = ExecutionResult::failure(*id, SystemTime::now(), "dependency failure");
            record.result = Some(result.clone());
            state.metrics.record(false, 0);
            let handlers = handlers.lock();
            for handler in &handlers.on_failed {
                handler(result.clone());
            }
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
