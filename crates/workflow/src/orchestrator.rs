// SPDX-License-Identifier: MIT

//! Drives a [`WorkflowDefinition`] through its steps: dependency gating,
//! condition evaluation, templated prompts, resilient execution, output
//! mapping, and periodic/forced checkpointing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::Notify;

use forge_core::{Clock, SystemClock};
use forge_engine::ExecutionTask;
use forge_resilient::ResilientExecutor;

use crate::checkpoint::{CheckpointStore, StepOutcomeSnapshot, WorkflowCheckpoint};
use crate::condition;
use crate::error::{WorkflowError, WorkflowResult};
use crate::model::{
    StepState, StepStatus, WorkflowDefinition, WorkflowExecution, WorkflowExecutionId, WorkflowId,
    WorkflowResult as WorkflowOutcome, WorkflowStatus, WorkflowStep,
};
use crate::template;

/// How long `pauseWorkflow` waits for an in-flight step to reach a terminal
/// outcome before giving up on observing the pause take effect.
const PAUSE_GRACE: Duration = Duration::from_secs(5);
/// Internal safety bound for `waitForWorkflow`; a hung task runner should
/// eventually surface as a timeout rather than an indefinite wait.
const WAIT_TIMEOUT: Duration = Duration::from_secs(300);

type ExecutionHandler = Box<dyn Fn(&WorkflowExecution) + Send + Sync>;
type StepStartHandler = Box<dyn Fn(&WorkflowExecutionId, &str) + Send + Sync>;
type StepCompleteHandler = Box<dyn Fn(&WorkflowExecutionId, &StepStatus) + Send + Sync>;
type StepFailedHandler = Box<dyn Fn(&WorkflowExecutionId, &str, &str) + Send + Sync>;
type CheckpointHandler = Box<dyn Fn(&WorkflowCheckpoint) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    on_start: Vec<ExecutionHandler>,
    on_complete: Vec<ExecutionHandler>,
    on_failed: Vec<ExecutionHandler>,
    on_resume: Vec<ExecutionHandler>,
    on_pause: Vec<ExecutionHandler>,
    on_cancel: Vec<ExecutionHandler>,
    on_step_start: Vec<StepStartHandler>,
    on_step_complete: Vec<StepCompleteHandler>,
    on_step_failed: Vec<StepFailedHandler>,
    on_checkpoint: Vec<CheckpointHandler>,
}

struct ExecutionHandle {
    execution: RwLock<WorkflowExecution>,
    pause_requested: AtomicBool,
    outcome: Mutex<Option<WorkflowOutcome>>,
    notify: Notify,
}

/// Coordinates one or more [`WorkflowExecution`]s against a shared
/// [`ResilientExecutor`] and an optional [`CheckpointStore`].
///
/// Generic over [`Clock`] so checkpoint `created_at` timestamps can be
/// driven by a `FakeClock` in tests; defaults to [`SystemClock`].
#[derive(Clone)]
pub struct WorkflowOrchestrator<C: Clock = SystemClock> {
    inner: Arc<Inner<C>>,
}

struct Inner<C: Clock> {
    resilient: ResilientExecutor<C>,
    store: Option<Arc<dyn CheckpointStore>>,
    executions: Mutex<HashMap<WorkflowExecutionId, Arc<ExecutionHandle>>>,
    handlers: Mutex<Handlers>,
    clock: C,
}

impl WorkflowOrchestrator<SystemClock> {
    pub fn new(resilient: ResilientExecutor<SystemClock>, store: Option<Arc<dyn CheckpointStore>>) -> Self {
        Self::with_clock(resilient, store, SystemClock)
    }
}

impl<C: Clock> WorkflowOrchestrator<C> {
    pub fn with_clock(resilient: ResilientExecutor<C>, store: Option<Arc<dyn CheckpointStore>>, clock: C) -> Self {
        Self {
            inner: Arc::new(Inner {
                resilient,
                store,
                executions: Mutex::new(HashMap::new()),
                handlers: Mutex::new(Handlers::default()),
                clock,
            }),
        }
    }

    pub fn on_workflow_start(&self, handler: impl Fn(&WorkflowExecution) + Send + Sync + 'static) {
        self.inner.handlers.lock().on_start.push(Box::new(handler));
    }

    pub fn on_workflow_complete(&self, handler: impl Fn(&WorkflowExecution) + Send + Sync + 'static) {
        self.inner.handlers.lock().on_complete.push(Box::new(handler));
    }

    pub fn on_workflow_failed(&self, handler: impl Fn(&WorkflowExecution) + Send + Sync + 'static) {
        self.inner.handlers.lock().on_failed.push(Box::new(handler));
    }

    pub fn on_workflow_resume(&self, handler: impl Fn(&WorkflowExecution) + Send + Sync + 'static) {
        self.inner.handlers.lock().on_resume.push(Box::new(handler));
    }

    pub fn on_workflow_pause(&self, handler: impl Fn(&WorkflowExecution) + Send + Sync + 'static) {
        self.inner.handlers.lock().on_pause.push(Box::new(handler));
    }

    pub fn on_workflow_cancel(&self, handler: impl Fn(&WorkflowExecution) + Send + Sync + 'static) {
        self.inner.handlers.lock().on_cancel.push(Box::new(handler));
    }

    pub fn on_step_start(&self, handler: impl Fn(&WorkflowExecutionId, &str) + Send + Sync + 'static) {
        self.inner.handlers.lock().on_step_start.push(Box::new(handler));
    }

    pub fn on_step_complete(&self, handler: impl Fn(&WorkflowExecutionId, &StepStatus) + Send + Sync + 'static) {
        self.inner.handlers.lock().on_step_complete.push(Box::new(handler));
    }

    pub fn on_step_failed(&self, handler: impl Fn(&WorkflowExecutionId, &str, &str) + Send + Sync + 'static) {
        self.inner.handlers.lock().on_step_failed.push(Box::new(handler));
    }

    pub fn on_checkpoint(&self, handler: impl Fn(&WorkflowCheckpoint) + Send + Sync + 'static) {
        self.inner.handlers.lock().on_checkpoint.push(Box::new(handler));
    }

    /// Register and launch a new execution of `definition`, running to
    /// completion (or pause/cancel/failure) in the background. Returns
    /// immediately with the new execution's id.
    pub fn start_workflow(&self, definition: WorkflowDefinition) -> WorkflowExecutionId {
        let mut execution = WorkflowExecution::new(definition);
        execution.context = execution.definition.initial_context.clone();
        execution.status = WorkflowStatus::Running;
        execution.started_at = Some(SystemTime::now());
        let execution_id = execution.execution_id;

        let handle = Arc::new(ExecutionHandle {
            execution: RwLock::new(execution),
            pause_requested: AtomicBool::new(false),
            outcome: Mutex::new(None),
            notify: Notify::new(),
        });
        self.inner.executions.lock().insert(execution_id, handle.clone());

        {
            let handlers = self.inner.handlers.lock();
            let exec = handle.execution.read();
            for h in &handlers.on_start {
                h(&exec);
            }
        }

        let this = self.clone();
        tokio::spawn(async move { this.run_loop(handle, 0).await });
        execution_id
    }

    /// Restore the most recent checkpoint for `execution_id` and continue
    /// running from where it left off. Requires a configured checkpoint store.
    pub async fn resume_workflow(&self, execution_id: WorkflowExecutionId) -> WorkflowResult<()> {
        let store = self.inner.store.as_ref().ok_or(WorkflowError::NoCheckpointStore)?;
        let checkpoint = store
            .load_checkpoint(&execution_id)
            .await?
            .ok_or(WorkflowError::CheckpointMissing(execution_id))?;

        let mut execution = WorkflowExecution::new(checkpoint.definition.clone());
        execution.execution_id = execution_id;
        execution.current_step_index = checkpoint.current_step_index;
        execution.context = checkpoint.context.clone();
        execution.status = WorkflowStatus::Running;
        execution.started_at = checkpoint.started_at.or(Some(SystemTime::now()));
        execution.resumed_at = Some(SystemTime::now());
        execution.error = None;
        execution.step_results = checkpoint
            .step_results
            .iter()
            .map(|snapshot| snapshot.as_ref().map(snapshot_to_status))
            .collect();

        let handle = Arc::new(ExecutionHandle {
            execution: RwLock::new(execution),
            pause_requested: AtomicBool::new(false),
            outcome: Mutex::new(None),
            notify: Notify::new(),
        });
        self.inner.executions.lock().insert(execution_id, handle.clone());

        {
            let handlers = self.inner.handlers.lock();
            let exec = handle.execution.read();
            for h in &handlers.on_resume {
                h(&exec);
            }
        }

        let start_index = checkpoint.current_step_index;
        let this = self.clone();
        tokio::spawn(async move { this.run_loop(handle, start_index).await });
        Ok(())
    }

    /// Request that a running execution pause before its next step. Waits a
    /// bounded grace period for the in-flight step to reach a terminal
    /// outcome and the pause to actually take effect.
    pub async fn pause_workflow(&self, execution_id: WorkflowExecutionId) -> WorkflowResult<()> {
        let handle = self.handle(execution_id)?;
        {
            let exec = handle.execution.read();
            if exec.status != WorkflowStatus::Running {
                return Err(WorkflowError::NotRunning(execution_id, "running"));
            }
        }
        handle.pause_requested.store(true, Ordering::SeqCst);

        let deadline = tokio::time::Instant::now() + PAUSE_GRACE;
        loop {
            let notified = handle.notify.notified();
            if handle.execution.read().status != WorkflowStatus::Running {
                return Ok(());
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(());
            }
        }
    }

    /// Cancel an execution. Idempotent; legal in any non-terminal state.
    pub async fn cancel_workflow(&self, execution_id: WorkflowExecutionId) -> WorkflowResult<()> {
        let handle = self.handle(execution_id)?;
        {
            let mut exec = handle.execution.write();
            if exec.status.is_terminal() {
                return Ok(());
            }
            exec.status = WorkflowStatus::Cancelled;
            exec.completed_at = Some(SystemTime::now());
        }
        self.checkpoint(&handle).await;
        {
            let handlers = self.inner.handlers.lock();
            let exec = handle.execution.read();
            for h in &handlers.on_cancel {
                h(&exec);
            }
        }
        handle.notify.notify_waiters();
        Ok(())
    }

    pub fn get_execution(&self, execution_id: WorkflowExecutionId) -> WorkflowResult<WorkflowExecution> {
        Ok(self.handle(execution_id)?.execution.read().clone())
    }

    pub fn get_step_status(&self, execution_id: WorkflowExecutionId, step_id: &str) -> WorkflowResult<StepStatus> {
        let handle = self.handle(execution_id)?;
        let exec = handle.execution.read();
        let index = exec
            .definition
            .steps
            .iter()
            .position(|s| s.id == step_id)
            .ok_or_else(|| WorkflowError::StepNotFound(step_id.to_string()))?;
        Ok(exec.step_results[index].clone().unwrap_or(StepStatus {
            step_id: step_id.to_string(),
            state: StepState::Pending,
            result: None,
            attempts: 0,
        }))
    }

    /// Block until `execution_id` reaches a terminal state, or until an
    /// internal timeout elapses.
    pub async fn wait_for_workflow(&self, execution_id: WorkflowExecutionId) -> WorkflowResult<WorkflowOutcome> {
        let handle = self.handle(execution_id)?;
        let result = tokio::time::timeout(WAIT_TIMEOUT, async {
            loop {
                if let Some(outcome) = handle.outcome.lock().clone() {
                    return outcome;
                }
                let notified = handle.notify.notified();
                if handle.outcome.lock().is_some() {
                    continue;
                }
                notified.await;
            }
        })
        .await;
        result.map_err(|_| WorkflowError::NotRunning(execution_id, "terminal (wait timed out)"))
    }

    pub async fn list_checkpoints(&self, workflow_id: Option<&WorkflowId>) -> WorkflowResult<Vec<WorkflowCheckpoint>> {
        let store = self.inner.store.as_ref().ok_or(WorkflowError::NoCheckpointStore)?;
        Ok(store.list_checkpoints(workflow_id).await?)
    }

    fn handle(&self, execution_id: WorkflowExecutionId) -> WorkflowResult<Arc<ExecutionHandle>> {
        self.inner
            .executions
            .lock()
            .get(&execution_id)
            .cloned()
            .ok_or(WorkflowError::NotFound(execution_id))
    }

    async fn checkpoint(&self, handle: &Arc<ExecutionHandle>) {
        let Some(store) = &self.inner.store else { return };
        let checkpoint = {
            let exec = handle.execution.read();
            WorkflowCheckpoint::from_execution(&exec, &self.inner.clock)
        };
        if store.save_checkpoint(&checkpoint).await.is_ok() {
            let handlers = self.inner.handlers.lock();
            for h in &handlers.on_checkpoint {
                h(&checkpoint);
            }
        }
    }

    /// The per-execution step loop, run on a background task from either
    /// `start_workflow` or `resume_workflow`.
    async fn run_loop(&self, handle: Arc<ExecutionHandle>, start_index: usize) {
        let execution_id = handle.execution.read().execution_id;
        let steps_len = handle.execution.read().definition.steps.len();

        let mut i = start_index;
        while i < steps_len {
            {
                let mut exec = handle.execution.write();
                if exec.status.is_terminal() {
                    return;
                }
                if handle.pause_requested.swap(false, Ordering::SeqCst) {
                    exec.status = WorkflowStatus::Paused;
                    exec.paused_at = Some(SystemTime::now());
                    drop(exec);
                    self.checkpoint(&handle).await;
                    let handlers = self.inner.handlers.lock();
                    let exec = handle.execution.read();
                    for h in &handlers.on_pause {
                        h(&exec);
                    }
                    drop(handlers);
                    handle.notify.notify_waiters();
                    return;
                }
            }

            let step = handle.execution.read().definition.steps[i].clone();
            let continue_on_failure = handle.execution.read().definition.config.continue_on_step_failure;
            let checkpoint_interval = handle.execution.read().definition.config.checkpoint_interval;

            // Resume fast-path: a step already recorded successful is not re-run.
            if let Some(Some(existing)) = handle.execution.read().step_results.get(i) {
                if matches!(existing.state, StepState::Completed | StepState::Skipped) {
                    i += 1;
                    continue;
                }
            }

            if let Some(reason) = unmet_dependency(&handle, &step, i) {
                self.record_step_failure(&handle, &execution_id, i, &step.id, &reason).await;
                if continue_on_failure {
                    i += 1;
                    continue;
                }
                self.fail_workflow(&handle, reason).await;
                return;
            }

            let admitted = match &step.condition {
                Some(expr) if !expr.trim().is_empty() => {
                    let context = handle.execution.read().context.clone();
                    condition::evaluate(expr, &context).unwrap_or(false)
                }
                _ => true,
            };
            if !admitted {
                let mut exec = handle.execution.write();
                exec.step_results[i] = Some(StepStatus { step_id: step.id.clone(), state: StepState::Skipped, result: None, attempts: 0 });
                exec.current_step_index = i + 1;
                drop(exec);
                i += 1;
                continue;
            }

            {
                let handlers = self.inner.handlers.lock();
                for h in &handlers.on_step_start {
                    h(&execution_id, &step.id);
                }
            }

            let context = handle.execution.read().context.clone();
            let prompt = template::render(&step.prompt_template, &context);
            let task = ExecutionTask::new(step.task_type.clone(), prompt, std::env::temp_dir()).config(step.task_config.clone());

            let outcome = self.inner.resilient.execute_task(task, step.retry_policy.clone()).await;

            {
                let mut exec = handle.execution.write();
                if exec.status.is_terminal() {
                    return;
                }
                match outcome {
                    Ok(result) => {
                        let success = result.success;
                        let attempts = result.total_attempts;
                        let last_output = result.attempts.last().map(|a| {
                            serde_json::json!({
                                "success": a.result.success,
                                "exitCode": a.result.exit_code,
                                "output": a.result.output,
                                "error": a.result.error,
                            })
                        });
                        let status = StepStatus {
                            step_id: step.id.clone(),
                            state: if success { StepState::Completed } else { StepState::Failed },
                            result: Some(result),
                            attempts,
                        };
                        exec.step_results[i] = Some(status.clone());

                        if success {
                            if let Some(value) = &last_output {
                                apply_output_mapping(&mut exec.context, &step.output_mapping, value);
                            }
                            exec.current_step_index = i + 1;
                            drop(exec);
                            {
                                let handlers = self.inner.handlers.lock();
                                for h in &handlers.on_step_complete {
                                    h(&execution_id, &status);
                                }
                            }
                            if checkpoint_interval.is_some_and(|n| n > 0 && (i + 1) % n == 0) {
                                self.checkpoint(&handle).await;
                            }
                        } else {
                            let reason = status.result.as_ref().and_then(|r| r.attempts.last().and_then(|a| a.result.error.clone())).unwrap_or_else(|| "task failed".to_string());
                            drop(exec);
                            {
                                let handlers = self.inner.handlers.lock();
                                for h in &handlers.on_step_failed {
                                    h(&execution_id, &step.id, &reason);
                                }
                            }
                            if continue_on_failure {
                                let mut exec = handle.execution.write();
                                exec.current_step_index = i + 1;
                            } else {
                                self.fail_workflow(&handle, reason).await;
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        drop(exec);
                        let reason = err.to_string();
                        self.record_step_failure(&handle, &execution_id, i, &step.id, &reason).await;
                        if continue_on_failure {
                            let mut exec = handle.execution.write();
                            exec.current_step_index = i + 1;
                        } else {
                            self.fail_workflow(&handle, reason).await;
                            return;
                        }
                    }
                }
            }

            i += 1;
        }

        self.complete_workflow(&handle).await;
    }

    async fn record_step_failure(&self, handle: &Arc<ExecutionHandle>, execution_id: &WorkflowExecutionId, index: usize, step_id: &str, reason: &str) {
        {
            let mut exec = handle.execution.write();
            exec.step_results[index] = Some(StepStatus { step_id: step_id.to_string(), state: StepState::Failed, result: None, attempts: 0 });
        }
        let handlers = self.inner.handlers.lock();
        for h in &handlers.on_step_failed {
            h(execution_id, step_id, reason);
        }
    }

    async fn fail_workflow(&self, handle: &Arc<ExecutionHandle>, reason: String) {
        {
            let mut exec = handle.execution.write();
            exec.status = WorkflowStatus::Failed;
            exec.error = Some(reason);
            exec.completed_at = Some(SystemTime::now());
        }
        self.checkpoint(handle).await;
        let outcome = build_outcome(&handle.execution.read());
        *handle.outcome.lock() = Some(outcome);
        {
            let handlers = self.inner.handlers.lock();
            let exec = handle.execution.read();
            for h in &handlers.on_failed {
                h(&exec);
            }
        }
        handle.notify.notify_waiters();
    }

    async fn complete_workflow(&self, handle: &Arc<ExecutionHandle>) {
        {
            let mut exec = handle.execution.write();
            exec.status = WorkflowStatus::Completed;
            exec.completed_at = Some(SystemTime::now());
        }
        self.checkpoint(handle).await;
        let outcome = build_outcome(&handle.execution.read());
        *handle.outcome.lock() = Some(outcome);
        {
            let handlers = self.inner.handlers.lock();
            let exec = handle.execution.read();
            for h in &handlers.on_complete {
                h(&exec);
            }
        }
        handle.notify.notify_waiters();
    }
}

fn snapshot_to_status(snapshot: &StepOutcomeSnapshot) -> StepStatus {
    StepStatus {
        step_id: snapshot.step_id.clone(),
        state: if snapshot.success { StepState::Completed } else { StepState::Failed },
        result: snapshot.result.clone(),
        attempts: snapshot.attempts,
    }
}

fn unmet_dependency(handle: &Arc<ExecutionHandle>, step: &WorkflowStep, index: usize) -> Option<String> {
    let exec = handle.execution.read();
    for dep in &step.dependencies {
        let satisfied = exec.definition.steps[..index]
            .iter()
            .position(|s| &s.id == dep)
            .and_then(|dep_index| exec.step_results[dep_index].as_ref())
            .is_some_and(|status| matches!(status.state, StepState::Completed));
        if !satisfied {
            return Some(format!("dependency {dep:?} not satisfied"));
        }
    }
    None
}

fn apply_output_mapping(context: &mut Value, mappings: &[crate::model::OutputMapping], result_value: &Value) {
    if mappings.is_empty() {
        return;
    }
    if !context.is_object() {
        *context = Value::Object(Default::default());
    }
    let Some(object) = context.as_object_mut() else { return };
    for mapping in mappings {
        let resolved = template::resolve_path(result_value, &mapping.result_path).cloned().unwrap_or(Value::Null);
        object.insert(mapping.context_key.clone(), resolved);
    }
}

fn build_outcome(execution: &WorkflowExecution) -> WorkflowOutcome {
    let completed_steps = execution.step_results.iter().flatten().filter(|s| matches!(s.state, StepState::Completed)).count();
    let failed_steps = execution.step_results.iter().flatten().filter(|s| matches!(s.state, StepState::Failed)).count();
    let skipped_steps = execution.step_results.iter().flatten().filter(|s| matches!(s.state, StepState::Skipped)).count();
    let duration_ms = execution
        .started_at
        .and_then(|start| execution.completed_at.map(|end| end.duration_since(start).unwrap_or_default()))
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    WorkflowOutcome {
        execution_id: execution.execution_id,
        success: execution.status == WorkflowStatus::Completed && failed_steps == 0,
        completed_steps,
        failed_steps,
        skipped_steps,
        outputs: execution.context.clone(),
        duration_ms,
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
