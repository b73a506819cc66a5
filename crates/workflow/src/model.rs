// SPDX-License-Identifier: MIT

//! Workflow definitions, executions, and step status types.

use std::collections::HashMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use forge_resilient::{ResilientExecutionResult, RetryPolicy};

forge_core::define_id! {
    /// Identifies a [`WorkflowDefinition`].
    pub struct WorkflowId("wfl-");
}

forge_core::define_id! {
    /// Identifies one run of a workflow.
    pub struct WorkflowExecutionId("wex-");
}

/// Maps a context key to a dot-/bracket-path into a step's result, used to
/// promote an `ExecutionResult`'s output into later steps' context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputMapping {
    pub context_key: String,
    pub result_path: String,
}

/// One step in a [`WorkflowDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub task_type: String,
    pub prompt_template: String,
    pub task_config: HashMap<String, Value>,
    pub retry_policy: Option<RetryPolicy>,
    pub dependencies: Vec<String>,
    pub condition: Option<String>,
    pub output_mapping: Vec<OutputMapping>,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, task_type: impl Into<String>, prompt_template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            prompt_template: prompt_template.into(),
            task_config: HashMap::new(),
            retry_policy: None,
            dependencies: Vec::new(),
            condition: None,
            output_mapping: Vec::new(),
        }
    }

    pub fn dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    forge_core::setters! {
        option { condition: String }
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn output_mapping(mut self, context_key: impl Into<String>, result_path: impl Into<String>) -> Self {
        self.output_mapping.push(OutputMapping { context_key: context_key.into(), result_path: result_path.into() });
        self
    }
}

/// Workflow-level knobs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub continue_on_step_failure: bool,
    /// Steps between periodic checkpoints; `None` disables periodic saves
    /// (pause/cancel/failure checkpoints still happen).
    pub checkpoint_interval: Option<usize>,
}

/// The static shape of a workflow: its ordered steps and starting context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub steps: Vec<WorkflowStep>,
    pub initial_context: Value,
    pub config: WorkflowConfig,
}

impl WorkflowDefinition {
    pub fn new(id: WorkflowId, steps: Vec<WorkflowStep>) -> Self {
        Self { id, steps, initial_context: Value::Object(Default::default()), config: WorkflowConfig::default() }
    }

    pub fn initial_context(mut self, context: Value) -> Self {
        self.initial_context = context;
        self
    }

    pub fn config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }
}

/// Lifecycle state of a [`WorkflowExecution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

forge_core::simple_display! {
    WorkflowStatus {
        Pending => "pending",
        Running => "running",
        Paused => "paused",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled)
    }
}

/// Status of an individual step, as returned by `getStepStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

forge_core::simple_display! {
    StepState {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Skipped => "skipped",
    }
}

#[derive(Debug, Clone)]
pub struct StepStatus {
    pub step_id: String,
    pub state: StepState,
    pub result: Option<ResilientExecutionResult>,
    pub attempts: u32,
}

/// A running or finished workflow instance.
#[derive(Debug, Clone)]
pub struct WorkflowExecution {
    pub execution_id: WorkflowExecutionId,
    pub workflow_id: WorkflowId,
    pub definition: WorkflowDefinition,
    pub status: WorkflowStatus,
    /// Index of the *next* step to run; `0 <= current_step_index <= steps.len()`.
    pub current_step_index: usize,
    pub context: Value,
    pub step_results: Vec<Option<StepStatus>>,
    pub started_at: Option<SystemTime>,
    pub paused_at: Option<SystemTime>,
    pub resumed_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
    pub error: Option<String>,
}

impl WorkflowExecution {
    pub fn new(definition: WorkflowDefinition) -> Self {
        let step_count = definition.steps.len();
        Self {
            execution_id: WorkflowExecutionId::new(),
            workflow_id: definition.id,
            step_results: vec![None; step_count],
            definition,
            status: WorkflowStatus::Pending,
            current_step_index: 0,
            context: Value::Object(Default::default()),
            started_at: None,
            paused_at: None,
            resumed_at: None,
            completed_at: None,
            error: None,
        }
    }
}

/// Final aggregate outcome emitted with `workflow-complete`.
#[derive(Debug, Clone)]
pub struct WorkflowResult {
    pub execution_id: WorkflowExecutionId,
    pub success: bool,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub skipped_steps: usize,
    pub outputs: Value,
    pub duration_ms: u64,
}
