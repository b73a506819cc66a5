// SPDX-License-Identifier: MIT

//! Durable workflow snapshots and the storage contract for saving/loading them.

use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use forge_core::Clock;
use forge_resilient::ResilientExecutionResult;

use crate::model::{WorkflowDefinition, WorkflowExecution, WorkflowExecutionId, WorkflowId, WorkflowStatus};

/// Current checkpoint schema version.
pub const CURRENT_CHECKPOINT_VERSION: u32 = 1;

/// A step's outcome as recorded at checkpoint time, carrying the full
/// [`ResilientExecutionResult`] so a restored execution's `getStepStatus`
/// reports the same attempt count and result a live execution would.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcomeSnapshot {
    pub step_id: String,
    pub success: bool,
    pub error: Option<String>,
    pub result: Option<ResilientExecutionResult>,
    pub attempts: u32,
}

/// A complete, self-sufficient snapshot of one workflow execution.
///
/// Includes the full [`WorkflowDefinition`] so a resumed execution never
/// depends on an external definition registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowCheckpoint {
    /// Schema version for migrations. Checkpoints written before this field
    /// existed deserialize as version 1.
    #[serde(rename = "v", default = "default_checkpoint_version")]
    pub schema_version: u32,
    pub workflow_id: String,
    pub execution_id: String,
    pub definition: WorkflowDefinition,
    pub status: WorkflowStatus,
    pub current_step_index: usize,
    pub context: Value,
    pub step_results: Vec<Option<StepOutcomeSnapshot>>,
    pub error: Option<String>,
    pub started_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
    pub created_at: SystemTime,
}

fn default_checkpoint_version() -> u32 {
    1
}

impl WorkflowCheckpoint {
    /// Build a checkpoint from the current state of `execution`, stamping
    /// `created_at` from `clock` so checkpoint timestamps are deterministic
    /// under a `FakeClock` in tests.
    pub fn from_execution(execution: &WorkflowExecution, clock: &impl Clock) -> Self {
        Self {
            schema_version: CURRENT_CHECKPOINT_VERSION,
            workflow_id: execution.workflow_id.to_string(),
            execution_id: execution.execution_id.to_string(),
            definition: execution.definition.clone(),
            status: execution.status,
            current_step_index: execution.current_step_index,
            context: execution.context.clone(),
            step_results: execution
                .step_results
                .iter()
                .map(|maybe| {
                    maybe.as_ref().map(|s| StepOutcomeSnapshot {
                        step_id: s.step_id.clone(),
                        success: matches!(s.state, crate::model::StepState::Completed),
                        error: s.result.as_ref().and_then(|r| if r.success { None } else { r.attempts.last().and_then(|a| a.result.error.clone()) }),
                        attempts: s.attempts,
                        result: s.result.clone(),
                    })
                })
                .collect(),
            error: execution.error.clone(),
            started_at: execution.started_at,
            completed_at: execution.completed_at,
            created_at: clock.system_time(),
        }
    }
}

/// Durable checkpoint storage. Any backend satisfying this contract
/// (filesystem, KV store, relational row) is acceptable.
#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save_checkpoint(&self, checkpoint: &WorkflowCheckpoint) -> std::io::Result<()>;
    async fn load_checkpoint(&self, execution_id: &WorkflowExecutionId) -> std::io::Result<Option<WorkflowCheckpoint>>;
    async fn list_checkpoints(&self, workflow_id: Option<&WorkflowId>) -> std::io::Result<Vec<WorkflowCheckpoint>>;
}

/// A [`CheckpointStore`] backed by one JSON file per execution id, written
/// atomically (write to a temp file, rename over the target) with the prior
/// version rotated to `.bak`.
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, execution_id: &str) -> PathBuf {
        self.dir.join(format!("{execution_id}.json"))
    }
}

#[async_trait::async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save_checkpoint(&self, checkpoint: &WorkflowCheckpoint) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.path_for(&checkpoint.execution_id);
        let tmp = target.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(checkpoint)?;
        tokio::fs::write(&tmp, &body).await?;

        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            let backup = target.with_extension("json.bak");
            tokio::fs::rename(&target, &backup).await?;
        }
        tokio::fs::rename(&tmp, &target).await?;
        Ok(())
    }

    async fn load_checkpoint(&self, execution_id: &WorkflowExecutionId) -> std::io::Result<Option<WorkflowCheckpoint>> {
        let path = self.path_for(execution_id.as_str());
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(Some(serde_json::from_slice(&body)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn list_checkpoints(&self, workflow_id: Option<&WorkflowId>) -> std::io::Result<Vec<WorkflowCheckpoint>> {
        let mut checkpoints = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(checkpoints),
            Err(err) => return Err(err),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let body = tokio::fs::read(entry.path()).await?;
            let checkpoint: WorkflowCheckpoint = serde_json::from_slice(&body)?;
            if workflow_id.map_or(true, |id| checkpoint.workflow_id == id.as_str()) {
                checkpoints.push(checkpoint);
            }
        }
        checkpoints.sort_by_key(|c| c.created_at);
        Ok(checkpoints)
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
