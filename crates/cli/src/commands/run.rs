// SPDX-License-Identifier: MIT

//! `forge run` — execute a workflow definition loaded from a TOML file.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use forge_engine::{EngineConfig, ExecutionEngine, ProcessTaskRunner};
use forge_process::{ProcessManager, ProcessManagerConfig};
use forge_resilient::{ResilientExecutor, RetryPolicy};
use forge_workflow::{CheckpointStore, FileCheckpointStore, WorkflowDefinition, WorkflowOrchestrator};

use crate::exit_error::ExitError;
use crate::process_template::shell_template;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to a TOML file describing the workflow's steps.
    pub definition: PathBuf,

    /// Directory checkpoints are written to and resumed from.
    #[arg(long, default_value = ".forge/checkpoints")]
    pub checkpoint_dir: PathBuf,
}

pub async fn run(args: RunArgs) -> Result<(), ExitError> {
    let body = std::fs::read_to_string(&args.definition)?;
    let definition: WorkflowDefinition = toml::from_str(&body)?;

    let manager = ProcessManager::new(ProcessManagerConfig::default());
    let runner = Arc::new(ProcessTaskRunner::new(manager, shell_template()));
    let engine = ExecutionEngine::new(EngineConfig::default(), runner);
    let resilient = ResilientExecutor::new(engine, RetryPolicy::default());
    let store: Arc<dyn CheckpointStore> = Arc::new(FileCheckpointStore::new(&args.checkpoint_dir));
    let orchestrator = WorkflowOrchestrator::new(resilient, Some(store));

    orchestrator.on_step_start(|execution_id, step_id| {
        tracing::info!(%execution_id, step_id, "step started");
    });
    orchestrator.on_step_failed(|execution_id, step_id, reason| {
        tracing::warn!(%execution_id, step_id, reason, "step failed");
    });

    let execution_id = orchestrator.start_workflow(definition);
    let outcome = orchestrator.wait_for_workflow(execution_id).await?;

    println!(
        "{}",
        serde_json::json!({
            "executionId": execution_id.to_string(),
            "success": outcome.success,
            "completedSteps": outcome.completed_steps,
            "failedSteps": outcome.failed_steps,
            "skippedSteps": outcome.skipped_steps,
            "durationMs": outcome.duration_ms,
            "outputs": outcome.outputs,
        })
    );

    if outcome.success {
        Ok(())
    } else {
        Err(ExitError::new(1, "workflow did not complete successfully"))
    }
}
