// SPDX-License-Identifier: MIT

//! `forge checkpoints` — list saved workflow checkpoints.

use std::path::PathBuf;

use clap::Args;

use forge_workflow::{CheckpointStore, FileCheckpointStore, WorkflowId};

use crate::exit_error::ExitError;

#[derive(Debug, Args)]
pub struct CheckpointsArgs {
    /// Directory checkpoints are read from.
    #[arg(long, default_value = ".forge/checkpoints")]
    pub checkpoint_dir: PathBuf,

    /// Only show checkpoints for this workflow id.
    #[arg(long)]
    pub workflow_id: Option<String>,
}

pub async fn run(args: CheckpointsArgs) -> Result<(), ExitError> {
    let store = FileCheckpointStore::new(&args.checkpoint_dir);
    let workflow_id = args.workflow_id.map(WorkflowId::from_string);
    let checkpoints = store.list_checkpoints(workflow_id.as_ref()).await?;

    for checkpoint in checkpoints {
        println!(
            "{}",
            serde_json::json!({
                "executionId": checkpoint.execution_id,
                "workflowId": checkpoint.workflow_id,
                "status": checkpoint.status,
                "currentStepIndex": checkpoint.current_step_index,
            })
        );
    }
    Ok(())
}
