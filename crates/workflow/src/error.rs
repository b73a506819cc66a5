// SPDX-License-Identifier: MIT

use crate::model::WorkflowExecutionId;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("workflow execution {0} not found")]
    NotFound(WorkflowExecutionId),

    #[error("workflow execution {0} is {1}, expected running")]
    NotRunning(WorkflowExecutionId, &'static str),

    #[error("no checkpoint found for execution {0}")]
    CheckpointMissing(WorkflowExecutionId),

    #[error("checkpoint resume requires a configured checkpoint store")]
    NoCheckpointStore,

    #[error("step {0:?} not found in this workflow's definition")]
    StepNotFound(String),

    #[error("io error persisting checkpoint: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine error: {0}")]
    Resilient(#[from] forge_resilient::ResilientError),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
