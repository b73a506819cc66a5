// SPDX-License-Identifier: MIT

use crate::task::TaskId;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("engine is shutting down and no longer accepts submissions")]
    ShuttingDown,

    #[error("task {0} never reached a terminal state before the wait timeout elapsed")]
    WaitTimeout(TaskId),
}

pub type EngineResult<T> = Result<T, EngineError>;
