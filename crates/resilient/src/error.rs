// SPDX-License-Identifier: MIT

use forge_engine::TaskId;

#[derive(Debug, thiserror::Error)]
pub enum ResilientError {
    #[error("engine error while executing task {0}: {1}")]
    Engine(TaskId, #[source] forge_engine::EngineError),
}

pub type ResilientResult<T> = Result<T, ResilientError>;
