// SPDX-License-Identifier: MIT

use crate::process::ProcessId;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("process {0} not found")]
    NotFound(ProcessId),

    #[error("process {0} has no open stdin")]
    StdinClosed(ProcessId),

    #[error("failed to write to process {0} stdin: {1}")]
    WriteFailed(ProcessId, #[source] std::io::Error),

    #[error("failed to signal process {0}: {1}")]
    SignalFailed(ProcessId, #[source] nix::errno::Errno),

    #[error("process {0} did not exit within the graceful shutdown window")]
    GracefulTimeout(ProcessId),
}

pub type ProcessResult<T> = Result<T, ProcessError>;
