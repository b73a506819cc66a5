// SPDX-License-Identifier: MIT

//! Process spawn configuration.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a spawned process's stdout/stderr is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoMode {
    /// Chunks are forwarded to handlers as whole lines, verbatim.
    #[default]
    LineBatched,
    /// Like `LineBatched`, but each line is additionally attempted as a
    /// JSON record. Successful parses also fire the process's message
    /// handlers; malformed lines are forwarded to terminal handlers only.
    Hybrid,
}

/// Optional terminal size hint passed to a spawned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

/// Configuration for spawning a single child process.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub terminal_size: Option<TerminalSize>,
    pub io_mode: IoMode,
}

impl ProcessConfig {
    pub fn new(executable: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: HashMap::new(),
            terminal_size: None,
            io_mode: IoMode::LineBatched,
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn io_mode(mut self, io_mode: IoMode) -> Self {
        self.io_mode = io_mode;
        self
    }

    pub fn terminal_size(mut self, cols: u16, rows: u16) -> Self {
        self.terminal_size = Some(TerminalSize { cols, rows });
        self
    }
}

/// Configuration for the [`crate::ProcessManager`] itself.
///
/// Deserializable from TOML so an embedder can load it alongside the other
/// layer configs rather than hand-constructing `Default` overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessManagerConfig {
    /// How long to wait after a graceful signal before sending an
    /// unconditional kill.
    pub graceful_window: std::time::Duration,
    /// How long an exited process remains visible to `getProcess` /
    /// `getActiveProcesses` before it's pruned from the active map.
    pub cleanup_retention: std::time::Duration,
}

impl Default for ProcessManagerConfig {
    fn default() -> Self {
        Self {
            graceful_window: std::time::Duration::from_secs(2),
            cleanup_retention: std::time::Duration::from_secs(5),
        }
    }
}
