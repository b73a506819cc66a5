// SPDX-License-Identifier: MIT

//! Custom error type that carries a process exit code.
//!
//! Commands return `ExitError` instead of calling `std::process::exit()`
//! directly, so `main()` is the only place that actually terminates the
//! process.

use std::fmt;

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}

impl From<forge_workflow::WorkflowError> for ExitError {
    fn from(err: forge_workflow::WorkflowError) -> Self {
        Self::new(1, err.to_string())
    }
}

impl From<forge_resilient::ResilientError> for ExitError {
    fn from(err: forge_resilient::ResilientError) -> Self {
        Self::new(1, err.to_string())
    }
}

impl From<forge_engine::EngineError> for ExitError {
    fn from(err: forge_engine::EngineError) -> Self {
        Self::new(1, err.to_string())
    }
}

impl From<std::io::Error> for ExitError {
    fn from(err: std::io::Error) -> Self {
        Self::new(1, err.to_string())
    }
}

impl From<toml::de::Error> for ExitError {
    fn from(err: toml::de::Error) -> Self {
        Self::new(2, format!("invalid workflow definition: {err}"))
    }
}
