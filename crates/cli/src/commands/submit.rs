// SPDX-License-Identifier: MIT

//! `forge submit` — run a single task through the engine + resilient
//! executor and print its outcome.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use serde_json::json;

use forge_engine::{EngineConfig, ExecutionEngine, ExecutionTask, ProcessTaskRunner};
use forge_process::{ProcessManager, ProcessManagerConfig};
use forge_resilient::{Backoff, ResilientExecutor, RetryPolicy};

use crate::exit_error::ExitError;
use crate::process_template::shell_template;

#[derive(Debug, Args)]
pub struct SubmitArgs {
    /// Executable to spawn.
    pub executable: String,

    /// Arguments passed to the executable.
    #[arg(trailing_var_arg = true)]
    pub args: Vec<String>,

    /// Working directory; defaults to the current directory.
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Text written to the process's stdin once it starts.
    #[arg(long, default_value = "")]
    pub stdin: String,

    /// Maximum attempts before giving up (1 disables retries).
    #[arg(long, default_value_t = 1)]
    pub max_attempts: u32,

    /// Base backoff delay between retries, in milliseconds.
    #[arg(long, default_value_t = 500)]
    pub backoff_ms: u64,
}

pub async fn run(args: SubmitArgs) -> Result<(), ExitError> {
    let manager = ProcessManager::new(ProcessManagerConfig::default());
    let runner = Arc::new(ProcessTaskRunner::new(manager, shell_template()));
    let engine = ExecutionEngine::new(EngineConfig::default(), runner);
    let policy = RetryPolicy::new(args.max_attempts, Backoff::fixed(args.backoff_ms));
    let resilient = ResilientExecutor::new(engine, policy.clone());

    let work_dir = match args.work_dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let task = ExecutionTask::new("shell", args.stdin, work_dir).config(
        [
            ("executable".to_string(), json!(args.executable)),
            ("args".to_string(), json!(args.args)),
        ]
        .into_iter()
        .collect(),
    );

    let outcome = resilient.execute_task(task, Some(policy)).await?;
    let last = outcome.attempts.last();
    println!(
        "{}",
        json!({
            "success": outcome.success,
            "totalAttempts": outcome.total_attempts,
            "circuitBreakerTriggered": outcome.circuit_breaker_triggered,
            "exitCode": outcome.exit_code,
            "output": last.map(|a| a.result.output.as_str()),
            "error": last.and_then(|a| a.result.error.as_deref()),
        })
    );

    if outcome.success {
        Ok(())
    } else {
        Err(ExitError::new(1, "task did not succeed"))
    }
}
