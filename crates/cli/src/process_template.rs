// SPDX-License-Identifier: MIT

//! Maps an `ExecutionTask`'s `task_config` into the `ProcessConfig` used to
//! spawn it. Tasks submitted through this CLI carry their command line in
//! `task_config["executable"]` / `task_config["args"]`.

use forge_engine::{ExecutionTask, ProcessTemplate};
use forge_process::ProcessConfig;

pub fn shell_template() -> ProcessTemplate {
    std::sync::Arc::new(|task: &ExecutionTask| {
        let executable =
            task.config.get("executable").and_then(|v| v.as_str()).unwrap_or("/bin/sh").to_string();
        let args: Vec<String> = task
            .config
            .get("args")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        ProcessConfig::new(executable, task.work_dir.clone()).args(args)
    })
}
