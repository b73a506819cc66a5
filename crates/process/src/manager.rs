// SPDX-License-Identifier: MIT

//! The process manager: spawns, tracks, and terminates child processes.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin};
use tokio::task::JoinHandle;

use crate::config::{IoMode, ProcessConfig, ProcessManagerConfig};
use crate::error::{ProcessError, ProcessResult};
use crate::io::{classify_hybrid_line, Channel, HybridLine, LineSplitter, OutputLine};
use crate::metrics::{ManagerMetricsInner, ProcessMetrics};
use crate::process::{ManagedProcess, ProcessId, ProcessStatus};

type LineHandler = Box<dyn Fn(OutputLine) + Send + Sync>;
type MessageHandler = Box<dyn Fn(serde_json::Value) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    lines: Vec<LineHandler>,
    messages: Vec<MessageHandler>,
}

struct ProcessEntry {
    process: RwLock<ManagedProcess>,
    stdin: Mutex<Option<ChildStdin>>,
    handlers: Mutex<Handlers>,
    io_mode: IoMode,
    pump_tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Spawns, tracks, and terminates child processes.
///
/// Cheaply cloneable; every clone shares the same underlying process table.
#[derive(Clone)]
pub struct ProcessManager {
    inner: Arc<ProcessManagerInner>,
}

struct ProcessManagerInner {
    config: ProcessManagerConfig,
    active: Mutex<HashMap<ProcessId, Arc<ProcessEntry>>>,
    metrics: Mutex<ManagerMetricsInner>,
}

impl ProcessManager {
    pub fn new(config: ProcessManagerConfig) -> Self {
        Self {
            inner: Arc::new(ProcessManagerInner {
                config,
                active: Mutex::new(HashMap::new()),
                metrics: Mutex::new(ManagerMetricsInner::default()),
            }),
        }
    }

    /// Spawn a new child process and begin tracking it.
    pub async fn acquire_process(&self, config: &ProcessConfig) -> ProcessResult<ProcessId> {
        let mut command = tokio::process::Command::new(&config.executable);
        command
            .args(&config.args)
            .current_dir(&config.cwd)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child: Child = command.spawn().map_err(ProcessError::Spawn)?;
        let pid = child.id().unwrap_or_default();
        let id = ProcessId::new();

        let stdin = child.stdin.take();
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(ProcessError::Spawn(std::io::Error::other(
                "child process missing piped stdout/stderr",
            )));
        };

        let entry = Arc::new(ProcessEntry {
            process: RwLock::new(ManagedProcess::new(id, pid, Instant::now())),
            stdin: Mutex::new(stdin),
            handlers: Mutex::new(Handlers::default()),
            io_mode: config.io_mode,
            pump_tasks: Mutex::new(Vec::new()),
        });

        self.inner.active.lock().insert(id, entry.clone());
        self.inner.metrics.lock().record_spawn();
        tracing::info!(process_id = %id, pid, "spawned process");

        let stdout_task = tokio::spawn(pump_stream(entry.clone(), stdout, Channel::Stdout));
        let stderr_task = tokio::spawn(pump_stream(entry.clone(), stderr, Channel::Stderr));
        entry.pump_tasks.lock().push(stdout_task);
        entry.pump_tasks.lock().push(stderr_task);

        let exit_task = tokio::spawn(watch_exit(self.clone(), id, entry, child));
        // Detached: the manager doesn't need to join this to observe exit,
        // state is recorded into the entry as it happens.
        drop(exit_task);

        Ok(id)
    }

    /// Return a point-in-time snapshot of a tracked process.
    pub fn get_process(&self, id: ProcessId) -> ProcessResult<ManagedProcess> {
        let active = self.inner.active.lock();
        let entry = active.get(&id).ok_or(ProcessError::NotFound(id))?;
        Ok(entry.process.read().clone())
    }

    /// Return snapshots of every currently tracked process.
    pub fn get_active_processes(&self) -> Vec<ManagedProcess> {
        self.inner
            .active
            .lock()
            .values()
            .map(|entry| entry.process.read().clone())
            .collect()
    }

    /// Write a line of input to a process's stdin, appending a newline.
    pub async fn send_input(&self, id: ProcessId, input: &str) -> ProcessResult<()> {
        let entry = self.entry(id)?;
        let mut guard = entry.stdin.lock();
        let stdin = guard.as_mut().ok_or(ProcessError::StdinClosed(id))?;
        let mut line = input.as_bytes().to_vec();
        line.push(b'\n');
        // parking_lot::Mutex isn't held across .await; reborrow as a raw
        // pointer-free write by releasing the lock before awaiting would
        // require restructuring, so instead we hold it only across the
        // synchronous portion and await on a cloned handle is not possible
        // for ChildStdin. We await while holding the lock deliberately:
        // stdin writes for a single process are expected to be sequential.
        stdin
            .write_all(&line)
            .await
            .map_err(|e| ProcessError::WriteFailed(id, e))
    }

    /// Register a handler invoked for every line of stdout/stderr.
    pub fn on_output(&self, id: ProcessId, handler: impl Fn(OutputLine) + Send + Sync + 'static) -> ProcessResult<()> {
        let entry = self.entry(id)?;
        entry.handlers.lock().lines.push(Box::new(handler));
        Ok(())
    }

    /// Register a handler invoked for each successfully parsed hybrid-mode
    /// JSON message. No-op in [`IoMode::LineBatched`].
    pub fn on_message(&self, id: ProcessId, handler: impl Fn(serde_json::Value) + Send + Sync + 'static) -> ProcessResult<()> {
        let entry = self.entry(id)?;
        entry.handlers.lock().messages.push(Box::new(handler));
        Ok(())
    }

    /// Record the outcome of a unit of work dispatched to this process,
    /// independent of whether the process itself has exited.
    pub fn record_completion(&self, id: ProcessId, success: bool, duration_ms: u64) -> ProcessResult<()> {
        let entry = self.entry(id)?;
        entry.process.write().record_completion(success, duration_ms);
        Ok(())
    }

    /// Terminate a process: SIGTERM first, then SIGKILL if it hasn't exited
    /// within the manager's graceful window. Idempotent.
    pub async fn terminate_process(&self, id: ProcessId) -> ProcessResult<()> {
        let entry = self.entry(id)?;
        {
            let mut process = entry.process.write();
            if process.exit_code.is_some() {
                return Ok(());
            }
            process.status = ProcessStatus::Terminating;
        }

        let pid = entry.process.read().pid;
        let nix_pid = nix::unistd::Pid::from_raw(pid as i32);
        if let Err(errno) = nix::sys::signal::kill(nix_pid, nix::sys::signal::Signal::SIGTERM) {
            if errno != nix::errno::Errno::ESRCH {
                return Err(ProcessError::SignalFailed(id, errno));
            }
        }
        entry.process.write().terminating_signal = Some("SIGTERM");

        let graceful = self.inner.config.graceful_window;
        let deadline = Instant::now() + graceful;
        while Instant::now() < deadline {
            if entry.process.read().status.is_terminal() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        if let Err(errno) = nix::sys::signal::kill(nix_pid, nix::sys::signal::Signal::SIGKILL) {
            if errno != nix::errno::Errno::ESRCH {
                return Err(ProcessError::SignalFailed(id, errno));
            }
        }
        entry.process.write().terminating_signal = Some("SIGKILL");
        Ok(())
    }

    /// Alias for [`terminate_process`](Self::terminate_process).
    pub async fn release_process(&self, id: ProcessId) -> ProcessResult<()> {
        self.terminate_process(id).await
    }

    /// Terminate every currently tracked process concurrently.
    pub async fn shutdown(&self) {
        let ids: Vec<ProcessId> = self.inner.active.lock().keys().copied().collect();
        let mut set = tokio::task::JoinSet::new();
        for id in ids {
            let this = self.clone();
            set.spawn(async move {
                if let Err(err) = this.terminate_process(id).await {
                    tracing::warn!(process_id = %id, %err, "error terminating process during shutdown");
                }
            });
        }
        while set.join_next().await.is_some() {}
    }

    pub fn metrics(&self) -> ProcessMetrics {
        let active_count = self.inner.active.lock().len() as u64;
        self.inner.metrics.lock().snapshot(active_count)
    }

    fn entry(&self, id: ProcessId) -> ProcessResult<Arc<ProcessEntry>> {
        self.inner
            .active
            .lock()
            .get(&id)
            .cloned()
            .ok_or(ProcessError::NotFound(id))
    }

    fn cleanup_after(&self, id: ProcessId) {
        let retention = self.inner.config.cleanup_retention;
        let manager = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            manager.inner.active.lock().remove(&id);
        });
    }
}

async fn pump_stream(
    entry: Arc<ProcessEntry>,
    mut reader: impl tokio::io::AsyncRead + Unpin,
    channel: Channel,
) {
    let mut splitter = LineSplitter::new();
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in splitter.push(&buf[..n]) {
                    dispatch_line(&entry, channel, line);
                }
                entry.process.write().last_activity = Instant::now();
            }
            Err(err) => {
                tracing::warn!(%err, "error reading process output");
                break;
            }
        }
    }
    if let Some(trailing) = splitter.flush() {
        dispatch_line(&entry, channel, trailing);
    }
}

fn dispatch_line(entry: &Arc<ProcessEntry>, channel: Channel, bytes: Vec<u8>) {
    let handlers = entry.handlers.lock();
    if entry.io_mode == IoMode::Hybrid {
        if let HybridLine::Message(value) = classify_hybrid_line(&bytes) {
            for handler in &handlers.messages {
                handler(value.clone());
            }
        }
    }
    for handler in &handlers.lines {
        handler(OutputLine { channel, bytes: bytes.clone() });
    }
}

async fn watch_exit(manager: ProcessManager, id: ProcessId, entry: Arc<ProcessEntry>, mut child: Child) {
    let status = child.wait().await;
    let lifetime_ms = {
        let process = entry.process.read();
        process.spawned_at.elapsed().as_millis() as u64
    };
    let crashed = !matches!(status, Ok(ref s) if s.success());
    {
        let mut process = entry.process.write();
        process.exit_code = status.ok().and_then(|s| s.code());
        if !process.status.is_terminal() {
            process.status = if crashed {
                ProcessStatus::Crashed
            } else {
                ProcessStatus::Idle
            };
        }
    }
    manager.inner.metrics.lock().record_exit(crashed, lifetime_ms);
    tracing::info!(process_id = %id, crashed, "process exited");
    for task in entry.pump_tasks.lock().drain(..) {
        let _ = task.await;
    }
    manager.cleanup_after(id);
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
