// SPDX-License-Identifier: MIT

//! The managed-process record and its status machine.

use serde::{Deserialize, Serialize};
use std::time::Instant;

forge_core::define_id! {
    /// Identifier for a process tracked by the [`crate::ProcessManager`].
    pub struct ProcessId("prc-");
}

/// Lifecycle state of a [`ManagedProcess`].
///
/// Once a process reaches `Crashed` or begins `Terminating`, it never
/// returns to a running state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessStatus {
    Starting,
    Busy,
    Idle,
    Crashed,
    Terminating,
}

forge_core::simple_display! {
    ProcessStatus {
        Starting => "starting",
        Busy => "busy",
        Idle => "idle",
        Crashed => "crashed",
        Terminating => "terminating",
    }
}

impl ProcessStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessStatus::Crashed)
    }
}

/// Running totals tracked for a single process across its lifetime.
///
/// Incremented by callers (typically a task runner) via
/// [`crate::ProcessManager::record_completion`] whenever a unit of work
/// dispatched on this process finishes; independent of process exit.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProcessRunMetrics {
    pub total_duration_ms: u64,
    pub tasks_completed: u64,
    pub success_rate: f64,
}

impl ProcessRunMetrics {
    fn record(&mut self, success: bool, duration_ms: u64) {
        let prior_successes = self.success_rate * self.tasks_completed as f64;
        self.tasks_completed += 1;
        self.total_duration_ms += duration_ms;
        let successes = prior_successes + if success { 1.0 } else { 0.0 };
        self.success_rate = successes / self.tasks_completed as f64;
    }
}

/// A snapshot of a tracked child process.
///
/// Returned to callers as an owned value (a consistent point-in-time copy
/// taken under the manager's lock), so mutating it has no effect on the
/// manager's internal state.
#[derive(Debug, Clone)]
pub struct ManagedProcess {
    pub id: ProcessId,
    pub pid: u32,
    pub spawned_at: Instant,
    pub last_activity: Instant,
    pub status: ProcessStatus,
    pub exit_code: Option<i32>,
    pub terminating_signal: Option<&'static str>,
    pub metrics: ProcessRunMetrics,
}

impl ManagedProcess {
    pub(crate) fn new(id: ProcessId, pid: u32, now: Instant) -> Self {
        Self {
            id,
            pid,
            spawned_at: now,
            last_activity: now,
            status: ProcessStatus::Busy,
            exit_code: None,
            terminating_signal: None,
            metrics: ProcessRunMetrics::default(),
        }
    }

    pub(crate) fn record_completion(&mut self, success: bool, duration_ms: u64) {
        self.metrics.record(success, duration_ms);
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.status, ProcessStatus::Crashed)
    }
}
