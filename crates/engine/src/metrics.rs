// SPDX-License-Identifier: MIT

/// Point-in-time snapshot returned by [`crate::ExecutionEngine::metrics`].
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct EngineMetrics {
    pub max_concurrent: usize,
    pub currently_running: usize,
    pub available_slots: usize,
    pub queued_tasks: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub average_duration_ms: f64,
    pub success_rate: f64,
    pub throughput: f64,
}

#[derive(Debug, Default)]
pub(crate) struct MetricsAccumulator {
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    duration_sum_ms: u64,
    duration_samples: u64,
}

impl MetricsAccumulator {
    pub(crate) fn record(&mut self, success: bool, duration_ms: u64) {
        if success {
            self.completed_tasks += 1;
        } else {
            self.failed_tasks += 1;
        }
        self.duration_sum_ms += duration_ms;
        self.duration_samples += 1;
    }

    pub(crate) fn average_duration_ms(&self) -> f64 {
        if self.duration_samples == 0 {
            0.0
        } else {
            self.duration_sum_ms as f64 / self.duration_samples as f64
        }
    }

    pub(crate) fn success_rate(&self) -> f64 {
        let total = self.completed_tasks + self.failed_tasks;
        if total == 0 {
            0.0
        } else {
            self.completed_tasks as f64 / total as f64
        }
    }
}
