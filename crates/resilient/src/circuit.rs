// SPDX-License-Identifier: MIT

//! Per-task-type circuit breaker state machine.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

forge_core::simple_display! {
    CircuitState {
        Closed => "closed",
        Open => "open",
        HalfOpen => "half-open",
    }
}

/// Tunables for one breaker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, success_threshold: 2, timeout: Duration::from_secs(60) }
    }
}

/// Running totals for one breaker, independent of its current state.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CircuitMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
}

/// A named circuit breaker, one per task-type.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    pub name: String,
    pub state: CircuitState,
    pub config: CircuitBreakerConfig,
    pub metrics: CircuitMetrics,
    pub last_success_time: Option<Instant>,
    pub last_failure_time: Option<Instant>,
    pub opened_at: Option<Instant>,
    consecutive_failures: u32,
    consecutive_successes: u32,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            state: CircuitState::Closed,
            config,
            metrics: CircuitMetrics::default(),
            last_success_time: None,
            last_failure_time: None,
            opened_at: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
        }
    }

    /// Whether a new attempt may proceed right now. As a side effect,
    /// transitions an `open` breaker whose timeout has elapsed to `half-open`.
    pub fn can_execute(&mut self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self.opened_at.map(|t| now.duration_since(t)).unwrap_or(Duration::ZERO);
                if elapsed >= self.config.timeout {
                    self.state = CircuitState::HalfOpen;
                    self.consecutive_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self, now: Instant) {
        self.metrics.total_requests += 1;
        self.metrics.successful_requests += 1;
        self.last_success_time = Some(now);
        self.consecutive_failures = 0;

        if self.state == CircuitState::HalfOpen {
            self.consecutive_successes += 1;
            if self.consecutive_successes >= self.config.success_threshold {
                self.state = CircuitState::Closed;
                self.opened_at = None;
                self.consecutive_successes = 0;
            }
        }
    }

    /// Returns `true` exactly when this call transitions the breaker to `open`.
    pub fn record_failure(&mut self, now: Instant) -> bool {
        self.metrics.total_requests += 1;
        self.metrics.failed_requests += 1;
        self.last_failure_time = Some(now);
        self.consecutive_successes = 0;

        match self.state {
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.opened_at = Some(now);
                self.consecutive_failures = 0;
                true
            }
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.config.failure_threshold {
                    self.state = CircuitState::Open;
                    self.opened_at = Some(now);
                    self.consecutive_failures = 0;
                    true
                } else {
                    false
                }
            }
            CircuitState::Open => false,
        }
    }

    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.metrics = CircuitMetrics::default();
        self.last_success_time = None;
        self.last_failure_time = None;
        self.opened_at = None;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
    }
}

#[cfg(test)]
#[path = "circuit_tests.rs"]
mod tests;
