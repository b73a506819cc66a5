// SPDX-License-Identifier: MIT

//! Retry policy, backoff computation, and attempt classification.

use std::time::Duration;

use forge_engine::ExecutionResult;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Backoff curve between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffKind {
    Fixed,
    Linear,
    Exponential,
}

/// Backoff configuration shared by a [`RetryPolicy`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Backoff {
    pub kind: BackoffKind,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Backoff {
    pub fn fixed(base_delay_ms: u64) -> Self {
        Self { kind: BackoffKind::Fixed, base_delay_ms, max_delay_ms: base_delay_ms, jitter: false }
    }

    /// Delay before the attempt *after* `attempt_number` (1-based).
    pub fn delay_for(&self, attempt_number: u32) -> Duration {
        let n = attempt_number as f64;
        let uncapped = match self.kind {
            BackoffKind::Fixed => self.base_delay_ms as f64,
            BackoffKind::Linear => self.base_delay_ms as f64 * n,
            BackoffKind::Exponential => self.base_delay_ms as f64 * 2f64.powi(attempt_number as i32 - 1),
        };
        let capped = uncapped.min(self.max_delay_ms as f64);
        let final_ms = if self.jitter {
            capped * rand::thread_rng().gen_range(0.5..1.0)
        } else {
            capped
        };
        Duration::from_millis(final_ms.max(0.0) as u64)
    }
}

/// Governs how many times, and how, a task is retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub retryable_error_substrings: Vec<String>,
    pub retryable_exit_codes: Vec<i32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::fixed(0),
            retryable_error_substrings: Vec::new(),
            retryable_exit_codes: Vec::new(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self { max_attempts: max_attempts.max(1), ..Self::default() }.with_backoff(backoff)
    }

    fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn retryable_exit_codes(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.retryable_exit_codes = codes.into_iter().collect();
        self
    }

    pub fn retryable_error_substrings(mut self, substrings: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.retryable_error_substrings = substrings.into_iter().map(Into::into).collect();
        self
    }

    /// An attempt is retryable when it failed AND its exit code or error
    /// text matches this policy's retryable criteria.
    pub fn is_retryable(&self, result: &ExecutionResult) -> bool {
        if result.success {
            return false;
        }
        let exit_matches = result.exit_code.is_some_and(|code| self.retryable_exit_codes.contains(&code));
        let error_matches = result.error.as_deref().is_some_and(|text| {
            self.retryable_error_substrings.iter().any(|needle| text.contains(needle.as_str()))
        });
        exit_matches || error_matches
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
