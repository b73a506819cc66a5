// SPDX-License-Identifier: MIT

//! Wraps the execution engine with retries and per-task-type circuit breakers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use forge_core::{Clock, SystemClock};
use forge_engine::{ExecutionEngine, ExecutionResult, ExecutionTask};

use crate::circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::error::ResilientResult;
use crate::retry::RetryPolicy;

/// One attempt at running a task, as recorded by the resilient executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionAttempt {
    pub attempt_number: u32,
    pub result: ExecutionResult,
    pub will_retry: bool,
    pub next_delay_ms: Option<u64>,
}

/// The outcome of [`ResilientExecutor::execute_task`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilientExecutionResult {
    pub attempts: Vec<ExecutionAttempt>,
    pub total_attempts: u32,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub circuit_breaker_triggered: bool,
}

impl ResilientExecutionResult {
    fn circuit_rejected() -> Self {
        Self { attempts: Vec::new(), total_attempts: 0, success: false, exit_code: None, circuit_breaker_triggered: true }
    }

    fn from_attempts(attempts: Vec<ExecutionAttempt>, circuit_breaker_triggered: bool) -> Self {
        let last = attempts.last();
        Self {
            total_attempts: attempts.len() as u32,
            success: last.is_some_and(|a| a.result.success),
            exit_code: last.and_then(|a| a.result.exit_code),
            attempts,
            circuit_breaker_triggered,
        }
    }
}

/// Aggregate retry metrics across every [`ResilientExecutor::execute_task`] call.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct RetryMetrics {
    pub total_retries: u64,
    pub successful_retries: u64,
    pub failed_retries: u64,
    pub average_attempts_to_success: f64,
}

#[derive(Default)]
struct RetryMetricsAccumulator {
    total_retries: u64,
    successful_retries: u64,
    failed_retries: u64,
    success_attempt_sum: u64,
    success_count: u64,
}

impl RetryMetricsAccumulator {
    fn record(&mut self, result: &ResilientExecutionResult) {
        let retried = result.total_attempts > 1;
        if retried {
            self.total_retries += result.total_attempts as u64 - 1;
            if result.success {
                self.successful_retries += 1;
            } else {
                self.failed_retries += 1;
            }
        }
        if result.success {
            self.success_attempt_sum += result.total_attempts as u64;
            self.success_count += 1;
        }
    }

    fn snapshot(&self) -> RetryMetrics {
        RetryMetrics {
            total_retries: self.total_retries,
            successful_retries: self.successful_retries,
            failed_retries: self.failed_retries,
            average_attempts_to_success: if self.success_count == 0 {
                0.0
            } else {
                self.success_attempt_sum as f64 / self.success_count as f64
            },
        }
    }
}

type AttemptHandler = Box<dyn Fn(&str, &ExecutionAttempt) + Send + Sync>;
type CircuitOpenHandler = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    on_retry_attempt: Vec<AttemptHandler>,
    on_circuit_open: Vec<CircuitOpenHandler>,
}

/// Wraps an [`ExecutionEngine`] with retry policies and per-task-type
/// circuit breakers.
///
/// Generic over [`Clock`] so circuit-breaker timing can be driven by a
/// `FakeClock` in tests instead of real sleeps; defaults to [`SystemClock`]
/// for production use.
#[derive(Clone)]
pub struct ResilientExecutor<C: Clock = SystemClock> {
    inner: Arc<Inner<C>>,
}

struct Inner<C: Clock> {
    engine: ExecutionEngine,
    default_policy: RetryPolicy,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    breaker_configs: Mutex<HashMap<String, CircuitBreakerConfig>>,
    metrics: Mutex<RetryMetricsAccumulator>,
    handlers: Mutex<Handlers>,
    clock: C,
}

impl ResilientExecutor<SystemClock> {
    pub fn new(engine: ExecutionEngine, default_policy: RetryPolicy) -> Self {
        Self::with_clock(engine, default_policy, SystemClock)
    }
}

impl<C: Clock> ResilientExecutor<C> {
    pub fn with_clock(engine: ExecutionEngine, default_policy: RetryPolicy, clock: C) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                default_policy,
                breakers: Mutex::new(HashMap::new()),
                breaker_configs: Mutex::new(HashMap::new()),
                metrics: Mutex::new(RetryMetricsAccumulator::default()),
                handlers: Mutex::new(Handlers::default()),
                clock,
            }),
        }
    }

    /// Override the breaker config used the first time a given task-type
    /// name is seen. No-op once that breaker already exists.
    pub fn configure_circuit_breaker(&self, task_type: impl Into<String>, config: CircuitBreakerConfig) {
        self.inner.breaker_configs.lock().insert(task_type.into(), config);
    }

    pub fn get_circuit_breaker(&self, name: &str) -> Option<CircuitBreaker> {
        self.inner.breakers.lock().get(name).cloned()
    }

    pub fn reset_circuit_breaker(&self, name: &str) {
        if let Some(breaker) = self.inner.breakers.lock().get_mut(name) {
            breaker.reset();
        }
    }

    pub fn get_retry_metrics(&self) -> RetryMetrics {
        self.inner.metrics.lock().snapshot()
    }

    pub fn on_retry_attempt(&self, handler: impl Fn(&str, &ExecutionAttempt) + Send + Sync + 'static) {
        self.inner.handlers.lock().on_retry_attempt.push(Box::new(handler));
    }

    pub fn on_circuit_open(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.handlers.lock().on_circuit_open.push(Box::new(handler));
    }

    pub async fn execute_task(&self, task: ExecutionTask, policy: Option<RetryPolicy>) -> ResilientResult<ResilientExecutionResult> {
        let policy = policy.unwrap_or_else(|| self.inner.default_policy.clone());
        let task_type = task.task_type.clone();

        if !self.admit(&task_type) {
            let result = ResilientExecutionResult::circuit_rejected();
            self.inner.metrics.lock().record(&result);
            return Ok(result);
        }

        let mut attempts = Vec::new();
        let mut circuit_breaker_triggered = false;
        let mut attempt_number = 1u32;

        loop {
            let attempt_task = task.retry_clone();
            let task_id = attempt_task.id;
            let exec_id = self
                .inner
                .engine
                .submit_task(attempt_task)
                .map_err(|err| crate::error::ResilientError::Engine(task_id, err))?;
            let result = self
                .inner
                .engine
                .wait_for_task(exec_id)
                .await
                .map_err(|err| crate::error::ResilientError::Engine(task_id, err))?;

            let opened = self.record_outcome(&task_type, result.success);

            let retryable = !result.success && attempt_number < policy.max_attempts && policy.is_retryable(&result);
            let next_delay_ms = retryable.then(|| policy.backoff.delay_for(attempt_number).as_millis() as u64);
            let attempt = ExecutionAttempt { attempt_number, result: result.clone(), will_retry: retryable, next_delay_ms };

            {
                let handlers = self.inner.handlers.lock();
                if attempt.will_retry {
                    for handler in &handlers.on_retry_attempt {
                        handler(&task_type, &attempt);
                    }
                }
                if opened {
                    for handler in &handlers.on_circuit_open {
                        handler(&task_type);
                    }
                }
            }

            let will_retry = attempt.will_retry;
            let delay = attempt.next_delay_ms;
            attempts.push(attempt);

            if result.success || !will_retry {
                break;
            }
            if !self.admit(&task_type) {
                circuit_breaker_triggered = true;
                break;
            }
            if let Some(ms) = delay {
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            }
            attempt_number += 1;
        }

        let resilient_result = ResilientExecutionResult::from_attempts(attempts, circuit_breaker_triggered);
        self.inner.metrics.lock().record(&resilient_result);
        Ok(resilient_result)
    }

    /// Run several tasks concurrently, each independently resilient.
    pub async fn execute_tasks(
        &self,
        tasks: impl IntoIterator<Item = (ExecutionTask, Option<RetryPolicy>)>,
    ) -> ResilientResult<Vec<ResilientExecutionResult>> {
        let mut set = tokio::task::JoinSet::new();
        for (task, policy) in tasks {
            let this = self.clone();
            set.spawn(async move { this.execute_task(task, policy).await });
        }
        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result?),
                Err(_) => continue,
            }
        }
        Ok(results)
    }

    fn admit(&self, task_type: &str) -> bool {
        let mut breakers = self.inner.breakers.lock();
        let breaker = breakers.entry(task_type.to_string()).or_insert_with(|| {
            let config = self.inner.breaker_configs.lock().get(task_type).copied().unwrap_or_default();
            CircuitBreaker::new(task_type, config)
        });
        breaker.can_execute(self.inner.clock.now())
    }

    /// Record the outcome of one inner attempt against the breaker; returns
    /// whether this call transitioned the breaker into `open`.
    fn record_outcome(&self, task_type: &str, success: bool) -> bool {
        let mut breakers = self.inner.breakers.lock();
        let Some(breaker) = breakers.get_mut(task_type) else { return false };
        let now = self.inner.clock.now();
        if success {
            breaker.record_success(now);
            false
        } else {
            let opened = breaker.record_failure(now);
            debug_assert!(!opened || breaker.state == CircuitState::Open);
            opened
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
