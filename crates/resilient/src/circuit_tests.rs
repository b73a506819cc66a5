// SPDX-License-Identifier: MIT

use super::*;
use std::time::{Duration, Instant};

fn config() -> CircuitBreakerConfig {
    CircuitBreakerConfig { failure_threshold: 3, success_threshold: 2, timeout: Duration::from_millis(100) }
}

#[test]
fn starts_closed_and_admits() {
    let mut breaker = CircuitBreaker::new("custom", config());
    assert_eq!(breaker.state, CircuitState::Closed);
    assert!(breaker.can_execute(Instant::now()));
}

#[test]
fn opens_after_consecutive_failures_reach_threshold() {
    let mut breaker = CircuitBreaker::new("custom", config());
    let now = Instant::now();
    assert!(!breaker.record_failure(now));
    assert!(!breaker.record_failure(now));
    assert!(breaker.record_failure(now));
    assert_eq!(breaker.state, CircuitState::Open);
}

#[test]
fn success_resets_consecutive_failure_counter() {
    let mut breaker = CircuitBreaker::new("custom", config());
    let now = Instant::now();
    breaker.record_failure(now);
    breaker.record_failure(now);
    breaker.record_success(now);
    breaker.record_failure(now);
    breaker.record_failure(now);
    assert_eq!(breaker.state, CircuitState::Closed);
}

#[test]
fn open_breaker_rejects_until_timeout_elapses() {
    let mut breaker = CircuitBreaker::new("custom", config());
    let t0 = Instant::now();
    breaker.record_failure(t0);
    breaker.record_failure(t0);
    breaker.record_failure(t0);
    assert!(!breaker.can_execute(t0));

    let past_timeout = t0 + Duration::from_millis(150);
    assert!(breaker.can_execute(past_timeout));
    assert_eq!(breaker.state, CircuitState::HalfOpen);
}

#[test]
fn half_open_closes_after_success_threshold() {
    let mut breaker = CircuitBreaker::new("custom", config());
    let t0 = Instant::now();
    breaker.record_failure(t0);
    breaker.record_failure(t0);
    breaker.record_failure(t0);
    let past_timeout = t0 + Duration::from_millis(150);
    breaker.can_execute(past_timeout);
    assert_eq!(breaker.state, CircuitState::HalfOpen);

    breaker.record_success(past_timeout);
    assert_eq!(breaker.state, CircuitState::HalfOpen);
    breaker.record_success(past_timeout);
    assert_eq!(breaker.state, CircuitState::Closed);
}

#[test]
fn half_open_reopens_on_any_failure() {
    let mut breaker = CircuitBreaker::new("custom", config());
    let t0 = Instant::now();
    breaker.record_failure(t0);
    breaker.record_failure(t0);
    breaker.record_failure(t0);
    let past_timeout = t0 + Duration::from_millis(150);
    breaker.can_execute(past_timeout);
    breaker.record_failure(past_timeout);
    assert_eq!(breaker.state, CircuitState::Open);
    assert_eq!(breaker.opened_at, Some(past_timeout));
}

#[test]
fn reset_clears_state_and_metrics() {
    let mut breaker = CircuitBreaker::new("custom", config());
    let t0 = Instant::now();
    breaker.record_failure(t0);
    breaker.record_failure(t0);
    breaker.record_failure(t0);
    breaker.reset();
    assert_eq!(breaker.state, CircuitState::Closed);
    assert_eq!(breaker.metrics.total_requests, 0);
    assert!(breaker.can_execute(t0));
}

#[test]
fn metrics_update_on_every_attempt() {
    let mut breaker = CircuitBreaker::new("custom", config());
    let t0 = Instant::now();
    breaker.record_success(t0);
    breaker.record_failure(t0);
    assert_eq!(breaker.metrics.total_requests, 2);
    assert_eq!(breaker.metrics.successful_requests, 1);
    assert_eq!(breaker.metrics.failed_requests, 1);
}
