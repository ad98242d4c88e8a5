//! Per-upstream circuit breaker: a three-state machine gating dispatch.
//!
//! - **closed**: dispatch allowed; `failure_threshold` consecutive failures opens it.
//! - **open**: dispatch refused immediately; after `open_timeout_seconds` it moves to half-open.
//! - **half_open**: one in-flight probe at a time; `success_threshold` consecutive
//!   successes closes it, any failure reopens it.
//!
//! "Failure" is a dispatch that ended in connection error, timeout, or a 5xx
//! response; "success" is anything else. The breaker is driven exclusively by
//! reported dispatch outcomes -- it never inspects health-probe results.

use ahash::HashMap as AHashMap;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u64,
    pub success_threshold: u64,
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
        }
    }
}

struct Breaker {
    state: AtomicU8,
    consecutive_failures: AtomicU64,
    consecutive_successes: AtomicU64,
    opened_at: RwLock<Option<Instant>>,
    probe_in_flight: AtomicBool,
}

impl Breaker {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU64::new(0),
            consecutive_successes: AtomicU64::new(0),
            opened_at: RwLock::new(None),
            probe_in_flight: AtomicBool::new(false),
        }
    }
}

/// A registry of one breaker per `target_service`, created lazily on first use.
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: RwLock<AHashMap<String, Arc<Breaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(AHashMap::default()),
        }
    }

    async fn breaker_for(&self, service: &str) -> Arc<Breaker> {
        if let Some(b) = self.breakers.read().await.get(service) {
            return b.clone();
        }
        let mut breakers = self.breakers.write().await;
        breakers
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(Breaker::new()))
            .clone()
    }

    /// `true` if dispatch to `service` may proceed. In the half-open state
    /// only one probe is allowed in flight; callers that are denied a probe
    /// are treated the same as an open breaker.
    pub async fn allow(&self, service: &str) -> bool {
        let breaker = self.breaker_for(service).await;
        match CircuitState::from(breaker.state.load(Ordering::Acquire)) {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened_at = *breaker.opened_at.read().await;
                match opened_at {
                    Some(t) if t.elapsed() >= self.config.open_timeout => {
                        self.transition(&breaker, service, CircuitState::HalfOpen).await;
                        breaker
                            .probe_in_flight
                            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok()
                    }
                    _ => false,
                }
            }
            CircuitState::HalfOpen => breaker
                .probe_in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok(),
        }
    }

    pub async fn record_success(&self, service: &str) {
        let breaker = self.breaker_for(service).await;
        match CircuitState::from(breaker.state.load(Ordering::Acquire)) {
            CircuitState::Closed => {
                breaker.consecutive_failures.store(0, Ordering::Release);
            }
            CircuitState::HalfOpen => {
                breaker.probe_in_flight.store(false, Ordering::Release);
                let successes = breaker.consecutive_successes.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.success_threshold {
                    self.transition(&breaker, service, CircuitState::Closed).await;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub async fn record_failure(&self, service: &str) {
        let breaker = self.breaker_for(service).await;
        match CircuitState::from(breaker.state.load(Ordering::Acquire)) {
            CircuitState::Closed => {
                let failures = breaker.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold {
                    self.transition(&breaker, service, CircuitState::Open).await;
                }
            }
            CircuitState::HalfOpen => {
                breaker.probe_in_flight.store(false, Ordering::Release);
                self.transition(&breaker, service, CircuitState::Open).await;
            }
            CircuitState::Open => {
                *breaker.opened_at.write().await = Some(Instant::now());
            }
        }
    }

    pub async fn state(&self, service: &str) -> CircuitState {
        CircuitState::from(self.breaker_for(service).await.state.load(Ordering::Acquire))
    }

    /// Administrative reset: forces closed and zeroes counters.
    pub async fn reset(&self, service: &str) {
        let breaker = self.breaker_for(service).await;
        breaker.state.store(CircuitState::Closed as u8, Ordering::Release);
        breaker.consecutive_failures.store(0, Ordering::Release);
        breaker.consecutive_successes.store(0, Ordering::Release);
        breaker.probe_in_flight.store(false, Ordering::Release);
        *breaker.opened_at.write().await = None;
        info!("circuit breaker for {} reset by admin", service);
    }

    async fn transition(&self, breaker: &Breaker, service: &str, to: CircuitState) {
        breaker.state.store(to as u8, Ordering::Release);
        match to {
            CircuitState::Open => {
                *breaker.opened_at.write().await = Some(Instant::now());
                breaker.consecutive_successes.store(0, Ordering::Release);
                warn!("circuit breaker for {} opened", service);
            }
            CircuitState::HalfOpen => {
                breaker.consecutive_successes.store(0, Ordering::Release);
                info!("circuit breaker for {} half-open", service);
            }
            CircuitState::Closed => {
                breaker.consecutive_failures.store(0, Ordering::Release);
                breaker.consecutive_successes.store(0, Ordering::Release);
                info!("circuit breaker for {} closed", service);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            open_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let reg = CircuitBreakerRegistry::new(config());
        for _ in 0..3 {
            reg.record_failure("svc").await;
        }
        assert_eq!(reg.state("svc").await, CircuitState::Open);
        assert!(!reg.allow("svc").await);
    }

    #[tokio::test]
    async fn half_open_allows_single_probe_then_closes_on_success() {
        let reg = CircuitBreakerRegistry::new(config());
        for _ in 0..3 {
            reg.record_failure("svc").await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(reg.allow("svc").await);
        assert!(!reg.allow("svc").await, "second probe must be refused while one is in flight");

        reg.record_success("svc").await;
        assert_eq!(reg.state("svc").await, CircuitState::HalfOpen);
        reg.record_success("svc").await;
        assert_eq!(reg.state("svc").await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let reg = CircuitBreakerRegistry::new(config());
        for _ in 0..3 {
            reg.record_failure("svc").await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(reg.allow("svc").await);
        reg.record_failure("svc").await;
        assert_eq!(reg.state("svc").await, CircuitState::Open);
    }

    #[tokio::test]
    async fn admin_reset_forces_closed() {
        let reg = CircuitBreakerRegistry::new(config());
        for _ in 0..3 {
            reg.record_failure("svc").await;
        }
        reg.reset("svc").await;
        assert_eq!(reg.state("svc").await, CircuitState::Closed);
        assert!(reg.allow("svc").await);
    }
}
