//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: upstream assumed down, requests fail fast
//! - Half-Open: testing if upstream recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: after recovery timeout
//! Half-Open → Closed: trial request succeeds
//! Half-Open → Open: trial request fails
//! Half-Open → Half-Open: trial request abandoned (slot freed)
//! ```
//!
//! # Design Decisions
//! - One breaker per route (built by the route's lazy guard)
//! - Fail fast in Open state (no waiting for timeout)
//! - Single trial request in Half-Open (prevents hammering recovering upstream)
//! - Transport errors, timeouts and 5xx responses count as failures

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;

use crate::resilience::guard::{GuardError, GuardResult, UpstreamGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// How a call was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Whether a call may proceed now. Moves Open → Half-Open once the
    /// recovery timeout elapsed and admits a single trial request.
    pub fn try_acquire(&self) -> bool {
        self.admit().is_some()
    }

    fn admit(&self) -> Option<Admission> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Some(Admission::Normal),
            CircuitState::Open => {
                let recovered = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.recovery_timeout);
                if recovered {
                    tracing::info!("Circuit breaker half-open, sending trial request");
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    Some(Admission::Trial)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    None
                } else {
                    inner.trial_in_flight = true;
                    Some(Admission::Trial)
                }
            }
        }
    }

    /// Free the half-open slot without recording an outcome.
    fn release_trial(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen && inner.trial_in_flight {
            tracing::debug!("Circuit breaker trial request abandoned");
            inner.trial_in_flight = false;
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!("Circuit breaker closed");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let trip = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.consecutive_failures >= self.failure_threshold,
            CircuitState::Open => false,
        };
        if trip {
            tracing::warn!(
                failures = inner.consecutive_failures,
                "Circuit breaker opened"
            );
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
        inner.trial_in_flight = false;
    }
}

/// Held for the lifetime of an admitted trial request.
///
/// Dropping it before an outcome is recorded (cancelled request, outer
/// timeout, rejection by an inner guard) hands the slot to the next call.
struct TrialSlot {
    breaker: Arc<CircuitBreaker>,
    held: bool,
}

impl TrialSlot {
    fn settle(&mut self) {
        self.held = false;
    }
}

impl Drop for TrialSlot {
    fn drop(&mut self) {
        if self.held {
            self.breaker.release_trial();
        }
    }
}

/// Guard adapter; shares one [`CircuitBreaker`] across all calls of a route.
#[derive(Debug, Clone)]
pub struct CircuitBreakerGuard {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerGuard {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            breaker: Arc::new(CircuitBreaker::new(failure_threshold, recovery_timeout)),
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

impl UpstreamGuard for CircuitBreakerGuard {
    fn call(&self, next: BoxFuture<'static, GuardResult>) -> BoxFuture<'static, GuardResult> {
        let Some(admission) = self.breaker.admit() else {
            return Box::pin(async { Err(GuardError::CircuitOpen) });
        };
        let breaker = self.breaker.clone();
        // created before the future is first polled so an unpolled drop also frees it
        let mut slot = TrialSlot {
            breaker: breaker.clone(),
            held: admission == Admission::Trial,
        };
        Box::pin(async move {
            let result = next.await;
            match &result {
                Ok(response) if !response.status.is_server_error() => {
                    breaker.record_success();
                    slot.settle();
                }
                Err(GuardError::RateLimited) | Err(GuardError::CircuitOpen) => {}
                _ => {
                    breaker.record_failure();
                    slot.settle();
                }
            }
            drop(slot);
            result
        })
    }

    fn name(&self) -> &'static str {
        "circuit-breaker"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::ProxyResponse;
    use crate::upstream::UpstreamError;
    use axum::http::StatusCode;

    fn respond(status: StatusCode) -> BoxFuture<'static, GuardResult> {
        Box::pin(async move { Ok(ProxyResponse::new(status)) })
    }

    fn hang() -> BoxFuture<'static, GuardResult> {
        Box::pin(futures_util::future::pending())
    }

    fn fail() -> BoxFuture<'static, GuardResult> {
        Box::pin(async { Err(GuardError::Upstream(UpstreamError::Transport("refused".into()))) })
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let guard = CircuitBreakerGuard::new(2, Duration::from_secs(60));
        let _ = guard.call(fail()).await;
        assert_eq!(guard.breaker().state(), CircuitState::Closed);
        let _ = guard.call(respond(StatusCode::BAD_GATEWAY)).await;
        assert_eq!(guard.breaker().state(), CircuitState::Open);

        let result = guard.call(respond(StatusCode::OK)).await;
        assert!(matches!(result, Err(GuardError::CircuitOpen)));
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let guard = CircuitBreakerGuard::new(2, Duration::from_secs(60));
        let _ = guard.call(fail()).await;
        let _ = guard.call(respond(StatusCode::OK)).await;
        let _ = guard.call(fail()).await;
        assert_eq!(guard.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_trial() {
        let guard = CircuitBreakerGuard::new(1, Duration::from_millis(10));
        let _ = guard.call(fail()).await;
        assert_eq!(guard.breaker().state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(guard.breaker().try_acquire());
        assert_eq!(guard.breaker().state(), CircuitState::HalfOpen);
        assert!(!guard.breaker().try_acquire());

        guard.breaker().record_success();
        assert_eq!(guard.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_failed_trial_reopens() {
        let guard = CircuitBreakerGuard::new(1, Duration::from_millis(10));
        let _ = guard.call(fail()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = guard.call(fail()).await;
        assert_eq!(guard.breaker().state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_abandoned_trial_frees_slot() {
        let guard = CircuitBreakerGuard::new(1, Duration::from_millis(10));
        let _ = guard.call(fail()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        // the client went away while the trial request was in flight
        let abandoned = tokio::time::timeout(Duration::from_millis(20), guard.call(hang())).await;
        assert!(abandoned.is_err());
        assert_eq!(guard.breaker().state(), CircuitState::HalfOpen);

        for _ in 0..3 {
            let result = guard.call(respond(StatusCode::OK)).await;
            assert!(result.is_ok());
        }
        assert_eq!(guard.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_unpolled_trial_frees_slot() {
        let guard = CircuitBreakerGuard::new(1, Duration::from_millis(10));
        let _ = guard.call(fail()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard.call(respond(StatusCode::OK)));
        assert!(guard.breaker().try_acquire());
    }

    #[tokio::test]
    async fn test_rejected_trial_frees_slot() {
        let guard = CircuitBreakerGuard::new(1, Duration::from_millis(10));
        let _ = guard.call(fail()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let rejected = guard.call(Box::pin(async { Err(GuardError::RateLimited) })).await;
        assert!(matches!(rejected, Err(GuardError::RateLimited)));
        assert_eq!(guard.breaker().state(), CircuitState::HalfOpen);
        assert!(guard.call(respond(StatusCode::OK)).await.is_ok());
        assert_eq!(guard.breaker().state(), CircuitState::Closed);
    }
}
