//! Token-bucket rate limiting per route.

use std::sync::Mutex;
use std::time::Instant;

use futures_util::future::BoxFuture;

use crate::resilience::guard::{GuardError, GuardResult, UpstreamGuard};

/// A simple token bucket rate limiter.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Rejects calls once the route exceeds `requests_per_second` (with `burst` headroom).
#[derive(Debug)]
pub struct RateLimitGuard {
    bucket: Mutex<TokenBucket>,
    refill_rate: f64,
    burst: f64,
}

impl RateLimitGuard {
    pub fn new(requests_per_second: u32, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            bucket: Mutex::new(TokenBucket::new(burst)),
            refill_rate: f64::from(requests_per_second),
            burst,
        }
    }

    fn try_acquire(&self) -> bool {
        match self.bucket.lock() {
            Ok(mut bucket) => bucket.try_acquire(self.burst, self.refill_rate),
            Err(poisoned) => poisoned
                .into_inner()
                .try_acquire(self.burst, self.refill_rate),
        }
    }
}

impl UpstreamGuard for RateLimitGuard {
    fn call(&self, next: BoxFuture<'static, GuardResult>) -> BoxFuture<'static, GuardResult> {
        if self.try_acquire() {
            next
        } else {
            tracing::warn!(rps = self.refill_rate, burst = self.burst, "Rate limit exceeded");
            Box::pin(async { Err(GuardError::RateLimited) })
        }
    }

    fn name(&self) -> &'static str {
        "rate-limit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::ProxyResponse;
    use axum::http::StatusCode;

    fn ok() -> BoxFuture<'static, GuardResult> {
        Box::pin(async { Ok(ProxyResponse::new(StatusCode::OK)) })
    }

    #[tokio::test]
    async fn test_burst_then_reject() {
        let guard = RateLimitGuard::new(0, 2);
        assert!(guard.call(ok()).await.is_ok());
        assert!(guard.call(ok()).await.is_ok());
        assert!(matches!(guard.call(ok()).await, Err(GuardError::RateLimited)));
    }

    #[test]
    fn test_bucket_refills() {
        let mut bucket = TokenBucket::new(1.0);
        assert!(bucket.try_acquire(1.0, 1000.0));
        bucket.last_update -= std::time::Duration::from_millis(10);
        assert!(bucket.try_acquire(1.0, 1000.0));
    }
}
