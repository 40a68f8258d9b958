//! Timeout enforcement.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the upstream future is dropped on expiry
//! - Timeout errors are distinct from other errors and answered with 408

use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::resilience::guard::{GuardError, GuardResult, UpstreamGuard};

/// Bounds the total time of the upstream call.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    limit: Duration,
}

impl TimeoutGuard {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }
}

impl UpstreamGuard for TimeoutGuard {
    fn call(&self, next: BoxFuture<'static, GuardResult>) -> BoxFuture<'static, GuardResult> {
        let limit = self.limit;
        Box::pin(async move {
            match tokio::time::timeout(limit, next).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(timeout = ?limit, "Upstream call timed out");
                    Err(GuardError::Timeout(limit))
                }
            }
        })
    }

    fn name(&self) -> &'static str {
        "timeout"
    }
}
