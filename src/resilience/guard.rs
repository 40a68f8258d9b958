//! Fault-tolerance guards around the upstream call.
//!
//! A guard is attached to a route and built from the first request that
//! reaches it. It must outlive every request (its counters are shared), so
//! [`LazyGuard`] keeps it in a `OnceLock`: concurrent first callers block on
//! the same initialisation and all see one instance.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::http::StatusCode;
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::transform::{ProxyContext, ProxyResponse, TerminalResponse};
use crate::upstream::UpstreamError;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Upstream call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl GuardError {
    /// Status for guard rejections; `None` for plain upstream failures.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            GuardError::Timeout(_) => Some(StatusCode::REQUEST_TIMEOUT),
            GuardError::RateLimited => Some(StatusCode::TOO_MANY_REQUESTS),
            GuardError::CircuitOpen => Some(StatusCode::SERVICE_UNAVAILABLE),
            GuardError::Upstream(_) => None,
        }
    }
}

/// Result of an upstream call as seen by guards.
pub type GuardResult = Result<ProxyResponse, GuardError>;

/// Wraps the upstream call; `next` performs it (or the next inner guard).
pub trait UpstreamGuard: Send + Sync {
    fn call(&self, next: BoxFuture<'static, GuardResult>) -> BoxFuture<'static, GuardResult>;

    fn name(&self) -> &'static str;
}

/// Guards applied outermost first.
pub struct GuardChain {
    guards: Vec<Arc<dyn UpstreamGuard>>,
}

impl GuardChain {
    pub fn new(guards: Vec<Arc<dyn UpstreamGuard>>) -> Self {
        Self { guards }
    }
}

impl UpstreamGuard for GuardChain {
    fn call(&self, next: BoxFuture<'static, GuardResult>) -> BoxFuture<'static, GuardResult> {
        self.guards
            .iter()
            .rev()
            .fold(next, |inner, guard| guard.call(inner))
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}

type GuardBuilder = Arc<dyn Fn(&ProxyContext) -> Arc<dyn UpstreamGuard> + Send + Sync>;

/// A guard built once, from the context of the first request that needs it.
pub struct LazyGuard {
    builder: GuardBuilder,
    guard: OnceLock<Arc<dyn UpstreamGuard>>,
}

impl LazyGuard {
    pub fn new<F>(builder: F) -> Self
    where
        F: Fn(&ProxyContext) -> Arc<dyn UpstreamGuard> + Send + Sync + 'static,
    {
        Self {
            builder: Arc::new(builder),
            guard: OnceLock::new(),
        }
    }

    pub fn get_or_build(&self, ctx: &ProxyContext) -> Arc<dyn UpstreamGuard> {
        self.guard
            .get_or_init(|| {
                let guard = (self.builder)(ctx);
                tracing::debug!(origin = %ctx.origin(), guard = guard.name(), "Route guard built");
                guard
            })
            .clone()
    }

    pub fn is_built(&self) -> bool {
        self.guard.get().is_some()
    }
}

impl fmt::Debug for LazyGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyGuard")
            .field("built", &self.is_built())
            .finish()
    }
}

/// Turn a guard rejection into the response sent to the client.
pub fn rejection_response(err: &GuardError) -> Option<ProxyResponse> {
    err.status_code()
        .map(|status| TerminalResponse::new(status).message(err.to_string()).build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::context;
    use axum::http::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Tagging(&'static str, Arc<std::sync::Mutex<Vec<&'static str>>>);

    impl UpstreamGuard for Tagging {
        fn call(&self, next: BoxFuture<'static, GuardResult>) -> BoxFuture<'static, GuardResult> {
            let tag = self.0;
            let log = self.1.clone();
            Box::pin(async move {
                log.lock().unwrap().push(tag);
                next.await
            })
        }

        fn name(&self) -> &'static str {
            self.0
        }
    }

    #[tokio::test]
    async fn test_lazy_guard_builds_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let lazy = Arc::new(LazyGuard::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(GuardChain::new(Vec::new())) as Arc<dyn UpstreamGuard>
        }));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let lazy = lazy.clone();
            handles.push(tokio::spawn(async move {
                let ctx = context(Method::GET, "/");
                lazy.get_or_build(&ctx)
            }));
        }
        let mut guards = Vec::new();
        for handle in handles {
            guards.push(handle.await.unwrap());
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(guards.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_chain_runs_outermost_first() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let chain = GuardChain::new(vec![
            Arc::new(Tagging("outer", log.clone())),
            Arc::new(Tagging("inner", log.clone())),
        ]);
        let result = chain
            .call(Box::pin(async { Ok(ProxyResponse::new(StatusCode::OK)) }))
            .await
            .unwrap();
        assert_eq!(result.status, StatusCode::OK);
        assert_eq!(*log.lock().unwrap(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_rejection_statuses() {
        let timeout = rejection_response(&GuardError::Timeout(Duration::from_secs(1))).unwrap();
        assert_eq!(timeout.status, StatusCode::REQUEST_TIMEOUT);
        let limited = rejection_response(&GuardError::RateLimited).unwrap();
        assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
        let open = rejection_response(&GuardError::CircuitOpen).unwrap();
        assert_eq!(open.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(rejection_response(&GuardError::Upstream(UpstreamError::Transport(
            "reset".into()
        )))
        .is_none());
    }
}
