//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream (route has a guard):
//!     → guard.rs (LazyGuard: build once per route, on first request)
//!     → rate_limit.rs (token bucket, 429 when empty)
//!     → circuit_breaker.rs (fail fast with 503 while open)
//!     → timeouts.rs (408 when the call exceeds its deadline)
//!     → upstream client
//! ```
//!
//! # Design Decisions
//! - No retries here; the pipeline calls the upstream exactly once
//! - Guard state lives as long as the route, never per request
//! - All resilience logic is composable (`GuardChain`)

pub mod circuit_breaker;
pub mod guard;
pub mod rate_limit;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerGuard, CircuitState};
pub use guard::{GuardChain, GuardError, GuardResult, LazyGuard, UpstreamGuard};
pub use rate_limit::RateLimitGuard;
pub use timeouts::TimeoutGuard;
