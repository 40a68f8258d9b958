//! Upstream connectivity.
//!
//! # Data Flow
//! ```text
//! Origin (from the matched route)
//!     → registry.rs (one client per origin, grouped by TLS bucket)
//!     → discovery.rs (service:// origins only: name → host:port)
//!     → client.rs (send the resolved request)
//! ```

pub mod client;
pub mod discovery;
pub mod registry;

use thiserror::Error;

pub use client::{ClientFactory, HyperClient, HyperClientFactory, UpstreamClient};
pub use discovery::{ServiceDiscovery, StaticDiscovery};
pub use registry::{ClientRegistry, DEFAULT_TLS_BUCKET};

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Upstream transport error: {0}")]
    Transport(String),

    #[error("TLS upstreams are not supported by this client: {0}")]
    TlsUnsupported(String),

    #[error("Failed to bind upstream client: {0}")]
    Client(String),

    #[error("Cannot resolve service '{service}': {reason}")]
    Discovery { service: String, reason: String },

    #[error("Invalid upstream request: {0}")]
    InvalidRequest(String),
}
