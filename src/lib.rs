//! Edge gateway library: path-based routing to upstream origins with URI
//! rewriting and request/response transformers.

pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod rewrite;
pub mod routing;
pub mod transform;
pub mod upstream;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use gateway::Gateway;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
