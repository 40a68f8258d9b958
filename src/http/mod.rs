//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, request span)
//!     → gateway (route, rewrite, transform, forward)
//!     → Send to client
//! ```

pub mod request;
pub mod server;

pub use request::{request_id_header, MakeRequestUuid, RequestIdExt, X_REQUEST_ID};
pub use server::HttpServer;
