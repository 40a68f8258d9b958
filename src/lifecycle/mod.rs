//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build route table → Start watcher → Start listener
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C → Shutdown::trigger → server drains, watcher stops
//! ```
//!
//! # Design Decisions
//! - Fail fast: a startup configuration error is fatal
//! - The listener starts last (traffic only when ready)

pub mod shutdown;

pub use shutdown::Shutdown;
