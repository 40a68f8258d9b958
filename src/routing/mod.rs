//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at startup or reload):
//!     Route[] (path, mode, origin, predicates, transformers)
//!     → origin.rs (parse origin spec)
//!     → segment.rs (compile placeholders, reject duplicates)
//!     → matcher.rs (compile path matcher per mode)
//!     → Freeze as immutable RouteTable
//!
//! Incoming Request (path, headers)
//!     → table.rs (ordered scan)
//!     → matcher.rs (path + predicates)
//!     → Return: RouteMatch or no match
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Deterministic: same input always matches same route
//! - First match wins (declaration order)

pub mod matcher;
pub mod origin;
pub mod route;
pub mod segment;
pub mod table;

use thiserror::Error;

pub use matcher::Predicate;
pub use origin::{Origin, OriginError, Scheme};
pub use route::{PathMode, Route};
pub use segment::{extract_segment_values, replace_segments_with_regex, SegmentError};
pub use table::{RouteMatch, RouteTable};

/// Configuration errors raised while building a route table.
#[derive(Debug, Error)]
pub enum RouteTableError {
    #[error(transparent)]
    Origin(#[from] OriginError),

    #[error(transparent)]
    Segment(#[from] SegmentError),

    #[error("Invalid path pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Origin identifier '{identifier}' maps to '{existing}' and '{conflicting}'")]
    ConflictingOrigin {
        identifier: String,
        existing: String,
        conflicting: String,
    },

    #[error("Route '{route}': {reason}")]
    InvalidRoute { route: String, reason: String },
}
