//! Upstream URI rewriting.
//!
//! # Data Flow
//! ```text
//! RouteMatch + inbound path/query
//!     → template.rs (expand origin path template)
//!     → query.rs (append inbound query, raw)
//!     → upstream path + query handed to the transformer chain
//! ```
//!
//! # Design Decisions
//! - Origin paths without `{` are used verbatim
//! - Inbound query pairs are never decoded, so nothing is encoded twice
//! - Unresolved variables fail the request, not the route table build

pub mod query;
pub mod template;

pub use query::{merge_inbound_query, Query};
pub use template::{rewrite_target, REQUEST_URI, REQUEST_URI_AFTER_PREFIX};
