//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → builder.rs (routes, transformers, guards, client registry)
//!     → Gateway (route table behind ArcSwap)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → builder.rs builds a new route table
//!     → atomic swap; on any error the current table stays
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod builder;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use builder::{build_gateway, build_route_table};
pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{ProxyConfig, RouteConfig, DEFAULT_MAX_BODY_SIZE};
pub use watcher::ConfigWatcher;
