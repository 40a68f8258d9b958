//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::routing::PathMode;

/// Default bound on bodies buffered by body transformers (1 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Body size limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Per-origin overrides, looked up by origin identifier.
    pub origins: Vec<OriginConfig>,

    /// Static table for `service://` origins: service name → `host:port`.
    pub services: HashMap<String, String>,

    /// Routes, tried in declaration order.
    pub routes: Vec<RouteConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Idle pooled connection timeout in seconds.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            idle_secs: 60,
        }
    }
}

/// Body limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest body a transformer will buffer, in bytes.
    pub max_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Per-origin settings that are not part of the origin spec string.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OriginConfig {
    /// Origin identifier, as used by `routes.origin_id`.
    pub id: String,

    /// Named TLS trust/key bucket the origin's client belongs to.
    pub tls_bucket: Option<String>,
}

/// One route.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Path pattern, interpreted per `mode`.
    pub path: String,

    #[serde(default = "default_mode")]
    pub mode: PathMode,

    /// Origin identifier; routes sharing it must use the same origin spec.
    pub origin_id: String,

    /// Origin spec, e.g. `http://users.internal:9000/api/{id}`.
    #[serde(default)]
    pub origin: String,

    /// All must pass for the route to handle a request.
    #[serde(default)]
    pub predicates: Vec<PredicateConfig>,

    #[serde(default)]
    pub request_transformers: Vec<TransformerConfig>,

    #[serde(default)]
    pub response_transformers: Vec<TransformerConfig>,

    /// Fault-tolerance guard around the upstream call.
    #[serde(default)]
    pub guard: Option<GuardConfig>,
}

fn default_mode() -> PathMode {
    PathMode::Fixed
}

/// Built-in route predicates.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PredicateConfig {
    /// Host header, case-insensitive.
    Host { host: String },
    /// Header present, or equal to `value` when given.
    Header { name: String, value: Option<String> },
    /// Method is one of `methods`.
    Method { methods: Vec<String> },
    /// Query parameter present, or equal to `value` when given.
    Query { name: String, value: Option<String> },
}

/// Built-in transformers. The phase comes from the list they are declared in.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformerConfig {
    AddHeader { name: String, value: String },
    ModifyHeader { name: String, value: String },
    RemoveHeaders { names: Vec<String> },
    ContentType { value: String },
    ReplaceBody { body: String },
    /// Replace the body with a fixed JSON document.
    JsonBody { body: serde_json::Value },
    ContentLengthLimit { limit: u64 },
    /// Request side only.
    Method { method: String },
    /// Request side only.
    AddQueryParam { key: String, values: Vec<String> },
    /// Request side only.
    RemoveQueryParams { keys: Vec<String> },
    /// Request side only.
    ReplaceQueryParam { key: String, values: Vec<String> },
}

impl TransformerConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            TransformerConfig::AddHeader { .. } => "add_header",
            TransformerConfig::ModifyHeader { .. } => "modify_header",
            TransformerConfig::RemoveHeaders { .. } => "remove_headers",
            TransformerConfig::ContentType { .. } => "content_type",
            TransformerConfig::ReplaceBody { .. } => "replace_body",
            TransformerConfig::JsonBody { .. } => "json_body",
            TransformerConfig::ContentLengthLimit { .. } => "content_length_limit",
            TransformerConfig::Method { .. } => "method",
            TransformerConfig::AddQueryParam { .. } => "add_query_param",
            TransformerConfig::RemoveQueryParams { .. } => "remove_query_params",
            TransformerConfig::ReplaceQueryParam { .. } => "replace_query_param",
        }
    }

    /// Whether the transformer only makes sense before the upstream call.
    pub fn request_only(&self) -> bool {
        matches!(
            self,
            TransformerConfig::Method { .. }
                | TransformerConfig::AddQueryParam { .. }
                | TransformerConfig::RemoveQueryParams { .. }
                | TransformerConfig::ReplaceQueryParam { .. }
        )
    }
}

/// Guard settings; each present section adds one guard, applied in the
/// order rate limit → circuit breaker → timeout.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GuardConfig {
    pub timeout_ms: Option<u64>,
    pub rate_limit: Option<RateLimitConfig>,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_secs: u64,
}
