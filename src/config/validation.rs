//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (origin overrides refer to routed origins)
//! - Validate value ranges (timeouts > 0, limits > 0, addresses parse)
//! - Reject transformers declared on the wrong side of the upstream call
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system; template and origin
//!   conflicts are left to the route table build

use std::collections::HashSet;
use std::net::SocketAddr;
use std::str::FromStr;

use axum::http::{HeaderName, HeaderValue, Method};
use thiserror::Error;

use crate::config::schema::{GuardConfig, PredicateConfig, ProxyConfig, TransformerConfig};
use crate::routing::{Origin, PathMode};

/// One semantic problem, located by a dotted field path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if SocketAddr::from_str(&config.listener.bind_address).is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    if config.limits.max_body_size == 0 {
        errors.push(ValidationError::new("limits.max_body_size", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && SocketAddr::from_str(&config.observability.metrics_address).is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    for (name, address) in &config.services {
        if address.rsplit_once(':').and_then(|(_, p)| p.parse::<u16>().ok()).is_none() {
            errors.push(ValidationError::new(
                format!("services.{name}"),
                format!("'{address}' is not host:port"),
            ));
        }
    }

    let routed: HashSet<&str> = config.routes.iter().map(|r| r.origin_id.as_str()).collect();
    let mut seen = HashSet::new();
    for (i, origin) in config.origins.iter().enumerate() {
        let field = format!("origins[{i}].id");
        if !seen.insert(origin.id.as_str()) {
            errors.push(ValidationError::new(field, format!("duplicate origin '{}'", origin.id)));
        } else if !routed.contains(origin.id.as_str()) {
            errors.push(ValidationError::new(
                field,
                format!("origin '{}' is not used by any route", origin.id),
            ));
        }
    }

    for (i, route) in config.routes.iter().enumerate() {
        let prefix = format!("routes[{i}]");

        if route.mode != PathMode::Regexp && !route.path.starts_with('/') {
            errors.push(ValidationError::new(format!("{prefix}.path"), "must start with '/'"));
        }
        if route.mode == PathMode::Prefix && !route.path.ends_with('*') {
            errors.push(ValidationError::new(
                format!("{prefix}.path"),
                "prefix routes must end with '*'",
            ));
        }
        if route.origin_id.trim().is_empty() {
            errors.push(ValidationError::new(format!("{prefix}.origin_id"), "must not be empty"));
        }
        if let Err(e) = Origin::of(route.origin_id.clone(), &route.origin) {
            errors.push(ValidationError::new(format!("{prefix}.origin"), e.to_string()));
        }

        for (j, predicate) in route.predicates.iter().enumerate() {
            validate_predicate(&format!("{prefix}.predicates[{j}]"), predicate, &mut errors);
        }
        for (j, transformer) in route.request_transformers.iter().enumerate() {
            validate_transformer(
                &format!("{prefix}.request_transformers[{j}]"),
                transformer,
                &mut errors,
            );
        }
        for (j, transformer) in route.response_transformers.iter().enumerate() {
            let field = format!("{prefix}.response_transformers[{j}]");
            if transformer.request_only() {
                errors.push(ValidationError::new(
                    field.clone(),
                    format!("'{}' only applies to requests", transformer.kind()),
                ));
            }
            validate_transformer(&field, transformer, &mut errors);
        }

        if let Some(guard) = &route.guard {
            validate_guard(&format!("{prefix}.guard"), guard, &mut errors);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_predicate(field: &str, predicate: &PredicateConfig, errors: &mut Vec<ValidationError>) {
    match predicate {
        PredicateConfig::Host { host } if host.trim().is_empty() => {
            errors.push(ValidationError::new(field, "host must not be empty"));
        }
        PredicateConfig::Header { name, value } => {
            check_header(field, name, value.as_deref(), errors);
        }
        PredicateConfig::Method { methods } => {
            if methods.is_empty() {
                errors.push(ValidationError::new(field, "methods must not be empty"));
            }
            check_methods(field, methods, errors);
        }
        PredicateConfig::Query { name, .. } if name.is_empty() => {
            errors.push(ValidationError::new(field, "name must not be empty"));
        }
        _ => {}
    }
}

fn validate_transformer(
    field: &str,
    transformer: &TransformerConfig,
    errors: &mut Vec<ValidationError>,
) {
    match transformer {
        TransformerConfig::AddHeader { name, value }
        | TransformerConfig::ModifyHeader { name, value } => {
            check_header(field, name, Some(value), errors);
        }
        TransformerConfig::RemoveHeaders { names } => {
            for name in names {
                check_header(field, name, None, errors);
            }
        }
        TransformerConfig::ContentType { value } => {
            if HeaderValue::from_str(value).is_err() {
                errors.push(ValidationError::new(field, format!("invalid content type '{value}'")));
            }
        }
        TransformerConfig::Method { method } => {
            check_methods(field, std::slice::from_ref(method), errors);
        }
        TransformerConfig::AddQueryParam { key, .. }
        | TransformerConfig::ReplaceQueryParam { key, .. } => {
            if key.is_empty() {
                errors.push(ValidationError::new(field, "key must not be empty"));
            }
        }
        TransformerConfig::ReplaceBody { .. }
        | TransformerConfig::JsonBody { .. }
        | TransformerConfig::ContentLengthLimit { .. }
        | TransformerConfig::RemoveQueryParams { .. } => {}
    }
}

fn validate_guard(field: &str, guard: &GuardConfig, errors: &mut Vec<ValidationError>) {
    if guard.timeout_ms == Some(0) {
        errors.push(ValidationError::new(format!("{field}.timeout_ms"), "must be greater than 0"));
    }
    if let Some(rate) = &guard.rate_limit {
        if rate.requests_per_second == 0 || rate.burst == 0 {
            errors.push(ValidationError::new(
                format!("{field}.rate_limit"),
                "requests_per_second and burst must be greater than 0",
            ));
        }
    }
    if let Some(breaker) = &guard.circuit_breaker {
        if breaker.failure_threshold == 0 {
            errors.push(ValidationError::new(
                format!("{field}.circuit_breaker.failure_threshold"),
                "must be greater than 0",
            ));
        }
    }
}

fn check_header(field: &str, name: &str, value: Option<&str>, errors: &mut Vec<ValidationError>) {
    if HeaderName::from_str(name).is_err() {
        errors.push(ValidationError::new(field, format!("invalid header name '{name}'")));
    }
    if let Some(value) = value {
        if HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::new(field, format!("invalid header value for '{name}'")));
        }
    }
}

fn check_methods(field: &str, methods: &[String], errors: &mut Vec<ValidationError>) {
    for method in methods {
        if Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::new(field, format!("invalid method '{method}'")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RouteConfig;

    fn route(path: &str, origin: &str) -> RouteConfig {
        RouteConfig {
            path: path.to_string(),
            mode: PathMode::Fixed,
            origin_id: "backend".to_string(),
            origin: origin.to_string(),
            predicates: Vec::new(),
            request_transformers: Vec::new(),
            response_transformers: Vec::new(),
            guard: None,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        let mut config = ProxyConfig::default();
        config.routes.push(route("/users", "http://localhost:9000/"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "nowhere".to_string();
        config.limits.max_body_size = 0;
        let mut bad = route("users", "ftp://localhost/");
        bad.request_transformers.push(TransformerConfig::AddHeader {
            name: "bad header".to_string(),
            value: "x".to_string(),
        });
        config.routes.push(bad);

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"listener.bind_address"));
        assert!(fields.contains(&"limits.max_body_size"));
        assert!(fields.contains(&"routes[0].path"));
        assert!(fields.contains(&"routes[0].origin"));
        assert!(fields.contains(&"routes[0].request_transformers[0]"));
    }

    #[test]
    fn test_request_only_transformer_rejected_on_response() {
        let mut config = ProxyConfig::default();
        let mut r = route("/users", "http://localhost:9000/");
        r.response_transformers.push(TransformerConfig::Method {
            method: "POST".to_string(),
        });
        config.routes.push(r);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("only applies to requests"));
    }

    #[test]
    fn test_prefix_route_needs_wildcard() {
        let mut config = ProxyConfig::default();
        let mut r = route("/api", "http://localhost:9000/");
        r.mode = PathMode::Prefix;
        config.routes.push(r);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "routes[0].path");
    }
}
