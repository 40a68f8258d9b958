//! Turns a validated `ProxyConfig` into a route table and a gateway.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method};

use crate::config::loader::ConfigError;
use crate::config::schema::{GuardConfig, PredicateConfig, ProxyConfig, RouteConfig, TransformerConfig};
use crate::gateway::Gateway;
use crate::resilience::{
    CircuitBreakerGuard, GuardChain, LazyGuard, RateLimitGuard, TimeoutGuard, UpstreamGuard,
};
use crate::routing::matcher::{HeaderPredicate, HostPredicate, MethodPredicate, QueryPredicate};
use crate::routing::{Origin, Route, RouteTable};
use crate::transform::body::ReplaceBody;
use crate::transform::headers::{AddHeader, ModifyHeader, RemoveHeaders, SetContentType};
use crate::transform::json::JsonValueModifier;
use crate::transform::limits::ContentLengthLimit;
use crate::transform::method::ModifyMethod;
use crate::transform::query::{AddQueryParam, RemoveQueryParams, ReplaceQueryParam};
use crate::transform::{Phase, Transformer};
use crate::upstream::{ClientRegistry, HyperClientFactory, StaticDiscovery, DEFAULT_TLS_BUCKET};

/// Build the gateway described by `config`: route table, client registry
/// with TLS buckets, and the static service table.
pub fn build_gateway(config: &ProxyConfig) -> Result<Gateway, ConfigError> {
    let table = build_route_table(config)?;

    let factory = HyperClientFactory::new(
        Duration::from_secs(config.timeouts.connect_secs),
        Duration::from_secs(config.timeouts.idle_secs),
    );
    let buckets: HashMap<String, String> = config
        .origins
        .iter()
        .map(|o| {
            let bucket = o.tls_bucket.clone().unwrap_or_else(|| DEFAULT_TLS_BUCKET.to_string());
            (o.id.clone(), bucket)
        })
        .collect();
    let registry = ClientRegistry::with_tls_buckets(Arc::new(factory), buckets);
    let discovery = StaticDiscovery::new(config.services.clone());

    Ok(Gateway::new(
        table,
        registry,
        Arc::new(discovery),
        config.limits.max_body_size,
    ))
}

/// Build the route table for `config.routes`, in declaration order.
pub fn build_route_table(config: &ProxyConfig) -> Result<RouteTable, ConfigError> {
    let routes = config
        .routes
        .iter()
        .enumerate()
        .map(|(i, route)| build_route(i, route))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RouteTable::new(routes)?)
}

fn build_route(index: usize, config: &RouteConfig) -> Result<Route, ConfigError> {
    let origin = Origin::of(config.origin_id.clone(), &config.origin)
        .map_err(|e| route_error(index, e))?;
    let mut route = Route::new(config.path.clone(), origin, config.mode);

    for predicate in &config.predicates {
        route = add_predicate(index, route, predicate)?;
    }
    for transformer in &config.request_transformers {
        route = add_transformer(index, route, Phase::Request, transformer)?;
    }
    for transformer in &config.response_transformers {
        if transformer.request_only() {
            return Err(route_error(
                index,
                format!("'{}' only applies to requests", transformer.kind()),
            ));
        }
        route = add_transformer(index, route, Phase::Response, transformer)?;
    }
    if let Some(guard) = &config.guard {
        route = route.with_guard(lazy_guard(guard.clone()));
    }

    Ok(route)
}

fn add_predicate(index: usize, route: Route, config: &PredicateConfig) -> Result<Route, ConfigError> {
    Ok(match config {
        PredicateConfig::Host { host } => route.add_predicate(HostPredicate::new(host.clone())),
        PredicateConfig::Header { name, value: Some(value) } => {
            route.add_predicate(HeaderPredicate::equals(name.clone(), value.clone()))
        }
        PredicateConfig::Header { name, value: None } => {
            route.add_predicate(HeaderPredicate::present(name.clone()))
        }
        PredicateConfig::Method { methods } => {
            let methods = methods
                .iter()
                .map(|m| parse_method(index, m))
                .collect::<Result<Vec<_>, _>>()?;
            route.add_predicate(MethodPredicate::new(methods))
        }
        PredicateConfig::Query { name, value: Some(value) } => {
            route.add_predicate(QueryPredicate::equals(name.clone(), value.clone()))
        }
        PredicateConfig::Query { name, value: None } => {
            route.add_predicate(QueryPredicate::present(name.clone()))
        }
    })
}

fn add_transformer(
    index: usize,
    route: Route,
    phase: Phase,
    config: &TransformerConfig,
) -> Result<Route, ConfigError> {
    let route = match config {
        TransformerConfig::AddHeader { name, value } => push(
            route,
            phase,
            AddHeader::new(phase, header_name(index, name)?, header_value(index, value)?),
        ),
        TransformerConfig::ModifyHeader { name, value } => push(
            route,
            phase,
            ModifyHeader::to(phase, header_name(index, name)?, header_value(index, value)?),
        ),
        TransformerConfig::RemoveHeaders { names } => {
            let names = names
                .iter()
                .map(|n| header_name(index, n))
                .collect::<Result<Vec<_>, _>>()?;
            push(route, phase, RemoveHeaders::new(phase, names))
        }
        TransformerConfig::ContentType { value } => {
            push(route, phase, SetContentType::new(phase, header_value(index, value)?))
        }
        TransformerConfig::ReplaceBody { body } => {
            push(route, phase, ReplaceBody::with_static(phase, body.clone()))
        }
        TransformerConfig::JsonBody { body } => {
            push(route, phase, JsonValueModifier::with_static(phase, body.clone()))
        }
        TransformerConfig::ContentLengthLimit { limit } => {
            push(route, phase, ContentLengthLimit::new(phase, *limit))
        }
        TransformerConfig::Method { method } => {
            push(route, phase, ModifyMethod::new(parse_method(index, method)?))
        }
        TransformerConfig::AddQueryParam { key, values } => {
            push(route, phase, AddQueryParam::new(key.clone(), values.clone()))
        }
        TransformerConfig::RemoveQueryParams { keys } => {
            push(route, phase, RemoveQueryParams::new(keys.clone()))
        }
        TransformerConfig::ReplaceQueryParam { key, values } => {
            push(route, phase, ReplaceQueryParam::new(key.clone(), values.clone()))
        }
    };
    Ok(route)
}

fn push(route: Route, phase: Phase, transformer: impl Transformer + 'static) -> Route {
    match phase {
        Phase::Request => route.add_request_transformer(transformer),
        Phase::Response => route.add_response_transformer(transformer),
    }
}

/// Guards are built on the first request that reaches the route, so a
/// reload that drops the route never allocates its breaker or bucket.
fn lazy_guard(config: GuardConfig) -> LazyGuard {
    LazyGuard::new(move |_ctx| {
        let mut guards: Vec<Arc<dyn UpstreamGuard>> = Vec::new();
        if let Some(rate) = &config.rate_limit {
            guards.push(Arc::new(RateLimitGuard::new(rate.requests_per_second, rate.burst)));
        }
        if let Some(breaker) = &config.circuit_breaker {
            guards.push(Arc::new(CircuitBreakerGuard::new(
                breaker.failure_threshold,
                Duration::from_secs(breaker.recovery_secs),
            )));
        }
        if let Some(ms) = config.timeout_ms {
            guards.push(Arc::new(TimeoutGuard::new(Duration::from_millis(ms))));
        }
        Arc::new(GuardChain::new(guards))
    })
}

fn header_name(index: usize, name: &str) -> Result<HeaderName, ConfigError> {
    HeaderName::from_str(name).map_err(|e| route_error(index, format!("header '{name}': {e}")))
}

fn header_value(index: usize, value: &str) -> Result<HeaderValue, ConfigError> {
    HeaderValue::from_str(value).map_err(|e| route_error(index, format!("header value: {e}")))
}

fn parse_method(index: usize, method: &str) -> Result<Method, ConfigError> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|e| route_error(index, format!("method '{method}': {e}")))
}

fn route_error(index: usize, reason: impl ToString) -> ConfigError {
    ConfigError::Route {
        route: index,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_config;
    use crate::routing::RouteTableError;
    use axum::body::Body;
    use axum::http::Request;

    #[test]
    fn test_routes_keep_declaration_order() {
        let config = parse_config(
            r#"
            [[routes]]
            path = "/items/*"
            mode = "prefix"
            origin_id = "a"
            origin = "http://a:1/"

            [[routes.predicates]]
            type = "header"
            name = "x-beta"

            [[routes]]
            path = "/items/*"
            mode = "prefix"
            origin_id = "b"
            origin = "http://b:2/"
            "#,
        )
        .unwrap();
        let table = build_route_table(&config).unwrap();

        let beta = Request::builder()
            .uri("/items/1")
            .header("x-beta", "1")
            .body(Body::empty())
            .unwrap();
        let plain = Request::builder().uri("/items/1").body(Body::empty()).unwrap();

        assert_eq!(table.match_request(&beta).unwrap().route.origin().identifier(), "a");
        assert_eq!(table.match_request(&plain).unwrap().route.origin().identifier(), "b");
    }

    #[test]
    fn test_transformers_attach_to_their_phase() {
        let config = parse_config(
            r#"
            [[routes]]
            path = "/users"
            origin_id = "users"
            origin = "http://users:9000/"

            [[routes.request_transformers]]
            type = "add_header"
            name = "x-gateway"
            value = "edge"

            [[routes.request_transformers]]
            type = "method"
            method = "post"

            [[routes.response_transformers]]
            type = "content_type"
            value = "text/plain"

            [routes.guard]
            timeout_ms = 250
            "#,
        )
        .unwrap();
        let table = build_route_table(&config).unwrap();
        let route = table.routes().next().unwrap();

        assert_eq!(route.request_transformers().len(), 2);
        assert_eq!(route.response_transformers().len(), 1);
        assert!(route.guard().is_some());
        assert!(!route.guard().unwrap().is_built());
    }

    #[test]
    fn test_conflicting_origins_fail_the_build() {
        let config = parse_config(
            r#"
            [[routes]]
            path = "/a"
            origin_id = "shared"
            origin = "http://one:1/"

            [[routes]]
            path = "/b"
            origin_id = "shared"
            origin = "http://two:2/"
            "#,
        )
        .unwrap();

        let err = build_route_table(&config).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::RouteTable(RouteTableError::ConflictingOrigin { .. })
        ));
    }

    #[test]
    fn test_gateway_assigns_tls_buckets() {
        let config = parse_config(
            r#"
            [[origins]]
            id = "users"
            tls_bucket = "internal"

            [[routes]]
            path = "/users"
            origin_id = "users"
            origin = "http://users:9000/"

            [[routes]]
            path = "/orders"
            origin_id = "orders"
            origin = "http://orders:9000/"
            "#,
        )
        .unwrap();
        let gateway = build_gateway(&config).unwrap();
        let table = gateway.table();
        let origins = table.origins();
        let bucket = |id: &str| {
            let origin = origins.iter().find(|o| o.identifier() == id).unwrap();
            gateway.registry().bucket_of(origin).to_string()
        };

        assert_eq!(bucket("users"), "internal");
        assert_eq!(bucket("orders"), DEFAULT_TLS_BUCKET);
    }
}
