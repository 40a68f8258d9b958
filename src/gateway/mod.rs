//! Gateway: the route table plus everything a request needs to reach upstream.
//!
//! # Data Flow
//! ```text
//! Request
//!     → RouteTable::match_request (no match → 404)
//!     → pipeline.rs (rewrite → request chain → upstream → response chain)
//!     → forward.rs (authority, hop-by-hop headers, Host)
//!     → Response (ProxyError → 502)
//! ```
//!
//! # Design Decisions
//! - The route table is published through `ArcSwap`; a reload replaces it
//!   wholesale and in-flight requests keep the table they started with
//! - The client registry belongs to the gateway, so several gateways can
//!   coexist in one process

pub mod forward;
pub(crate) mod pipeline;

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::config::{build_route_table, ConfigError, ProxyConfig, DEFAULT_MAX_BODY_SIZE};
use crate::observability::metrics;
use crate::routing::RouteTable;
use crate::upstream::{ClientRegistry, HyperClientFactory, ServiceDiscovery, StaticDiscovery};

pub struct Gateway {
    table: ArcSwap<RouteTable>,
    registry: ClientRegistry,
    discovery: Arc<dyn ServiceDiscovery>,
    body_limit: usize,
}

impl Gateway {
    pub fn new(
        table: RouteTable,
        registry: ClientRegistry,
        discovery: Arc<dyn ServiceDiscovery>,
        body_limit: usize,
    ) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
            registry,
            discovery,
            body_limit,
        }
    }

    /// Gateway with the default HTTP client factory and no services.
    pub fn with_table(table: RouteTable) -> Self {
        Self::new(
            table,
            ClientRegistry::new(Arc::new(HyperClientFactory::default())),
            Arc::new(StaticDiscovery::default()),
            DEFAULT_MAX_BODY_SIZE,
        )
    }

    /// Current route table.
    pub fn table(&self) -> Arc<RouteTable> {
        self.table.load_full()
    }

    /// Publish a new route table; requests already in flight are unaffected.
    pub fn replace_table(&self, table: RouteTable) {
        tracing::info!(routes = table.len(), "Route table published");
        self.table.store(Arc::new(table));
    }

    /// Rebuild the routes from a reloaded config. On error the current table
    /// stays. Listener, client and service settings are read at startup only.
    pub fn apply_config(&self, config: &ProxyConfig) -> Result<(), ConfigError> {
        let table = build_route_table(config)?;
        self.replace_table(table);
        Ok(())
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Route and proxy one request.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let method = request.method().to_string();
        let path = request.uri().path().to_string();
        let table = self.table.load_full();

        let Some(matched) = table.match_request(&request) else {
            tracing::warn!(path = %path, "No route matched");
            metrics::record_request(&method, StatusCode::NOT_FOUND.as_u16(), "none", start);
            return (StatusCode::NOT_FOUND, "No matching route found").into_response();
        };

        let route = matched.route;
        let upstreams = pipeline::Upstreams {
            registry: &self.registry,
            discovery: self.discovery.as_ref(),
            body_limit: self.body_limit,
        };

        let response = match pipeline::run(route, matched.params, request, upstreams).await {
            Ok(response) => response.into_response(),
            Err(e) => {
                tracing::error!(path = %path, route = %route.path(), origin = %route.origin(), error = %e, "Proxy request failed");
                e.into_response()
            }
        };

        metrics::record_request(&method, response.status().as_u16(), route.path(), start);
        response
    }
}
