//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all gateway handler
//! - Wire up middleware (tracing, request timeout, request ID)
//! - Bind server to listener
//! - Apply reloaded configurations to the live gateway
//! - Drain in-flight requests on shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{build_gateway, ConfigError, ProxyConfig};
use crate::gateway::Gateway;
use crate::http::request::{request_id_header, MakeRequestUuid, RequestIdExt};
use crate::lifecycle::shutdown;

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    gateway: Arc<Gateway>,
}

impl HttpServer {
    /// Build the gateway described by `config` and the router in front of it.
    pub fn new(config: ProxyConfig) -> Result<Self, ConfigError> {
        let gateway = Arc::new(build_gateway(&config)?);
        Ok(Self::with_gateway(&config, gateway))
    }

    /// Serve an already built gateway; `config` supplies the request timeout.
    pub fn with_gateway(config: &ProxyConfig, gateway: Arc<Gateway>) -> Self {
        let router = Self::build_router(config, gateway.clone());
        Self { router, gateway }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, gateway: Arc<Gateway>) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(gateway)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(request_id_header(), MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            uri = %request.uri(),
                            request_id = %request.request_id(),
                        )
                    }))
                    .layer(PropagateRequestIdLayer::new(request_id_header()))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Every config received on `config_updates` rebuilds the route table;
    /// a config that fails to build is logged and the current table stays.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let gateway = self.gateway.clone();
        let reloader = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                match gateway.apply_config(&config) {
                    Ok(()) => tracing::info!(routes = config.routes.len(), "Configuration reloaded"),
                    Err(e) => tracing::error!(error = %e, "Rejected reloaded configuration"),
                }
            }
        });

        let result = axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        result
    }
}

async fn proxy_handler(State(gateway): State<Arc<Gateway>>, request: Request<Body>) -> Response {
    tracing::debug!(
        request_id = %request.request_id(),
        method = %request.method(),
        path = %request.uri().path(),
        "Proxying request"
    );
    gateway.handle(request).await
}
