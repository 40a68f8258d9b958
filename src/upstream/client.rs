//! Upstream HTTP clients.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{uri::Scheme as UriScheme, Request, Response};
use futures_util::future::BoxFuture;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::routing::{Origin, Scheme};
use crate::upstream::UpstreamError;

/// Sends fully resolved requests to one origin.
///
/// Implementations are shared by every request to that origin and must
/// handle concurrent use.
pub trait UpstreamClient: Send + Sync {
    fn send(&self, request: Request<Body>) -> BoxFuture<'static, Result<Response<Body>, UpstreamError>>;
}

/// Creates the client for an origin the first time it is used.
pub trait ClientFactory: Send + Sync {
    fn create(&self, origin: &Origin) -> Result<Arc<dyn UpstreamClient>, UpstreamError>;
}

/// Plain-HTTP client backed by the hyper-util connection pool.
#[derive(Clone)]
pub struct HyperClient {
    inner: Client<HttpConnector, Body>,
}

impl HyperClient {
    pub fn new(connect_timeout: Duration, idle_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let inner = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(idle_timeout)
            .build(connector);
        Self { inner }
    }
}

impl UpstreamClient for HyperClient {
    fn send(&self, request: Request<Body>) -> BoxFuture<'static, Result<Response<Body>, UpstreamError>> {
        let client = self.inner.clone();
        Box::pin(async move {
            if request.uri().scheme() == Some(&UriScheme::HTTPS) {
                return Err(UpstreamError::TlsUnsupported(request.uri().to_string()));
            }
            let response: Response<hyper::body::Incoming> = client
                .request(request)
                .await
                .map_err(|e| UpstreamError::Transport(e.to_string()))?;
            let (parts, body) = response.into_parts();
            Ok(Response::from_parts(parts, Body::new(body)))
        })
    }
}

/// Default factory: one pooled [`HyperClient`] per origin.
#[derive(Debug, Clone)]
pub struct HyperClientFactory {
    connect_timeout: Duration,
    idle_timeout: Duration,
}

impl HyperClientFactory {
    pub fn new(connect_timeout: Duration, idle_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            idle_timeout,
        }
    }
}

impl Default for HyperClientFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(60))
    }
}

impl ClientFactory for HyperClientFactory {
    fn create(&self, origin: &Origin) -> Result<Arc<dyn UpstreamClient>, UpstreamError> {
        if origin.scheme() == Scheme::Https {
            return Err(UpstreamError::TlsUnsupported(origin.uri()));
        }
        tracing::debug!(origin = %origin, "Creating upstream client");
        Ok(Arc::new(HyperClient::new(
            self.connect_timeout,
            self.idle_timeout,
        )))
    }
}
