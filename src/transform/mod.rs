//! Request and response transformers.
//!
//! # Data Flow
//! ```text
//! RouteMatch
//!     → rewrite (upstream URI + merged query)
//!     → request transformers, in registration order
//!     → upstream call (optionally guarded)
//!     → response transformers, in registration order
//!     → client
//! ```
//!
//! Any transformer may return [`Flow::Respond`]. On the request side that
//! skips the remaining request transformers, the upstream call and every
//! response transformer; on the response side it skips the remaining
//! response transformers.
//!
//! # Design Decisions
//! - Transformers are trait objects returning a boxed future, so sync and
//!   async steps share one list
//! - Bodies are buffered only by the steps that need to read them
//! - A transformer wanting a specific status returns a terminal response;
//!   a returned `Err` always becomes a 502

pub mod body;
pub mod headers;
pub mod json;
pub mod limits;
pub mod method;
pub mod query;
pub mod response;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Version};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::ProxyError;
use crate::routing::Origin;

pub use response::TerminalResponse;

/// Outcome of a single transformer.
#[derive(Debug)]
pub enum Flow {
    Continue,
    /// Stop here and send this response.
    Respond(ProxyResponse),
}

/// Which message a two-sided transformer operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Request,
    Response,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Request => f.write_str("Request"),
            Phase::Response => f.write_str("Response"),
        }
    }
}

/// A single step in a route's request or response chain.
pub trait Transformer: Send + Sync {
    fn apply<'a>(&'a self, ctx: &'a mut ProxyContext) -> BoxFuture<'a, Result<Flow, ProxyError>>;

    fn name(&self) -> &'static str;
}

/// Outbound request as it will be sent upstream.
#[derive(Debug)]
pub struct ProxyRequest {
    pub method: Method,
    /// Upstream path and query.
    pub uri: String,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Body,
}

/// Response travelling back to the client.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl ProxyResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::empty(),
        }
    }

    pub fn from_upstream(response: Response<Body>) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            status: parts.status,
            headers: parts.headers,
            body,
        }
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Mutable state shared by the transformers of one request.
pub struct ProxyContext {
    pub request: ProxyRequest,
    /// Set once the upstream call returned.
    pub response: Option<ProxyResponse>,
    original_uri: String,
    params: HashMap<String, String>,
    origin: Arc<Origin>,
    body_limit: usize,
}

impl ProxyContext {
    pub fn new(
        request: ProxyRequest,
        original_uri: impl Into<String>,
        params: HashMap<String, String>,
        origin: Arc<Origin>,
        body_limit: usize,
    ) -> Self {
        Self {
            request,
            response: None,
            original_uri: original_uri.into(),
            params,
            origin,
            body_limit,
        }
    }

    /// Path and query as received from the client.
    pub fn original_uri(&self) -> &str {
        &self.original_uri
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn origin(&self) -> &Arc<Origin> {
        &self.origin
    }

    pub fn body_limit(&self) -> usize {
        self.body_limit
    }

    pub fn headers(&self, phase: Phase) -> Result<&HeaderMap, ProxyError> {
        match phase {
            Phase::Request => Ok(&self.request.headers),
            Phase::Response => self
                .response
                .as_ref()
                .map(|r| &r.headers)
                .ok_or(ProxyError::MissingResponse),
        }
    }

    pub fn headers_mut(&mut self, phase: Phase) -> Result<&mut HeaderMap, ProxyError> {
        match phase {
            Phase::Request => Ok(&mut self.request.headers),
            Phase::Response => self
                .response
                .as_mut()
                .map(|r| &mut r.headers)
                .ok_or(ProxyError::MissingResponse),
        }
    }

    fn body_mut(&mut self, phase: Phase) -> Result<&mut Body, ProxyError> {
        match phase {
            Phase::Request => Ok(&mut self.request.body),
            Phase::Response => self
                .response
                .as_mut()
                .map(|r| &mut r.body)
                .ok_or(ProxyError::MissingResponse),
        }
    }

    /// Buffer the whole body of `phase`, leaving it empty.
    pub async fn take_body(&mut self, phase: Phase) -> Result<Bytes, ProxyError> {
        let limit = self.body_limit;
        let body = std::mem::take(self.body_mut(phase)?);
        axum::body::to_bytes(body, limit)
            .await
            .map_err(|e| ProxyError::Body(e.to_string()))
    }

    /// Replace the body of `phase` and keep `Content-Length` in step with it.
    pub fn set_body(&mut self, phase: Phase, bytes: Bytes) -> Result<(), ProxyError> {
        let len = bytes.len();
        *self.body_mut(phase)? = Body::from(bytes);
        let headers = self.headers_mut(phase)?;
        headers.remove(header::TRANSFER_ENCODING);
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        Ok(())
    }
}

impl fmt::Debug for ProxyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyContext")
            .field("method", &self.request.method)
            .field("uri", &self.request.uri)
            .field("original_uri", &self.original_uri)
            .field("origin", &self.origin.identifier())
            .field("has_response", &self.response.is_some())
            .finish()
    }
}

/// Adapter turning a synchronous closure into a [`Transformer`].
pub struct FnTransformer<F> {
    name: &'static str,
    f: F,
}

impl<F> Transformer for FnTransformer<F>
where
    F: Fn(&mut ProxyContext) -> Result<Flow, ProxyError> + Send + Sync,
{
    fn apply<'a>(&'a self, ctx: &'a mut ProxyContext) -> BoxFuture<'a, Result<Flow, ProxyError>> {
        let result = (self.f)(ctx);
        Box::pin(async move { result })
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

pub fn transformer_fn<F>(name: &'static str, f: F) -> FnTransformer<F>
where
    F: Fn(&mut ProxyContext) -> Result<Flow, ProxyError> + Send + Sync,
{
    FnTransformer { name, f }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_set_body_updates_content_length() {
        let mut ctx = with_body(context(Method::POST, "/"), "hello");
        let bytes = ctx.take_body(Phase::Request).await.unwrap();
        assert_eq!(&bytes[..], b"hello");

        ctx.set_body(Phase::Request, Bytes::from_static(b"hi")).unwrap();
        assert_eq!(ctx.request.headers[header::CONTENT_LENGTH], "2");
        assert_eq!(body_string(std::mem::take(&mut ctx.request.body)).await, "hi");
    }

    #[tokio::test]
    async fn test_response_phase_without_response() {
        let mut ctx = context(Method::GET, "/");
        assert!(matches!(
            ctx.headers_mut(Phase::Response),
            Err(ProxyError::MissingResponse)
        ));
    }

    #[tokio::test]
    async fn test_fn_transformer() {
        let t = transformer_fn("tag", |ctx| {
            ctx.request.uri.push_str("?tagged");
            Ok(Flow::Continue)
        });
        let mut ctx = context(Method::GET, "/a");
        assert!(matches!(t.apply(&mut ctx).await.unwrap(), Flow::Continue));
        assert_eq!(ctx.request.uri, "/a?tagged");
        assert_eq!(t.name(), "tag");
    }
}
