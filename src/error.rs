//! Per-request error type.
//!
//! Configuration problems are reported by the layer that detects them
//! (`OriginError`, `SegmentError`, `RouteTableError`, `ConfigError`) and
//! abort startup. `ProxyError` covers what can go wrong while a request is
//! in flight; it is always answered with `502 Bad Gateway`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::routing::SegmentError;
use crate::upstream::UpstreamError;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Unresolved variable '{name}' in template '{template}'")]
    UnresolvedVariable { name: String, template: String },

    #[error(transparent)]
    Segment(#[from] SegmentError),

    #[error("Invalid upstream URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("Failed to buffer body: {0}")]
    Body(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("Transformer '{name}' failed: {reason}")]
    Transformer { name: &'static str, reason: String },

    #[error("No upstream response to transform")]
    MissingResponse,
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::BAD_GATEWAY
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status_code(), "Upstream request failed").into_response()
    }
}
