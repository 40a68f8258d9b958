//! Upstream request construction.
//!
//! # Responsibilities
//! - Resolve the upstream authority (service discovery for `service://`)
//! - Strip hop-by-hop headers in both directions
//! - Set `Host` to the upstream authority

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Version};

use crate::error::ProxyError;
use crate::routing::{Origin, Scheme};
use crate::transform::ProxyContext;
use crate::upstream::{ServiceDiscovery, UpstreamError};

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in &listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// `host:port` the request for `origin` is sent to.
pub fn upstream_authority(
    origin: &Origin,
    discovery: &dyn ServiceDiscovery,
) -> Result<String, UpstreamError> {
    match origin.scheme() {
        Scheme::Service => discovery.resolve(origin.host()),
        Scheme::Http | Scheme::Https => Ok(format!("{}:{}", origin.host(), origin.port())),
    }
}

/// Move the context's request out into a request for the upstream client.
pub fn build_upstream_request(
    ctx: &mut ProxyContext,
    authority: &str,
) -> Result<Request<Body>, ProxyError> {
    let scheme = match ctx.origin().scheme() {
        Scheme::Https => "https",
        Scheme::Http | Scheme::Service => "http",
    };
    let path_and_query = if ctx.request.uri.starts_with('/') {
        ctx.request.uri.clone()
    } else {
        format!("/{}", ctx.request.uri)
    };
    let uri = format!("{scheme}://{authority}{path_and_query}");

    let mut headers = std::mem::take(&mut ctx.request.headers);
    strip_hop_by_hop(&mut headers);
    let host = HeaderValue::from_str(authority).map_err(|e| ProxyError::InvalidUri {
        uri: uri.clone(),
        reason: e.to_string(),
    })?;
    headers.insert(header::HOST, host);

    let mut request = Request::builder()
        .method(ctx.request.method.clone())
        .uri(uri.as_str())
        .version(Version::HTTP_11)
        .body(std::mem::take(&mut ctx.request.body))
        .map_err(|e| ProxyError::InvalidUri {
            uri: uri.clone(),
            reason: e.to_string(),
        })?;
    *request.headers_mut() = headers;
    Ok(request)
}
