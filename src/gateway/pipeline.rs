//! Per-request pipeline for a matched route.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use futures_util::future::BoxFuture;

use crate::error::ProxyError;
use crate::gateway::forward::{build_upstream_request, strip_hop_by_hop, upstream_authority};
use crate::observability::metrics;
use crate::resilience::guard::{rejection_response, GuardError, GuardResult};
use crate::rewrite::rewrite_target;
use crate::routing::Route;
use crate::transform::{Flow, Phase, ProxyContext, ProxyRequest, ProxyResponse, Transformer};
use crate::upstream::{ClientRegistry, ServiceDiscovery, UpstreamError};

/// Collaborators the pipeline needs besides the route itself.
pub(crate) struct Upstreams<'a> {
    pub registry: &'a ClientRegistry,
    pub discovery: &'a dyn ServiceDiscovery,
    pub body_limit: usize,
}

/// Rewrite, run the request chain, call upstream, run the response chain.
pub(crate) async fn run(
    route: &Route,
    params: HashMap<String, String>,
    request: Request<Body>,
    upstreams: Upstreams<'_>,
) -> Result<ProxyResponse, ProxyError> {
    let (parts, body) = request.into_parts();
    let original_uri = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let target = rewrite_target(route, &original_uri, &params)?;
    tracing::debug!(from = %original_uri, to = %target, "Rewrote upstream URI");

    let mut ctx = ProxyContext::new(
        ProxyRequest {
            method: parts.method,
            uri: target,
            version: parts.version,
            headers: parts.headers,
            body,
        },
        original_uri,
        params,
        route.origin().clone(),
        upstreams.body_limit,
    );

    if let Some(response) = run_chain(route, route.request_transformers(), &mut ctx, Phase::Request).await? {
        return Ok(response);
    }

    let result = call_upstream(route, &mut ctx, &upstreams).await;
    match result {
        Ok(mut response) => {
            strip_hop_by_hop(&mut response.headers);
            ctx.response = Some(response);
        }
        Err(GuardError::Upstream(e)) => return Err(e.into()),
        Err(rejection) => {
            tracing::warn!(route = %route.path(), error = %rejection, "Upstream call rejected by guard");
            return rejection_response(&rejection).ok_or(ProxyError::MissingResponse);
        }
    }

    if let Some(response) = run_chain(route, route.response_transformers(), &mut ctx, Phase::Response).await? {
        return Ok(response);
    }

    ctx.response.take().ok_or(ProxyError::MissingResponse)
}

/// Run `chain` in order; `Some` is a terminal response.
async fn run_chain(
    route: &Route,
    chain: &[Arc<dyn Transformer>],
    ctx: &mut ProxyContext,
    phase: Phase,
) -> Result<Option<ProxyResponse>, ProxyError> {
    for transformer in chain {
        match transformer.apply(ctx).await? {
            Flow::Continue => {}
            Flow::Respond(response) => {
                tracing::debug!(
                    route = %route.path(),
                    transformer = transformer.name(),
                    phase = %phase,
                    status = %response.status,
                    "Transformer short-circuited"
                );
                metrics::record_short_circuit(transformer.name(), phase);
                return Ok(Some(response));
            }
        }
    }
    Ok(None)
}

async fn call_upstream(route: &Route, ctx: &mut ProxyContext, upstreams: &Upstreams<'_>) -> GuardResult {
    let origin = route.origin();
    let client = upstreams.registry.client_for(origin)?;
    let authority = upstream_authority(origin, upstreams.discovery)?;
    let request = build_upstream_request(ctx, &authority)
        .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;

    tracing::debug!(origin = %origin, uri = %request.uri(), "Forwarding upstream");

    let send = client.send(request);
    let call: BoxFuture<'static, GuardResult> = Box::pin(async move {
        let response = send.await?;
        Ok::<_, GuardError>(ProxyResponse::from_upstream(response))
    });

    let guard = match route.guard() {
        Some(lazy) => lazy.get_or_build(ctx),
        None => return call.await,
    };
    guard.call(call).await
}
