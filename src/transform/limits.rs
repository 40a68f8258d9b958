//! Content-length guard.

use axum::http::{header, StatusCode};
use futures_util::future::BoxFuture;

use crate::error::ProxyError;
use crate::transform::{Flow, Phase, ProxyContext, TerminalResponse, Transformer};

/// Rejects messages whose declared `Content-Length` exceeds a limit.
///
/// Messages without the header pass; the body itself is not inspected.
#[derive(Debug, Clone, Copy)]
pub struct ContentLengthLimit {
    phase: Phase,
    limit: u64,
}

impl ContentLengthLimit {
    pub fn new(phase: Phase, limit: u64) -> Self {
        Self { phase, limit }
    }
}

impl Transformer for ContentLengthLimit {
    fn apply<'a>(&'a self, ctx: &'a mut ProxyContext) -> BoxFuture<'a, Result<Flow, ProxyError>> {
        Box::pin(async move {
            let declared = ctx
                .headers(self.phase)?
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());

            match declared {
                Some(length) if length > self.limit => {
                    tracing::info!(
                        phase = %self.phase,
                        length,
                        limit = self.limit,
                        "Content length limit exceeded"
                    );
                    Ok(TerminalResponse::new(StatusCode::PAYLOAD_TOO_LARGE)
                        .message(format!(
                            "{} content length {} exceeds the limit of {}",
                            self.phase, length, self.limit
                        ))
                        .respond())
                }
                _ => Ok(Flow::Continue),
            }
        })
    }

    fn name(&self) -> &'static str {
        "content-length-limit"
    }
}
