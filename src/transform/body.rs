//! Body replacement.

use std::sync::Arc;

use axum::body::Bytes;
use futures_util::future::BoxFuture;

use crate::error::ProxyError;
use crate::transform::{Flow, Phase, ProxyContext, Transformer};

type BodyMapper = Arc<dyn Fn(Bytes) -> Bytes + Send + Sync>;

#[derive(Clone)]
enum Replacement {
    Static(Bytes),
    Computed(BodyMapper),
}

/// Replaces a request or response body.
///
/// A static replacement never reads the original body; a computed one
/// buffers it first.
#[derive(Clone)]
pub struct ReplaceBody {
    phase: Phase,
    replacement: Replacement,
}

impl ReplaceBody {
    pub fn with_static(phase: Phase, body: impl Into<Bytes>) -> Self {
        Self {
            phase,
            replacement: Replacement::Static(body.into()),
        }
    }

    pub fn computed<F>(phase: Phase, f: F) -> Self
    where
        F: Fn(Bytes) -> Bytes + Send + Sync + 'static,
    {
        Self {
            phase,
            replacement: Replacement::Computed(Arc::new(f)),
        }
    }
}

impl Transformer for ReplaceBody {
    fn apply<'a>(&'a self, ctx: &'a mut ProxyContext) -> BoxFuture<'a, Result<Flow, ProxyError>> {
        Box::pin(async move {
            let bytes = match &self.replacement {
                Replacement::Static(bytes) => bytes.clone(),
                Replacement::Computed(f) => {
                    let original = ctx.take_body(self.phase).await?;
                    f(original)
                }
            };
            ctx.set_body(self.phase, bytes)?;
            Ok(Flow::Continue)
        })
    }

    fn name(&self) -> &'static str {
        "replace-body"
    }
}
