//! HTTP method rewrite.

use axum::http::Method;
use futures_util::future::BoxFuture;

use crate::error::ProxyError;
use crate::transform::{Flow, ProxyContext, Transformer};

/// Replaces the method of the upstream request.
#[derive(Debug, Clone)]
pub struct ModifyMethod {
    method: Method,
}

impl ModifyMethod {
    pub fn new(method: Method) -> Self {
        Self { method }
    }
}

impl Transformer for ModifyMethod {
    fn apply<'a>(&'a self, ctx: &'a mut ProxyContext) -> BoxFuture<'a, Result<Flow, ProxyError>> {
        Box::pin(async move {
            ctx.request.method = self.method.clone();
            Ok(Flow::Continue)
        })
    }

    fn name(&self) -> &'static str {
        "modify-method"
    }
}
