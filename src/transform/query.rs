//! Query parameter transformers.
//!
//! These run after the inbound query was merged into the upstream URI, so
//! they see (and may edit) every parameter that will be sent upstream.

use futures_util::future::BoxFuture;

use crate::error::ProxyError;
use crate::rewrite::query::with_query;
use crate::transform::{Flow, ProxyContext, Transformer};

/// Appends values for a key, whether or not it is already present.
#[derive(Debug, Clone)]
pub struct AddQueryParam {
    key: String,
    values: Vec<String>,
}

impl AddQueryParam {
    pub fn new(key: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl Transformer for AddQueryParam {
    fn apply<'a>(&'a self, ctx: &'a mut ProxyContext) -> BoxFuture<'a, Result<Flow, ProxyError>> {
        Box::pin(async move {
            let (uri, ()) = with_query(&ctx.request.uri, |q| q.add(&self.key, &self.values));
            ctx.request.uri = uri;
            Ok(Flow::Continue)
        })
    }

    fn name(&self) -> &'static str {
        "add-query-param"
    }
}

/// Removes every value of each key.
#[derive(Debug, Clone)]
pub struct RemoveQueryParams {
    keys: Vec<String>,
}

impl RemoveQueryParams {
    pub fn new(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl Transformer for RemoveQueryParams {
    fn apply<'a>(&'a self, ctx: &'a mut ProxyContext) -> BoxFuture<'a, Result<Flow, ProxyError>> {
        Box::pin(async move {
            let (uri, ()) = with_query(&ctx.request.uri, |q| {
                for key in &self.keys {
                    q.remove(key);
                }
            });
            ctx.request.uri = uri;
            Ok(Flow::Continue)
        })
    }

    fn name(&self) -> &'static str {
        "remove-query-params"
    }
}

/// Replaces the values of a key that is already present; never adds it.
#[derive(Debug, Clone)]
pub struct ReplaceQueryParam {
    key: String,
    values: Vec<String>,
}

impl ReplaceQueryParam {
    pub fn new(key: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl Transformer for ReplaceQueryParam {
    fn apply<'a>(&'a self, ctx: &'a mut ProxyContext) -> BoxFuture<'a, Result<Flow, ProxyError>> {
        Box::pin(async move {
            let (uri, replaced) =
                with_query(&ctx.request.uri, |q| q.replace(&self.key, &self.values));
            if replaced {
                ctx.request.uri = uri;
            }
            Ok(Flow::Continue)
        })
    }

    fn name(&self) -> &'static str {
        "replace-query-param"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::context;
    use axum::http::Method;

    #[tokio::test]
    async fn test_add_then_remove_is_a_no_op() {
        let mut ctx = context(Method::GET, "/backend?b=2&a=%2F");
        AddQueryParam::new("tmp", ["x y"]).apply(&mut ctx).await.unwrap();
        assert_eq!(ctx.request.uri, "/backend?b=2&a=%2F&tmp=x%20y");
        RemoveQueryParams::new(["tmp"]).apply(&mut ctx).await.unwrap();
        assert_eq!(ctx.request.uri, "/backend?b=2&a=%2F");
    }

    #[tokio::test]
    async fn test_replace_absent_key_leaves_uri() {
        let mut ctx = context(Method::GET, "/backend?a=1");
        ReplaceQueryParam::new("k", ["v"]).apply(&mut ctx).await.unwrap();
        assert_eq!(ctx.request.uri, "/backend?a=1");

        ReplaceQueryParam::new("a", ["9", "8"]).apply(&mut ctx).await.unwrap();
        assert_eq!(ctx.request.uri, "/backend?a=9&a=8");
    }

    #[tokio::test]
    async fn test_remove_last_key_drops_question_mark() {
        let mut ctx = context(Method::GET, "/backend?a=1&a=2");
        RemoveQueryParams::new(["a", "missing"]).apply(&mut ctx).await.unwrap();
        assert_eq!(ctx.request.uri, "/backend");
    }
}
