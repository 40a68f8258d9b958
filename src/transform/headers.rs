//! Header transformers.

use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue};
use futures_util::future::BoxFuture;

use crate::error::ProxyError;
use crate::transform::{Flow, Phase, ProxyContext, Transformer};

/// Sets a header, replacing any existing values.
#[derive(Debug, Clone)]
pub struct AddHeader {
    phase: Phase,
    name: HeaderName,
    value: HeaderValue,
}

impl AddHeader {
    pub fn new(phase: Phase, name: HeaderName, value: HeaderValue) -> Self {
        Self { phase, name, value }
    }
}

impl Transformer for AddHeader {
    fn apply<'a>(&'a self, ctx: &'a mut ProxyContext) -> BoxFuture<'a, Result<Flow, ProxyError>> {
        Box::pin(async move {
            ctx.headers_mut(self.phase)?
                .insert(self.name.clone(), self.value.clone());
            Ok(Flow::Continue)
        })
    }

    fn name(&self) -> &'static str {
        "add-header"
    }
}

type HeaderMapper = Arc<dyn Fn(&HeaderValue) -> Option<HeaderValue> + Send + Sync>;

/// Rewrites a header only when it is already present.
///
/// A mapper returning `None` removes the header.
#[derive(Clone)]
pub struct ModifyHeader {
    phase: Phase,
    name: HeaderName,
    mapper: HeaderMapper,
}

impl ModifyHeader {
    pub fn to(phase: Phase, name: HeaderName, value: HeaderValue) -> Self {
        Self::with(phase, name, move |_| Some(value.clone()))
    }

    pub fn with<F>(phase: Phase, name: HeaderName, mapper: F) -> Self
    where
        F: Fn(&HeaderValue) -> Option<HeaderValue> + Send + Sync + 'static,
    {
        Self {
            phase,
            name,
            mapper: Arc::new(mapper),
        }
    }
}

impl Transformer for ModifyHeader {
    fn apply<'a>(&'a self, ctx: &'a mut ProxyContext) -> BoxFuture<'a, Result<Flow, ProxyError>> {
        Box::pin(async move {
            let headers = ctx.headers_mut(self.phase)?;
            if let Some(current) = headers.get(&self.name) {
                match (self.mapper)(current) {
                    Some(value) => {
                        headers.insert(self.name.clone(), value);
                    }
                    None => {
                        headers.remove(&self.name);
                    }
                }
            }
            Ok(Flow::Continue)
        })
    }

    fn name(&self) -> &'static str {
        "modify-header"
    }
}

/// Removes every value of the given headers.
#[derive(Debug, Clone)]
pub struct RemoveHeaders {
    phase: Phase,
    names: Vec<HeaderName>,
}

impl RemoveHeaders {
    pub fn new(phase: Phase, names: impl IntoIterator<Item = HeaderName>) -> Self {
        Self {
            phase,
            names: names.into_iter().collect(),
        }
    }
}

impl Transformer for RemoveHeaders {
    fn apply<'a>(&'a self, ctx: &'a mut ProxyContext) -> BoxFuture<'a, Result<Flow, ProxyError>> {
        Box::pin(async move {
            let headers = ctx.headers_mut(self.phase)?;
            for name in &self.names {
                headers.remove(name);
            }
            Ok(Flow::Continue)
        })
    }

    fn name(&self) -> &'static str {
        "remove-headers"
    }
}

/// Sets the `Content-Type` header.
#[derive(Debug, Clone)]
pub struct SetContentType {
    phase: Phase,
    value: HeaderValue,
}

impl SetContentType {
    pub fn new(phase: Phase, value: HeaderValue) -> Self {
        Self { phase, value }
    }
}

impl Transformer for SetContentType {
    fn apply<'a>(&'a self, ctx: &'a mut ProxyContext) -> BoxFuture<'a, Result<Flow, ProxyError>> {
        Box::pin(async move {
            ctx.headers_mut(self.phase)?
                .insert(header::CONTENT_TYPE, self.value.clone());
            Ok(Flow::Continue)
        })
    }

    fn name(&self) -> &'static str {
        "content-type"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::*;
    use axum::http::{Method, StatusCode};

    fn name(s: &'static str) -> HeaderName {
        HeaderName::from_static(s)
    }

    #[tokio::test]
    async fn test_add_header_overwrites() {
        let mut ctx = context(Method::GET, "/");
        ctx.request
            .headers
            .insert(name("x-env"), HeaderValue::from_static("dev"));

        AddHeader::new(Phase::Request, name("x-env"), HeaderValue::from_static("prod"))
            .apply(&mut ctx)
            .await
            .unwrap();
        assert_eq!(ctx.request.headers.get_all("x-env").iter().count(), 1);
        assert_eq!(ctx.request.headers["x-env"], "prod");
    }

    #[tokio::test]
    async fn test_modify_header_only_when_present() {
        let upper = ModifyHeader::with(Phase::Request, name("x-user"), |v| {
            HeaderValue::from_str(&v.to_str().ok()?.to_uppercase()).ok()
        });

        let mut ctx = context(Method::GET, "/");
        upper.apply(&mut ctx).await.unwrap();
        assert!(ctx.request.headers.get("x-user").is_none());

        ctx.request
            .headers
            .insert(name("x-user"), HeaderValue::from_static("alice"));
        upper.apply(&mut ctx).await.unwrap();
        assert_eq!(ctx.request.headers["x-user"], "ALICE");
    }

    #[tokio::test]
    async fn test_remove_and_content_type_on_response() {
        let mut ctx = with_response(context(Method::GET, "/"), StatusCode::OK, "{}");
        ctx.response
            .as_mut()
            .unwrap()
            .headers
            .insert(name("server"), HeaderValue::from_static("backend"));

        RemoveHeaders::new(Phase::Response, [name("server")])
            .apply(&mut ctx)
            .await
            .unwrap();
        SetContentType::new(Phase::Response, HeaderValue::from_static("application/json"))
            .apply(&mut ctx)
            .await
            .unwrap();

        let response = ctx.response.unwrap();
        assert!(response.headers.get("server").is_none());
        assert_eq!(response.headers[header::CONTENT_TYPE], "application/json");
    }
}
