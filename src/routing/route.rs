//! Route definition.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use serde::{Deserialize, Serialize};

use crate::resilience::guard::LazyGuard;
use crate::routing::matcher::Predicate;
use crate::routing::origin::Origin;
use crate::transform::Transformer;

/// How a route's path pattern is matched against inbound paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathMode {
    /// Exact path, `:name` segments bind one path segment.
    Fixed,
    /// Pattern ends in `*`; matches everything below the prefix.
    Prefix,
    /// Pattern holds `{name}` / `{<name>regex}` placeholders.
    Params,
    /// Pattern is a regular expression; named groups become path params.
    Regexp,
}

impl FromStr for PathMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(PathMode::Fixed),
            "prefix" => Ok(PathMode::Prefix),
            "params" => Ok(PathMode::Params),
            "regexp" => Ok(PathMode::Regexp),
            other => Err(format!("unknown path mode '{other}'")),
        }
    }
}

/// A single route: path pattern, origin and the transformers around the upstream call.
pub struct Route {
    path: String,
    mode: PathMode,
    origin: Arc<Origin>,
    predicates: Vec<Arc<dyn Predicate>>,
    request_transformers: Vec<Arc<dyn Transformer>>,
    response_transformers: Vec<Arc<dyn Transformer>>,
    guard: Option<LazyGuard>,
}

impl Route {
    pub fn new(path: impl Into<String>, origin: Origin, mode: PathMode) -> Self {
        Self {
            path: path.into(),
            mode,
            origin: Arc::new(origin),
            predicates: Vec::new(),
            request_transformers: Vec::new(),
            response_transformers: Vec::new(),
            guard: None,
        }
    }

    pub fn add_predicate(mut self, predicate: impl Predicate + 'static) -> Self {
        self.predicates.push(Arc::new(predicate));
        self
    }

    pub fn add_request_transformer(mut self, transformer: impl Transformer + 'static) -> Self {
        self.request_transformers.push(Arc::new(transformer));
        self
    }

    pub fn add_response_transformer(mut self, transformer: impl Transformer + 'static) -> Self {
        self.response_transformers.push(Arc::new(transformer));
        self
    }

    /// Wrap the upstream call of this route in a fault-tolerance guard.
    pub fn with_guard(mut self, guard: LazyGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> PathMode {
        self.mode
    }

    pub fn origin(&self) -> &Arc<Origin> {
        &self.origin
    }

    pub fn request_transformers(&self) -> &[Arc<dyn Transformer>] {
        &self.request_transformers
    }

    pub fn response_transformers(&self) -> &[Arc<dyn Transformer>] {
        &self.response_transformers
    }

    pub fn guard(&self) -> Option<&LazyGuard> {
        self.guard.as_ref()
    }

    /// All predicates pass (short-circuits on the first failure).
    pub fn accepts(&self, req: &Request<Body>) -> bool {
        self.predicates.iter().all(|p| p.matches(req))
    }

    pub(crate) fn share_origin(&mut self, origin: Arc<Origin>) {
        self.origin = origin;
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("origin", &self.origin)
            .field("predicates", &self.predicates)
            .field("request_transformers", &self.request_transformers.len())
            .field("response_transformers", &self.response_transformers.len())
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}
