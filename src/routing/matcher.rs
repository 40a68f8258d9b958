//! Route predicates and path matching.
//!
//! # Responsibilities
//! - Match the request path according to the route's `PathMode`
//! - Evaluate request predicates (host, header, method, query)
//! - Combine predicates with AND semantics
//!
//! # Design Decisions
//! - Host matching is case-insensitive (per HTTP spec)
//! - Path matching is case-sensitive
//! - Path patterns are compiled once when the route table is built

use std::collections::HashMap;
use std::fmt;

use axum::body::Body;
use axum::http::{Method, Request};
use regex::Regex;

use crate::routing::route::PathMode;
use crate::routing::segment::replace_segments_with_regex;
use crate::routing::RouteTableError;

/// Trait for matching requests against conditions.
pub trait Predicate: Send + Sync + fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &Request<Body>) -> bool;
}

/// Matches the Host header.
#[derive(Debug, Clone)]
pub struct HostPredicate {
    expected_host: String,
}

impl HostPredicate {
    /// The host is normalized to lowercase for case-insensitive matching.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }
}

impl Predicate for HostPredicate {
    fn matches(&self, req: &Request<Body>) -> bool {
        req.headers()
            .get("host")
            .and_then(|h| h.to_str().ok())
            .map(|h| h.to_lowercase() == self.expected_host)
            .unwrap_or(false)
    }
}

/// Matches a header by presence, or by exact value.
#[derive(Debug, Clone)]
pub struct HeaderPredicate {
    name: String,
    value: Option<String>,
}

impl HeaderPredicate {
    pub fn present(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn equals(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

impl Predicate for HeaderPredicate {
    fn matches(&self, req: &Request<Body>) -> bool {
        let mut values = req.headers().get_all(self.name.as_str()).iter();
        match &self.value {
            None => values.next().is_some(),
            Some(expected) => values.any(|v| v.to_str().map(|v| v == expected).unwrap_or(false)),
        }
    }
}

/// Matches one of a set of HTTP methods.
#[derive(Debug, Clone)]
pub struct MethodPredicate {
    methods: Vec<Method>,
}

impl MethodPredicate {
    pub fn new(methods: impl IntoIterator<Item = Method>) -> Self {
        Self {
            methods: methods.into_iter().collect(),
        }
    }
}

impl Predicate for MethodPredicate {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.methods.contains(req.method())
    }
}

/// Matches a raw query parameter by presence, or by exact raw value.
#[derive(Debug, Clone)]
pub struct QueryPredicate {
    name: String,
    value: Option<String>,
}

impl QueryPredicate {
    pub fn present(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn equals(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

impl Predicate for QueryPredicate {
    fn matches(&self, req: &Request<Body>) -> bool {
        let Some(query) = req.uri().query() else {
            return false;
        };
        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
            .any(|(k, v)| k == self.name && self.value.as_deref().map_or(true, |e| e == v))
    }
}

/// Combines multiple predicates with AND semantics.
#[derive(Debug)]
pub struct AndPredicate {
    predicates: Vec<Box<dyn Predicate>>,
}

impl AndPredicate {
    pub fn new(predicates: Vec<Box<dyn Predicate>>) -> Self {
        Self { predicates }
    }
}

impl Predicate for AndPredicate {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.predicates.iter().all(|p| p.matches(req))
    }
}

/// Adapts a closure into a [`Predicate`].
pub struct FnPredicate<F> {
    name: &'static str,
    f: F,
}

impl<F> fmt::Debug for FnPredicate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPredicate").field("name", &self.name).finish()
    }
}

impl<F> Predicate for FnPredicate<F>
where
    F: Fn(&Request<Body>) -> bool + Send + Sync,
{
    fn matches(&self, req: &Request<Body>) -> bool {
        (self.f)(req)
    }
}

/// Wrap `f` as a named predicate.
pub fn predicate_fn<F>(name: &'static str, f: F) -> FnPredicate<F>
where
    F: Fn(&Request<Body>) -> bool + Send + Sync,
{
    FnPredicate { name, f }
}

/// One literal or parameter segment of a FIXED path.
#[derive(Debug, Clone)]
pub(crate) enum FixedSegment {
    Literal(String),
    Param(String),
}

/// Compiled path pattern for a single route.
#[derive(Debug, Clone)]
pub(crate) enum PathMatcher {
    Fixed {
        segments: Vec<FixedSegment>,
    },
    Prefix {
        prefix: String,
    },
    Params {
        regex: Regex,
    },
    Regexp {
        regex: Regex,
    },
}

impl PathMatcher {
    pub(crate) fn compile(pattern: &str, mode: PathMode) -> Result<Self, RouteTableError> {
        let invalid = |reason: String| RouteTableError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        match mode {
            PathMode::Fixed => {
                if !pattern.starts_with('/') {
                    return Err(invalid("path must start with '/'".into()));
                }
                let segments = pattern
                    .trim_end_matches('/')
                    .split('/')
                    .skip(1)
                    .map(|s| match s.strip_prefix(':') {
                        Some(name) if !name.is_empty() => FixedSegment::Param(name.to_string()),
                        _ => FixedSegment::Literal(s.to_string()),
                    })
                    .collect();
                Ok(PathMatcher::Fixed { segments })
            }
            PathMode::Prefix => match pattern.strip_suffix('*') {
                Some(prefix) => Ok(PathMatcher::Prefix {
                    prefix: prefix.to_string(),
                }),
                None => Err(invalid("prefix path must end with '*'".into())),
            },
            PathMode::Params => {
                let source = format!("^(?:{})$", replace_segments_with_regex(pattern));
                Regex::new(&source)
                    .map(|regex| PathMatcher::Params { regex })
                    .map_err(|e| invalid(e.to_string()))
            }
            PathMode::Regexp => Regex::new(&format!("^(?:{pattern})$"))
                .map(|regex| PathMatcher::Regexp { regex })
                .map_err(|e| invalid(e.to_string())),
        }
    }

    /// Match `path`, returning the path parameters bound by the match.
    pub(crate) fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        match self {
            PathMatcher::Fixed { segments } => {
                // one trailing slash is tolerated either way
                let normalized = match path.strip_suffix('/') {
                    Some(p) if !p.is_empty() => p,
                    _ => path,
                };
                if segments.is_empty() {
                    return (normalized == "/").then(HashMap::new);
                }
                let actual: Vec<&str> = normalized.split('/').skip(1).collect();
                if actual.len() != segments.len() {
                    return None;
                }
                let mut params = HashMap::new();
                for (segment, value) in segments.iter().zip(actual) {
                    match segment {
                        FixedSegment::Literal(l) if l == value => {}
                        FixedSegment::Param(name) if !value.is_empty() => {
                            params.insert(name.clone(), value.to_string());
                        }
                        _ => return None,
                    }
                }
                Some(params)
            }
            PathMatcher::Prefix { prefix } => {
                let bare = prefix.strip_suffix('/').filter(|b| !b.is_empty());
                (path.starts_with(prefix.as_str()) || bare == Some(path)).then(HashMap::new)
            }
            PathMatcher::Params { regex } => regex.is_match(path).then(HashMap::new),
            PathMatcher::Regexp { regex } => {
                let caps = regex.captures(path)?;
                Some(
                    regex
                        .capture_names()
                        .flatten()
                        .filter_map(|name| {
                            caps.name(name)
                                .map(|m| (name.to_string(), m.as_str().to_string()))
                        })
                        .collect(),
                )
            }
        }
    }
}
