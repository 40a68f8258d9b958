//! Route table and request lookup.
//!
//! # Responsibilities
//! - Compile route patterns once at build time
//! - Reject conflicting origin identifiers and bad templates
//! - Look up the first route whose path and predicates match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Routes are an ordered list, not a map: several routes may share a path
//! - O(n) scan in declaration order, first full match wins
//! - Explicit no-match rather than silent default

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;

use crate::routing::matcher::PathMatcher;
use crate::routing::origin::Origin;
use crate::routing::route::{PathMode, Route};
use crate::routing::segment::{capturing_regex, segment_names};
use crate::routing::RouteTableError;

struct CompiledRoute {
    route: Route,
    matcher: PathMatcher,
}

/// A matched route and the path parameters its pattern bound.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: HashMap<String, String>,
}

/// Ordered, immutable routing table.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes().collect::<Vec<_>>())
            .finish()
    }
}

impl RouteTable {
    /// Compile `routes` into a table, failing on the first configuration error.
    pub fn new(routes: impl IntoIterator<Item = Route>) -> Result<Self, RouteTableError> {
        let mut origins: HashMap<String, Arc<Origin>> = HashMap::new();
        let mut compiled = Vec::new();

        for mut route in routes {
            let matcher = PathMatcher::compile(route.path(), route.mode())?;
            if route.mode() == PathMode::Params {
                segment_names(route.path())?;
                // rewriting extracts values with this regex on every request
                capturing_regex(route.path())?;
            }
            segment_names(route.origin().path())?;

            let origin = route.origin().clone();
            match origins.get(origin.identifier()) {
                Some(existing) if existing.uri() != origin.uri() => {
                    return Err(RouteTableError::ConflictingOrigin {
                        identifier: origin.identifier().to_string(),
                        existing: existing.uri(),
                        conflicting: origin.uri(),
                    });
                }
                Some(existing) => route.share_origin(existing.clone()),
                None => {
                    origins.insert(origin.identifier().to_string(), origin);
                }
            }

            tracing::info!(
                path = %route.path(),
                mode = ?route.mode(),
                origin = %route.origin(),
                "Route registered"
            );
            compiled.push(CompiledRoute { route, matcher });
        }

        Ok(Self { routes: compiled })
    }

    /// Find the first route whose pattern matches the path and whose predicates all pass.
    pub fn match_request(&self, req: &Request<Body>) -> Option<RouteMatch<'_>> {
        let path = req.uri().path();
        self.routes.iter().find_map(|compiled| {
            let params = compiled.matcher.matches(path)?;
            if !compiled.route.accepts(req) {
                tracing::trace!(path = %path, route = %compiled.route.path(), "Route predicates rejected request");
                return None;
            }
            Some(RouteMatch {
                route: &compiled.route,
                params,
            })
        })
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter().map(|c| &c.route)
    }

    /// Distinct origins referenced by the table.
    pub fn origins(&self) -> Vec<Arc<Origin>> {
        let mut seen: Vec<Arc<Origin>> = Vec::new();
        for route in self.routes() {
            if !seen.iter().any(|o| Arc::ptr_eq(o, route.origin())) {
                seen.push(route.origin().clone());
            }
        }
        seen
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::matcher::{predicate_fn, HeaderPredicate};

    fn origin(id: &str, spec: &str) -> Origin {
        Origin::of(id, spec).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_routes_sharing_a_path_are_tried_in_order() {
        let table = RouteTable::new([
            Route::new("/hello", origin("a", "http://a:1/"), PathMode::Fixed)
                .add_predicate(HeaderPredicate::equals("x-variant", "a")),
            Route::new("/hello", origin("b", "http://b:1/"), PathMode::Fixed)
                .add_predicate(HeaderPredicate::equals("x-variant", "b")),
        ])
        .unwrap();

        let req = Request::builder()
            .uri("/hello")
            .header("x-variant", "b")
            .body(Body::empty())
            .unwrap();
        let matched = table.match_request(&req).unwrap();
        assert_eq!(matched.route.origin().identifier(), "b");

        let req = Request::builder()
            .uri("/hello")
            .header("x-variant", "c")
            .body(Body::empty())
            .unwrap();
        assert!(table.match_request(&req).is_none());
    }

    #[test]
    fn test_selection_is_sequential_across_patterns() {
        let table = RouteTable::new([
            Route::new("/api/*", origin("a", "http://a:1/"), PathMode::Prefix)
                .add_predicate(predicate_fn("never", |_| false)),
            Route::new("/api/{id}", origin("b", "http://b:1/"), PathMode::Params),
        ])
        .unwrap();

        let matched = table.match_request(&get("/api/7")).unwrap();
        assert_eq!(matched.route.origin().identifier(), "b");
    }

    #[test]
    fn test_no_match() {
        let table = RouteTable::new([Route::new(
            "/only",
            origin("a", "http://a:1/"),
            PathMode::Fixed,
        )])
        .unwrap();
        assert!(table.match_request(&get("/other")).is_none());
        assert!(RouteTable::default().match_request(&get("/")).is_none());
    }

    #[test]
    fn test_conflicting_origin_identifier() {
        let err = RouteTable::new([
            Route::new("/a", origin("same", "http://a:1/"), PathMode::Fixed),
            Route::new("/b", origin("same", "http://b:1/"), PathMode::Fixed),
        ])
        .err()
        .unwrap();
        assert!(matches!(err, RouteTableError::ConflictingOrigin { .. }));
    }

    #[test]
    fn test_same_origin_identifier_is_shared() {
        let table = RouteTable::new([
            Route::new("/a", origin("same", "http://A:1/"), PathMode::Fixed),
            Route::new("/b", origin("same", "http://a:1/"), PathMode::Fixed),
        ])
        .unwrap();
        assert_eq!(table.origins().len(), 1);
    }

    #[test]
    fn test_duplicate_segment_names_rejected() {
        let err = RouteTable::new([Route::new(
            "/users/{id}/orders/{id}",
            origin("a", "http://a:1/"),
            PathMode::Params,
        )])
        .err()
        .unwrap();
        assert!(err.to_string().contains("Duplicate segment"));

        let err = RouteTable::new([Route::new(
            "/users/{id}",
            origin("a", "http://a:1/x/{id}/{id}"),
            PathMode::Params,
        )])
        .err()
        .unwrap();
        assert!(err.to_string().contains("Duplicate segment"));
    }

    #[test]
    fn test_counted_repetition_placeholder_builds() {
        let table = RouteTable::new([Route::new(
            "/users/{<id>\\d{3,5}}",
            origin("a", "http://a:1/u/{id}"),
            PathMode::Params,
        )])
        .unwrap();
        assert!(table.match_request(&get("/users/1234")).is_some());
        assert!(table.match_request(&get("/users/12")).is_none());
    }

    #[test]
    fn test_invalid_placeholder_pattern_fails_build() {
        let err = RouteTable::new([Route::new(
            "/items/{<id>[0-9}",
            origin("a", "http://a:1/"),
            PathMode::Params,
        )])
        .unwrap_err();
        assert!(matches!(err, RouteTableError::InvalidPattern { .. }));
    }

    #[test]
    fn test_debug_lists_routes() {
        let table = RouteTable::new([Route::new(
            "/only",
            origin("a", "http://a:1/"),
            PathMode::Fixed,
        )])
        .unwrap();
        let debug = format!("{table:?}");
        assert!(debug.starts_with("RouteTable"));
        assert!(debug.contains("/only"));
    }
}
