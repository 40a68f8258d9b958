//! Upstream URI templates.
//!
//! An origin path containing `{var}` placeholders is expanded per request.
//! Variables come from, in increasing precedence:
//! - `__REQUEST_URI__`: inbound path and query as received
//! - `__REQUEST_URI_AFTER_PREFIX__`: PREFIX routes only, the inbound URI
//!   from the position of the route's `*`
//! - placeholder values of a PARAMS route pattern
//! - parameters bound by the path matcher

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ProxyError;
use crate::rewrite::query::{merge_inbound_query, split_uri};
use crate::routing::{extract_segment_values, PathMode, Route};

pub const REQUEST_URI: &str = "__REQUEST_URI__";
pub const REQUEST_URI_AFTER_PREFIX: &str = "__REQUEST_URI_AFTER_PREFIX__";

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([^{}]+)\}").expect("static variable regex"))
}

/// Substitute every `{name}` in `template`; an unknown name is an error.
pub fn expand(template: &str, vars: &HashMap<String, String>) -> Result<String, ProxyError> {
    let mut out = String::with_capacity(template.len());
    let mut last_end = 0;
    for caps in variable_pattern().captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = vars
            .get(name.as_str())
            .ok_or_else(|| ProxyError::UnresolvedVariable {
                name: name.as_str().to_string(),
                template: template.to_string(),
            })?;
        out.push_str(&template[last_end..whole.start()]);
        out.push_str(value);
        last_end = whole.end();
    }
    out.push_str(&template[last_end..]);
    Ok(out)
}

/// Variables available to the origin template of `route`.
pub fn template_variables(
    route: &Route,
    inbound_uri: &str,
    params: &HashMap<String, String>,
) -> Result<HashMap<String, String>, ProxyError> {
    let mut vars = HashMap::new();
    vars.insert(REQUEST_URI.to_string(), inbound_uri.to_string());

    match route.mode() {
        PathMode::Prefix => {
            // the trailing `*` is the marker; earlier ones are literal
            let start = route
                .path()
                .strip_suffix('*')
                .map_or(route.path().len(), str::len)
                .min(inbound_uri.len());
            let rest = inbound_uri.get(start..).unwrap_or_default();
            vars.insert(REQUEST_URI_AFTER_PREFIX.to_string(), rest.to_string());
        }
        PathMode::Params => {
            let (path, _) = split_uri(inbound_uri);
            vars.extend(extract_segment_values(route.path(), path)?);
        }
        PathMode::Fixed | PathMode::Regexp => {}
    }

    vars.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(vars)
}

/// Resolve the upstream path and query for a matched request.
///
/// The inbound query is appended unless the template already carries it
/// through `{__REQUEST_URI__}` or `{__REQUEST_URI_AFTER_PREFIX__}`.
pub fn rewrite_target(
    route: &Route,
    inbound_uri: &str,
    params: &HashMap<String, String>,
) -> Result<String, ProxyError> {
    let template = route.origin().path();
    let (_, inbound_query) = split_uri(inbound_uri);

    if !template.contains('{') {
        return Ok(merge_inbound_query(template, inbound_query));
    }

    let vars = template_variables(route, inbound_uri, params)?;
    let expanded = expand(template, &vars)?;

    let carries_query = [REQUEST_URI, REQUEST_URI_AFTER_PREFIX]
        .iter()
        .any(|var| template.contains(&format!("{{{var}}}")));
    if carries_query {
        Ok(expanded)
    } else {
        Ok(merge_inbound_query(&expanded, inbound_query))
    }
}
