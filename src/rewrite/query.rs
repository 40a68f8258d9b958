//! Raw query handling for upstream URIs.
//!
//! Pairs are kept exactly as they appear on the wire (already
//! percent-encoded); only keys and values supplied by transformers go
//! through [`encode_component`].

use std::fmt;

/// Percent-encode a key or value; space becomes `%20`, never `+`.
pub fn encode_component(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Encode the characters not allowed in a query component, leaving valid
/// `%XX` escapes untouched so already-encoded input is not encoded twice.
pub fn encode_raw_component(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let is_escape = b == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit();
        if is_escape || is_query_safe(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
        i += 1;
    }
    out
}

fn is_query_safe(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'-' | b'.' | b'_' | b'~' | b'!' | b'$' | b'\'' | b'(' | b')' | b'*' | b'+' | b','
                | b';' | b':' | b'@' | b'/' | b'?'
        )
}

/// Ordered, duplicate-preserving list of raw query pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, Option<String>)>,
}

impl Query {
    /// Parse a raw query string (without the leading `?`).
    pub fn parse(raw: &str) -> Self {
        let pairs = raw
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (k.to_string(), Some(v.to_string())),
                None => (pair.to_string(), None),
            })
            .collect();
        Self { pairs }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn contains_key(&self, raw_key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == raw_key)
    }

    /// Raw values for `raw_key`, in order. Valueless keys yield `""`.
    pub fn values<'a>(&'a self, raw_key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == raw_key)
            .map(|(_, v)| v.as_deref().unwrap_or(""))
    }

    /// Append an already-encoded pair, encoding only what the query grammar forbids.
    pub fn append_raw(&mut self, raw_key: &str, raw_value: Option<&str>) {
        self.pairs.push((
            encode_raw_component(raw_key),
            raw_value.map(encode_raw_component),
        ));
    }

    /// Append one pair per value (a single empty value when `values` is empty).
    pub fn add<I, S>(&mut self, key: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let key = encode_component(key);
        let mut added = false;
        for value in values {
            self.pairs
                .push((key.clone(), Some(encode_component(value.as_ref()))));
            added = true;
        }
        if !added {
            self.pairs.push((key, Some(String::new())));
        }
    }

    /// Remove every occurrence of `key`.
    pub fn remove(&mut self, key: &str) {
        let key = encode_component(key);
        self.pairs.retain(|(k, _)| *k != key);
    }

    /// Replace every occurrence of `key` by `values`, placed where the key first appeared.
    ///
    /// Returns `false` and leaves the query untouched when the key is absent.
    pub fn replace<I, S>(&mut self, key: &str, values: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let key = encode_component(key);
        let Some(position) = self.pairs.iter().position(|(k, _)| *k == key) else {
            return false;
        };

        let mut replacement: Vec<(String, Option<String>)> = values
            .into_iter()
            .map(|v| (key.clone(), Some(encode_component(v.as_ref()))))
            .collect();
        if replacement.is_empty() {
            replacement.push((key.clone(), Some(String::new())));
        }

        self.pairs.retain(|(k, _)| *k != key);
        self.pairs.splice(position..position, replacement);
        true
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            f.write_str(k)?;
            if let Some(v) = v {
                write!(f, "={v}")?;
            }
        }
        Ok(())
    }
}

/// Split a path-and-query string into its path and raw query.
pub fn split_uri(uri: &str) -> (&str, Option<&str>) {
    match uri.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (uri, None),
    }
}

/// Join a path with a query, dropping the `?` for an empty query.
pub fn join_uri(path: &str, query: &Query) -> String {
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    }
}

/// Apply `f` to the query of `uri` and return the rebuilt URI.
pub fn with_query<F, R>(uri: &str, f: F) -> (String, R)
where
    F: FnOnce(&mut Query) -> R,
{
    let (path, raw) = split_uri(uri);
    let mut query = raw.map(Query::parse).unwrap_or_default();
    let result = f(&mut query);
    (join_uri(path, &query), result)
}

/// Append the inbound raw query onto the resolved upstream URI.
///
/// Repeated keys are preserved as repeated pairs and order is kept.
pub fn merge_inbound_query(upstream_uri: &str, inbound_query: Option<&str>) -> String {
    let inbound = match inbound_query {
        Some(q) if !q.is_empty() => q,
        _ => return upstream_uri.to_string(),
    };
    let (uri, ()) = with_query(upstream_uri, |query| {
        for pair in inbound.split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some((k, v)) => query.append_raw(k, Some(v)),
                None => query.append_raw(pair, None),
            }
        }
    });
    uri
}
