//! Upstream origin specification parsing.
//!
//! # Responsibilities
//! - Parse an origin spec string into scheme, host, port and path
//! - Validate port range and separators
//! - Hold the lazily attached upstream client for this origin
//!
//! # Design Decisions
//! - Host is lower-cased so `API.example` and `api.example` compare equal
//! - Default port is 8080 for every scheme, https included
//! - Equality and hashing go through the canonical URI only

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use thiserror::Error;

use crate::upstream::client::UpstreamClient;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_PATH: &str = "/";
const SCHEME_SEPARATOR: &str = "://";
const PORT_SEPARATOR: char = ':';

/// Errors raised while parsing an origin specification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OriginError {
    #[error("Unknown scheme: {0}")]
    UnknownScheme(String),

    #[error("Port separator ':' present but port number missing")]
    MissingPort,

    #[error("Port number out of range (0-65535): {0}")]
    PortOutOfRange(i64),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),

    #[error("Service origin cannot specify a port")]
    ServicePortNotAllowed,

    #[error("Origin '{0}' already has an upstream client assigned")]
    ClientAlreadyAssigned(String),
}

/// Upstream scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
    /// Logical service name, resolved through service discovery.
    Service,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::Service => "service",
        }
    }
}

impl FromStr for Scheme {
    type Err = OriginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            "service" => Ok(Scheme::Service),
            other => Err(OriginError::UnknownScheme(other.to_string())),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved upstream target.
pub struct Origin {
    identifier: String,
    scheme: Scheme,
    host: String,
    port: u16,
    path: String,
    client: OnceLock<Arc<dyn UpstreamClient>>,
}

impl Origin {
    /// Parse `spec` into an origin registered under `identifier`.
    ///
    /// A blank spec yields `http://localhost:8080/`.
    pub fn of(identifier: impl Into<String>, spec: &str) -> Result<Self, OriginError> {
        let identifier = identifier.into();
        let spec = spec.trim();
        if spec.is_empty() {
            return Ok(Self::new(
                identifier,
                Scheme::Http,
                DEFAULT_HOST.to_string(),
                DEFAULT_PORT,
                DEFAULT_PATH.to_string(),
            ));
        }

        let (scheme, remaining) = match spec.split_once(SCHEME_SEPARATOR) {
            Some((scheme, rest)) => (scheme.parse::<Scheme>()?, rest),
            None => (Scheme::Http, spec),
        };

        let (host_port, path) = match remaining.find('/') {
            Some(idx) => (&remaining[..idx], &remaining[idx..]),
            None => (remaining, DEFAULT_PATH),
        };

        let (host, port) = match host_port.rsplit_once(PORT_SEPARATOR) {
            Some((host, port)) => (host, Some(parse_port(port)?)),
            None => (host_port, None),
        };

        if scheme == Scheme::Service && port.is_some() {
            return Err(OriginError::ServicePortNotAllowed);
        }

        let host = host.trim();
        let host = if host.is_empty() {
            DEFAULT_HOST.to_string()
        } else {
            host.to_lowercase()
        };

        Ok(Self::new(
            identifier,
            scheme,
            host,
            port.unwrap_or(DEFAULT_PORT),
            path.to_string(),
        ))
    }

    fn new(identifier: String, scheme: Scheme, host: String, port: u16, path: String) -> Self {
        Self {
            identifier,
            scheme,
            host,
            port,
            path,
            client: OnceLock::new(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path (and optional query) of the origin, possibly a rewrite template.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Canonical `scheme://host:port/path` form.
    pub fn uri(&self) -> String {
        format!(
            "{}{}{}{}{}{}",
            self.scheme, SCHEME_SEPARATOR, self.host, PORT_SEPARATOR, self.port, self.path
        )
    }

    pub fn supports_tls(&self) -> bool {
        self.scheme == Scheme::Https
    }

    /// The bound upstream client, if one was attached already.
    pub fn client(&self) -> Option<&Arc<dyn UpstreamClient>> {
        self.client.get()
    }

    /// Attach the upstream client for this origin.
    ///
    /// Binding the same instance twice is accepted; binding a different one is not.
    pub fn bind_client(&self, client: Arc<dyn UpstreamClient>) -> Result<(), OriginError> {
        match self.client.set(client.clone()) {
            Ok(()) => Ok(()),
            Err(_) => {
                let existing = self.client.get().map(Arc::as_ptr).map(|p| p as *const ());
                if existing == Some(Arc::as_ptr(&client) as *const ()) {
                    Ok(())
                } else {
                    Err(OriginError::ClientAlreadyAssigned(self.identifier.clone()))
                }
            }
        }
    }
}

fn parse_port(port: &str) -> Result<u16, OriginError> {
    if port.is_empty() {
        return Err(OriginError::MissingPort);
    }
    let value: i64 = port
        .trim()
        .parse()
        .map_err(|_| OriginError::InvalidPort(port.to_string()))?;
    u16::try_from(value).map_err(|_| OriginError::PortOutOfRange(value))
}

impl PartialEq for Origin {
    fn eq(&self, other: &Self) -> bool {
        self.uri() == other.uri()
    }
}

impl Eq for Origin {}

impl Hash for Origin {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uri().hash(state);
    }
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Origin")
            .field("identifier", &self.identifier)
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("path", &self.path)
            .field("client_bound", &self.client.get().is_some())
            .finish()
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.identifier, self.uri())
    }
}
