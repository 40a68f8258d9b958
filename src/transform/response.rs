//! Terminal responses produced by transformers.

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};

use crate::transform::{Flow, ProxyResponse};

/// Builder for plain-text responses that end the pipeline.
#[derive(Debug)]
pub struct TerminalResponse {
    status: StatusCode,
    message: Option<String>,
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl TerminalResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            message: None,
            headers: Vec::new(),
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }

    pub fn build(self) -> ProxyResponse {
        if !(self.status.is_client_error() || self.status.is_server_error()) {
            tracing::warn!(status = %self.status, "Terminal response built with a non-error status");
        }

        let mut response = ProxyResponse::new(self.status);
        response.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        if let Some(message) = self.message {
            response
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(message.len()));
            response.body = Body::from(message);
        } else {
            response
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(0usize));
        }
        for (name, value) in self.headers {
            response.headers.insert(name, value);
        }
        response
    }

    /// Shorthand for `Flow::Respond(self.build())`.
    pub fn respond(self) -> Flow {
        Flow::Respond(self.build())
    }
}
