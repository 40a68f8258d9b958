//! JSON body modifiers.
//!
//! A modifier parses the buffered body as its input shape, maps it to the
//! output shape and writes it back as `application/json`. The shapes are
//! [`Value`] (any JSON), [`JsonObject`] and [`JsonArray`]; the type aliases
//! at the bottom cover the supported combinations.

use std::marker::PhantomData;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{header, HeaderValue, StatusCode};
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ProxyError;
use crate::transform::{Flow, Phase, ProxyContext, TerminalResponse, Transformer};

pub type JsonObject = Map<String, Value>;
pub type JsonArray = Vec<Value>;

/// A JSON document shape with an "empty" value used for empty bodies.
pub trait JsonShape: DeserializeOwned + Serialize + Clone + Send + Sync + 'static {
    fn empty() -> Self;
}

impl JsonShape for Value {
    fn empty() -> Self {
        Value::Null
    }
}

impl JsonShape for JsonObject {
    fn empty() -> Self {
        Map::new()
    }
}

impl JsonShape for JsonArray {
    fn empty() -> Self {
        Vec::new()
    }
}

type Mapper<I, O> = Arc<dyn Fn(I) -> Option<O> + Send + Sync>;

enum Mapping<I, O> {
    /// `None` clears the body.
    Static(Option<O>),
    Dynamic(Mapper<I, O>),
}

/// Rewrites a JSON body from shape `I` to shape `O`.
pub struct JsonModifier<I, O> {
    phase: Phase,
    mapping: Mapping<I, O>,
    _input: PhantomData<fn() -> I>,
}

impl<I: JsonShape, O: JsonShape> JsonModifier<I, O> {
    /// Map the parsed body. Returning `None` clears the body.
    pub fn dynamic<F>(phase: Phase, mapper: F) -> Self
    where
        F: Fn(I) -> Option<O> + Send + Sync + 'static,
    {
        Self {
            phase,
            mapping: Mapping::Dynamic(Arc::new(mapper)),
            _input: PhantomData,
        }
    }

    /// Replace the body with a fixed document, without parsing the original.
    pub fn with_static(phase: Phase, value: O) -> Self {
        Self {
            phase,
            mapping: Mapping::Static(Some(value)),
            _input: PhantomData,
        }
    }

    /// Empty the body, without parsing the original.
    pub fn clear(phase: Phase) -> Self {
        Self {
            phase,
            mapping: Mapping::Static(None),
            _input: PhantomData,
        }
    }

    fn parse(&self, bytes: &[u8]) -> Result<I, String> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(I::empty());
        }
        serde_json::from_slice(bytes).map_err(|e| e.to_string())
    }
}

impl<I: JsonShape, O: JsonShape> Transformer for JsonModifier<I, O> {
    fn apply<'a>(&'a self, ctx: &'a mut ProxyContext) -> BoxFuture<'a, Result<Flow, ProxyError>> {
        Box::pin(async move {
            let output = match &self.mapping {
                Mapping::Static(value) => value.clone(),
                Mapping::Dynamic(mapper) => {
                    let bytes = ctx.take_body(self.phase).await?;
                    match self.parse(&bytes) {
                        Ok(input) => mapper(input),
                        Err(reason) => {
                            tracing::debug!(phase = %self.phase, error = %reason, "Rejecting malformed JSON body");
                            return Ok(TerminalResponse::new(StatusCode::BAD_REQUEST)
                                .message(format!("Invalid JSON body: {reason}"))
                                .respond());
                        }
                    }
                }
            };

            let Some(output) = output else {
                ctx.set_body(self.phase, Bytes::new())?;
                return Ok(Flow::Continue);
            };

            let encoded = serde_json::to_vec(&output).map_err(|e| ProxyError::Transformer {
                name: "json-modifier",
                reason: e.to_string(),
            })?;
            ctx.set_body(self.phase, Bytes::from(encoded))?;
            ctx.headers_mut(self.phase)?.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            Ok(Flow::Continue)
        })
    }

    fn name(&self) -> &'static str {
        "json-modifier"
    }
}

pub type JsonValueModifier = JsonModifier<Value, Value>;
pub type JsonObjectModifier = JsonModifier<JsonObject, JsonObject>;
pub type JsonArrayModifier = JsonModifier<JsonArray, JsonArray>;
pub type JsonObjectToArrayModifier = JsonModifier<JsonObject, JsonArray>;
pub type JsonArrayToObjectModifier = JsonModifier<JsonArray, JsonObject>;
