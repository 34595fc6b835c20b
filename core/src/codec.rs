//! Wire-format plug shared by client and server layers

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, ServerError};
use crate::options::LayerOptions;

/// A decoded request: method name, parameters and correlation id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Option<Value>,
}

impl Call {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Encodes and decodes request/response envelopes for one wire format.
///
/// `options` are the effective layer options of the current call; the codec is free to
/// read whichever keys it understands.
pub trait Codec: Send + Sync {
    /// Format name, e.g. `JSON`
    fn name(&self) -> &'static str;

    /// Server side: request body to [`Call`]
    fn decode_call(&self, body: &str, options: &LayerOptions) -> Result<Call, ServerError>;

    /// Server side: successful handler result to response body
    fn encode_result(&self, id: Option<&Value>, result: Value, options: &LayerOptions) -> String;

    /// Server side: request-level failure to response body
    fn encode_error(
        &self,
        id: Option<&Value>,
        error: &ServerError,
        options: &LayerOptions,
    ) -> String;

    /// Client side: [`Call`] to request body
    fn encode_call(&self, call: &Call) -> Result<String, ClientError>;

    /// Client side: response body to result value
    fn decode_result(&self, body: &str) -> Result<Value, ClientError>;
}
