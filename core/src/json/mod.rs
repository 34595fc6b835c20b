//! Built-in JSON-RPC 2.0 layers
//!
//! Options understood by the JSON server layer:
//!
//! * `strict_version` (bool, default `true`): reject requests whose `jsonrpc` member is not `"2.0"`
//! * `expose_errors` (bool, default `true`): include handler error messages in responses
//!
//! Options understood by the JSON client layer are listed in [`crate::client`].

mod types;

pub use types::*;

use log::*;
use serde_json::Value;

use crate::client::{Client, ClientLayer};
use crate::codec::{Call, Codec};
use crate::error::{ClientError, ServerError};
use crate::options::LayerOptions;
use crate::server::{Server, ServerLayer};

/// Format name of the built-in JSON layers
pub const FORMAT_NAME: &str = "JSON";

pub const OPTION_STRICT_VERSION: &str = "strict_version";
pub const OPTION_EXPOSE_ERRORS: &str = "expose_errors";

pub type JsonServer = Server<JsonCodec>;
pub type JsonClient = Client<JsonCodec>;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    fn render(response: &RpcResponse) -> String {
        match serde_json::to_string(response) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to serialize RPC response: {}", e);
                format!(
                    r#"{{"jsonrpc":"{}","error":{{"code":{},"message":"Internal error"}},"id":null}}"#,
                    JSONRPC_VERSION, INTERNAL_ERROR
                )
            }
        }
    }
}

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        FORMAT_NAME
    }

    fn decode_call(&self, body: &str, options: &LayerOptions) -> Result<Call, ServerError> {
        let value: Value = serde_json::from_str(body.trim())
            .map_err(|e| ServerError::ParseError(e.to_string()))?;
        let request: RpcRequest = serde_json::from_value(value)
            .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;

        let strict = options.get_bool(OPTION_STRICT_VERSION).unwrap_or(true);
        if strict && request.jsonrpc != JSONRPC_VERSION {
            return Err(ServerError::InvalidRequest(format!(
                "unsupported jsonrpc version '{}'",
                request.jsonrpc
            )));
        }

        Ok(Call {
            method: request.method,
            params: request.params,
            id: request.id,
        })
    }

    fn encode_result(&self, id: Option<&Value>, result: Value, _options: &LayerOptions) -> String {
        Self::render(&RpcResponse::success(id.cloned(), result))
    }

    fn encode_error(
        &self,
        id: Option<&Value>,
        error: &ServerError,
        options: &LayerOptions,
    ) -> String {
        let id = id.cloned();
        let expose = options.get_bool(OPTION_EXPOSE_ERRORS).unwrap_or(true);
        let response = match error {
            ServerError::Forbidden { .. } => RpcResponse::forbidden(),
            ServerError::Unauthorized { .. } => RpcResponse::unauthorized(),
            ServerError::ParseError(_) => RpcResponse::parse_error(),
            ServerError::InvalidRequest(_) => RpcResponse::invalid_request(id),
            ServerError::MethodNotFound(_) => RpcResponse::method_not_found(id),
            ServerError::InvalidParams(msg) if expose => RpcResponse::invalid_params(id, msg),
            ServerError::InvalidParams(_) => RpcResponse::error(id, INVALID_PARAMS, "Invalid params"),
            ServerError::HandlerFailure(msg) if expose => RpcResponse::internal_error(id, msg),
            ServerError::HandlerFailure(_) => RpcResponse::error(id, INTERNAL_ERROR, "Internal error"),
        };
        Self::render(&response)
    }

    fn encode_call(&self, call: &Call) -> Result<String, ClientError> {
        let request = RpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: call.method.clone(),
            params: call.params.clone(),
            id: call.id.clone(),
        };
        serde_json::to_string(&request).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    fn decode_result(&self, body: &str) -> Result<Value, ClientError> {
        let response: RpcResponse = serde_json::from_str(body.trim())
            .map_err(|e| ClientError::Protocol(format!("Failed to parse RPC response: {}", e)))?;

        if let Some(error) = response.error {
            return Err(ClientError::Remote {
                code: error.code,
                message: error.message,
            });
        }
        // A missing or null result both mean the method returned nothing
        Ok(response.result.unwrap_or(Value::Null))
    }
}

/// Constructor registered for the built-in JSON server layer
pub fn server_layer(options: LayerOptions) -> anyhow::Result<Box<dyn ServerLayer>> {
    Ok(Box::new(JsonServer::new(JsonCodec, options)))
}

/// Constructor registered for the built-in JSON client layer
pub fn client_layer(options: LayerOptions) -> anyhow::Result<Box<dyn ClientLayer>> {
    Ok(Box::new(JsonClient::new(JsonCodec, options)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(body: &str) -> Result<Call, ServerError> {
        JsonCodec.decode_call(body, &LayerOptions::new())
    }

    #[test]
    fn test_decode_call() {
        let call = decode(r#"{"jsonrpc":"2.0","method":"add","params":{"a":2,"b":3},"id":7}"#)
            .unwrap();
        assert_eq!(call.method, "add");
        assert_eq!(call.params, json!({"a": 2, "b": 3}));
        assert_eq!(call.id, Some(json!(7)));
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(decode("{not json"), Err(ServerError::ParseError(_))));
        assert!(matches!(decode("[1, 2]"), Err(ServerError::InvalidRequest(_))));
        assert!(matches!(
            decode(r#"{"jsonrpc":"1.0","method":"add"}"#),
            Err(ServerError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_lenient_version() {
        let options = LayerOptions::new().with(OPTION_STRICT_VERSION, false);
        let call = JsonCodec
            .decode_call(r#"{"method":"ping"}"#, &options)
            .unwrap();
        assert_eq!(call.method, "ping");
        assert_eq!(call.params, Value::Null);
        assert_eq!(call.id, None);
    }

    #[test]
    fn test_encode_error_codes() {
        let options = LayerOptions::new();
        let encoded = JsonCodec.encode_error(
            Some(&json!(3)),
            &ServerError::MethodNotFound("sub".to_string()),
            &options,
        );
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(value["id"], 3);
        assert!(value.get("result").is_none());

        let encoded = JsonCodec.encode_error(None, &ServerError::Forbidden { host: None }, &options);
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["error"]["code"], FORBIDDEN);
        assert_eq!(value["id"], Value::Null);
    }

    #[test]
    fn test_hidden_handler_errors() {
        let error = ServerError::HandlerFailure("database password is hunter2".to_string());
        let exposed = JsonCodec.encode_error(None, &error, &LayerOptions::new());
        assert!(exposed.contains("hunter2"));

        let options = LayerOptions::new().with(OPTION_EXPOSE_ERRORS, false);
        let hidden = JsonCodec.encode_error(None, &error, &options);
        assert!(!hidden.contains("hunter2"));
        assert!(hidden.contains(&INTERNAL_ERROR.to_string()));
    }

    #[test]
    fn test_responses_stay_on_one_line() {
        let mut server = JsonServer::new(JsonCodec, LayerOptions::new().with("pretty", true));
        server.bind(
            "nested",
            crate::server::handler(|_| Ok(json!({"a": [1, {"b": "x\ny"}], "c": null}))),
        );

        let body = r#"{"jsonrpc":"2.0","method":"nested","id":1}"#;
        let response = server
            .execute(&crate::server::Incoming::new(body), LayerOptions::new(), false)
            .unwrap();
        assert!(!response.contains('\n'));
        let value: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["result"]["a"][1]["b"], "x\ny");

        let error = ServerError::InvalidParams("bad\nparams".to_string());
        assert!(!JsonCodec.encode_error(None, &error, &LayerOptions::new()).contains('\n'));
    }

    #[test]
    fn test_decode_result() {
        assert_eq!(
            JsonCodec
                .decode_result(r#"{"jsonrpc":"2.0","result":5,"id":1}"#)
                .unwrap(),
            json!(5)
        );
        assert_eq!(
            JsonCodec
                .decode_result(r#"{"jsonrpc":"2.0","result":null,"id":1}"#)
                .unwrap(),
            Value::Null
        );
        assert!(matches!(
            JsonCodec.decode_result(
                r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found"},"id":1}"#
            ),
            Err(ClientError::Remote { code: METHOD_NOT_FOUND, .. })
        ));
        assert!(matches!(
            JsonCodec.decode_result("garbage"),
            Err(ClientError::Protocol(_))
        ));
    }
}
