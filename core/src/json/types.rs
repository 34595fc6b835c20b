//! JSON-RPC 2.0 envelope types

use serde::{Deserialize, Serialize};

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const UNAUTHORIZED: i32 = -32001;
pub const FORBIDDEN: i32 = -32003;

/// JSON-RPC 2.0 request
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

impl RpcResponse {
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<serde_json::Value>, code: i32, message: &str) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(RpcError {
                code,
                message: message.to_string(),
                data: None,
            }),
            id,
        }
    }

    pub fn parse_error() -> Self {
        Self::error(None, PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request(id: Option<serde_json::Value>) -> Self {
        Self::error(id, INVALID_REQUEST, "Invalid Request")
    }

    pub fn method_not_found(id: Option<serde_json::Value>) -> Self {
        Self::error(id, METHOD_NOT_FOUND, "Method not found")
    }

    pub fn invalid_params(id: Option<serde_json::Value>, msg: &str) -> Self {
        Self::error(id, INVALID_PARAMS, &format!("Invalid params: {}", msg))
    }

    pub fn internal_error(id: Option<serde_json::Value>, msg: &str) -> Self {
        Self::error(id, INTERNAL_ERROR, &format!("Internal error: {}", msg))
    }

    pub fn unauthorized() -> Self {
        Self::error(None, UNAUTHORIZED, "Unauthorized")
    }

    pub fn forbidden() -> Self {
        Self::error(None, FORBIDDEN, "Forbidden")
    }
}

/// JSON-RPC 2.0 error
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}
