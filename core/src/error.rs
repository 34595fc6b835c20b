//! Error types for layer selection, request execution and remote calls

use std::net::IpAddr;

use thiserror::Error;

/// Failures of the layer factory. These are configuration errors and are never retried.
#[derive(Error, Debug)]
pub enum LayerError {
    #[error("Invalid layer type {0}")]
    InvalidRole(String),

    #[error("Layer {target} not found: {reason}")]
    LayerNotFound { target: String, reason: String },

    #[error("Class {type_ref} does not implement {interface} interface")]
    ContractViolation {
        type_ref: String,
        interface: &'static str,
    },
}

/// Request-level failures of a server layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    #[error("Host {} is not allowed", .host.map_or_else(|| "(unknown)".to_string(), |h| h.to_string()))]
    Forbidden { host: Option<IpAddr> },

    #[error("Authentication failed for {}", .login.as_deref().unwrap_or("(anonymous)"))]
    Unauthorized { login: Option<String> },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// A bound handler refused its parameters. Encoded into the response like
    /// [`ServerError::HandlerFailure`].
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// A bound handler failed. Encoded into the response, never returned from `execute`.
    #[error("Handler failure: {0}")]
    HandlerFailure(String),
}

/// A request rejected by the server, together with the response to send to the peer
#[derive(Error, Debug, Clone)]
#[error("{error}")]
pub struct Rejected {
    pub error: ServerError,
    pub response: String,
}

/// Failures of a client layer
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Layer is not connected, open an endpoint first")]
    NotOpen,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("RPC error {code}: {message}")]
    Remote { code: i32, message: String },
}
