//! Request framing for the newline-delimited stream transport
//!
//! Every request is one line holding a JSON object. Credentials travel in an optional
//! top-level `auth` member (`{"login": ..., "password": ...}`), which is stripped before the
//! body reaches the server layer's codec.

use std::net::IpAddr;

use serde_json::{Map, Value};

use crate::error::ClientError;
use crate::server::{Credential, Incoming};

pub const AUTH_MEMBER: &str = "auth";

/// Adds `credentials` to an encoded request object
pub fn attach_credentials(body: &str, credentials: &Credential) -> Result<String, ClientError> {
    let protocol = |e: serde_json::Error| {
        ClientError::Protocol(format!("Cannot attach credentials to request: {}", e))
    };

    let mut object: Map<String, Value> = serde_json::from_str(body).map_err(protocol)?;
    object.insert(
        AUTH_MEMBER.to_string(),
        serde_json::to_value(credentials).map_err(protocol)?,
    );
    serde_json::to_string(&object).map_err(protocol)
}

/// Splits a received request line into an [`Incoming`]. Lines that are not JSON objects are
/// passed through untouched for the codec to reject.
pub fn parse_request(host: Option<IpAddr>, line: &str) -> Incoming {
    let line = line.trim();
    let mut incoming = Incoming::new(line);
    incoming.host = host;

    if let Ok(mut object) = serde_json::from_str::<Map<String, Value>>(line)
        && let Some(auth) = object.remove(AUTH_MEMBER)
    {
        // Malformed credentials count as none presented
        incoming.credentials = serde_json::from_value(auth).ok();
        if let Ok(body) = serde_json::to_string(&object) {
            incoming.body = body;
        }
    }

    incoming
}
