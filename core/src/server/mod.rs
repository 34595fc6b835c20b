//! Server layer contract
//!
//! A [`ServerLayer`] processes one incoming request per [`ServerLayer::execute`] call and
//! always applies its policies in the same order:
//!
//! 1. IP allow-list (rejects with [`ServerError::Forbidden`])
//! 2. credentials (rejects with [`ServerError::Unauthorized`])
//! 3. decoding (rejects with [`ServerError::ParseError`] / [`ServerError::InvalidRequest`])
//! 4. method lookup (rejects with [`ServerError::MethodNotFound`])
//! 5. handler invocation; handler failures are encoded into the response
//!
//! Requests rejected in steps 1 to 3 never reach user code and are not retained.

mod state;

pub use state::Server;

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::Call;
use crate::error::Rejected;
use crate::options::LayerOptions;

/// Callback bound to a method name
pub type Handler = Arc<dyn Fn(&Value) -> anyhow::Result<Value> + Send + Sync>;

/// Wraps a closure into a [`Handler`]
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Value) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Marker error a handler returns when its parameters are unusable
#[derive(Debug)]
pub struct InvalidParams(pub String);

impl fmt::Display for InvalidParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for InvalidParams {}

/// Deserializes handler parameters, reporting failures as [`InvalidParams`]
pub fn params<T: DeserializeOwned>(params: &Value) -> anyhow::Result<T> {
    serde_json::from_value(params.clone()).map_err(|e| InvalidParams(e.to_string()).into())
}

/// Login/password pair
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credential {
    pub login: String,
    pub password: String,
}

impl Credential {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

/// A request as delivered by the hosting transport
#[derive(Debug, Clone, Default)]
pub struct Incoming {
    /// Address of the caller. `None` when the transport has no notion of one
    /// (e.g. Unix domain sockets).
    pub host: Option<IpAddr>,
    /// Credentials presented by the caller, if any
    pub credentials: Option<Credential>,
    /// Undecoded request body
    pub body: String,
}

impl Incoming {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn from_host(mut self, host: IpAddr) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_credentials(mut self, credentials: Credential) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// Capability interface of server-side layers
pub trait ServerLayer: Send {
    /// Binds `handler` to `method`, replacing any previous binding
    fn bind(&mut self, method: &str, handler: Handler);

    /// Replaces the accepted credential set. Every login/password pair is accepted on its
    /// own, so one login may carry several passwords. An empty set disables authentication.
    fn authenticate_users(&mut self, users: Vec<Credential>);

    /// Replaces the allowed host list. An empty list allows every host.
    fn restrict_by_ips(&mut self, hosts: Vec<IpAddr>);

    /// Processes one request and returns the encoded response.
    ///
    /// `options` are laid over the standing options for this call only, unless
    /// `reset_options` is set, in which case they replace the standing options once the
    /// request has passed the host and credential checks.
    fn execute(
        &mut self,
        incoming: &Incoming,
        options: LayerOptions,
        reset_options: bool,
    ) -> Result<String, Rejected>;

    /// Last decoded request, `None` until one has been decoded
    fn get_request(&self) -> Option<&Call>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Pair {
        a: i64,
        b: i64,
    }

    #[test]
    fn test_params_helper() {
        let pair: Pair = params(&json!({"a": 2, "b": 3})).unwrap();
        assert_eq!(pair.a + pair.b, 5);

        let err = params::<Pair>(&json!({"a": "two"})).unwrap_err();
        assert!(err.downcast_ref::<InvalidParams>().is_some());
    }

    #[test]
    fn test_credential_debug_hides_password() {
        let debug = format!("{:?}", Credential::new("alice", "secret"));
        assert!(debug.contains("alice"));
        assert!(!debug.contains("secret"));
    }
}
