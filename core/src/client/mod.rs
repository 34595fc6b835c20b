//! Client layer contract and the codec-backed client
//!
//! Options understood by [`Client`]:
//!
//! * `timeout_ms` (positive integer, default 30000): read/write timeout of the connection

mod endpoint;

pub use endpoint::{Address, Endpoint};

use std::time::Duration;

use anyhow::bail;
use log::*;
use serde_json::Value;

use crate::codec::{Call, Codec};
use crate::error::ClientError;
use crate::options::LayerOptions;
use crate::transport::frame;
use endpoint::Connection;

pub const OPTION_TIMEOUT_MS: &str = "timeout_ms";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Capability interface of client-side layers
pub trait ClientLayer: Send {
    /// Connects to `endpoint`, a URI optionally carrying `login:password@` credentials
    fn open(&mut self, endpoint: &str) -> Result<(), ClientError>;

    /// Calls `method` on the remote side and returns its decoded result
    fn execute(&mut self, method: &str, params: Value) -> Result<Value, ClientError>;
}

/// Client layer over any [`Codec`], speaking newline-delimited requests over TCP or Unix
/// domain sockets
pub struct Client<C> {
    codec: C,
    timeout: Duration,
    endpoint: Option<Endpoint>,
    connection: Option<Connection>,
    next_id: u64,
}

impl<C: Codec> Client<C> {
    pub fn new(codec: C, options: LayerOptions) -> anyhow::Result<Self> {
        let timeout = match options.get(OPTION_TIMEOUT_MS) {
            None => DEFAULT_TIMEOUT,
            Some(value) => match value.as_u64() {
                Some(ms) if ms > 0 => Duration::from_millis(ms),
                _ => bail!(
                    "option {} must be a positive integer, got {}",
                    OPTION_TIMEOUT_MS,
                    value
                ),
            },
        };

        Ok(Self {
            codec,
            timeout,
            endpoint: None,
            connection: None,
            next_id: 0,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Drops the connection and forgets the endpoint
    pub fn close(&mut self) {
        self.connection = None;
        self.endpoint = None;
    }
}

impl<C: Codec> ClientLayer for Client<C> {
    fn open(&mut self, endpoint: &str) -> Result<(), ClientError> {
        let endpoint = Endpoint::parse(endpoint)?;
        let connection = Connection::open(&endpoint.address, self.timeout)?;
        info!("Connected to {} ({})", endpoint, self.codec.name());

        self.connection = Some(connection);
        self.endpoint = Some(endpoint);
        Ok(())
    }

    fn execute(&mut self, method: &str, params: Value) -> Result<Value, ClientError> {
        let Some(endpoint) = &self.endpoint else {
            return Err(ClientError::NotOpen);
        };

        self.next_id += 1;
        let call = Call::new(method, params).with_id(self.next_id);
        let mut request = self.codec.encode_call(&call)?;
        if let Some(credentials) = &endpoint.credentials {
            request = frame::attach_credentials(&request, credentials)?;
        }

        // A previous I/O failure dropped the connection
        if self.connection.is_none() {
            debug!("Reconnecting to {}", endpoint);
            self.connection = Some(Connection::open(&endpoint.address, self.timeout)?);
        }
        let Some(connection) = self.connection.as_mut() else {
            return Err(ClientError::NotOpen);
        };

        trace!("Calling {} (id {})", method, self.next_id);
        match connection.round_trip(&request) {
            Ok(response) => self.codec.decode_result(&response),
            Err(e) => {
                self.connection = None;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::JsonCodec;
    use serde_json::json;

    #[test]
    fn test_timeout_option() {
        let client = Client::new(JsonCodec, LayerOptions::new()).unwrap();
        assert_eq!(client.timeout(), DEFAULT_TIMEOUT);

        let client =
            Client::new(JsonCodec, LayerOptions::new().with(OPTION_TIMEOUT_MS, 250)).unwrap();
        assert_eq!(client.timeout(), Duration::from_millis(250));

        assert!(Client::new(JsonCodec, LayerOptions::new().with(OPTION_TIMEOUT_MS, 0)).is_err());
        assert!(
            Client::new(JsonCodec, LayerOptions::new().with(OPTION_TIMEOUT_MS, "1s")).is_err()
        );
    }

    #[test]
    fn test_execute_before_open() {
        let mut client = Client::new(JsonCodec, LayerOptions::new()).unwrap();
        assert!(matches!(
            client.execute("ping", json!(null)),
            Err(ClientError::NotOpen)
        ));
        assert!(!client.is_connected());
    }

    #[test]
    fn test_open_rejects_bad_endpoint() {
        let mut client = Client::new(JsonCodec, LayerOptions::new()).unwrap();
        assert!(matches!(
            client.open("ftp://127.0.0.1:21"),
            Err(ClientError::InvalidEndpoint { .. })
        ));
        assert!(client.endpoint().is_none());
    }
}
