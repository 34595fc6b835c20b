//! Client endpoints and connections

use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::ClientError;
use crate::server::Credential;

/// Where a client connects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// `host:port`
    Tcp(String),
    Unix(PathBuf),
}

/// Parsed endpoint URI: `tcp://[login:password@]host:port` or `unix://[login:password@]/path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub address: Address,
    pub credentials: Option<Credential>,
}

impl Endpoint {
    pub fn parse(uri: &str) -> Result<Self, ClientError> {
        let invalid = |reason: &str| ClientError::InvalidEndpoint {
            endpoint: uri.to_string(),
            reason: reason.to_string(),
        };
        let url = Url::parse(uri).map_err(|e| invalid(&e.to_string()))?;

        let address = match url.scheme() {
            "tcp" => {
                let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
                let port = url.port().ok_or_else(|| invalid("missing port"))?;
                Address::Tcp(format!("{}:{}", host, port))
            }
            "unix" => {
                if url.path().is_empty() || url.path() == "/" {
                    return Err(invalid("missing socket path"));
                }
                Address::Unix(PathBuf::from(url.path()))
            }
            scheme => return Err(invalid(&format!("unsupported scheme '{}'", scheme))),
        };

        // Userinfo comes back percent-encoded
        let decode = |raw: &str| {
            percent_decode_str(raw)
                .decode_utf8()
                .map(|s| s.into_owned())
                .map_err(|e| invalid(&format!("credentials are not valid UTF-8: {}", e)))
        };
        let credentials = if url.username().is_empty() {
            None
        } else {
            Some(Credential::new(
                decode(url.username())?,
                decode(url.password().unwrap_or_default())?,
            ))
        };

        Ok(Self {
            address,
            credentials,
        })
    }
}

impl FromStr for Endpoint {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let user = self
            .credentials
            .as_ref()
            .map(|c| format!("{}@", c.login))
            .unwrap_or_default();
        match &self.address {
            Address::Tcp(addr) => write!(f, "tcp://{}{}", user, addr),
            Address::Unix(path) => write!(f, "unix://{}{}", user, path.display()),
        }
    }
}

/// Open stream carrying newline-delimited requests and responses
pub(crate) struct Connection {
    reader: BufReader<Box<dyn Read + Send>>,
    writer: Box<dyn Write + Send>,
}

impl Connection {
    pub(crate) fn open(address: &Address, timeout: Duration) -> Result<Self, ClientError> {
        match address {
            Address::Tcp(addr) => {
                let stream = TcpStream::connect(addr)?;
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                Ok(Self {
                    reader: BufReader::new(Box::new(stream.try_clone()?)),
                    writer: Box::new(stream),
                })
            }
            #[cfg(unix)]
            Address::Unix(path) => {
                use std::os::unix::net::UnixStream;

                let stream = UnixStream::connect(path)?;
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                Ok(Self {
                    reader: BufReader::new(Box::new(stream.try_clone()?)),
                    writer: Box::new(stream),
                })
            }
            #[cfg(not(unix))]
            Address::Unix(path) => Err(ClientError::InvalidEndpoint {
                endpoint: path.display().to_string(),
                reason: "Unix sockets are not supported on this platform".to_string(),
            }),
        }
    }

    /// Sends one request line and waits for one response line
    pub(crate) fn round_trip(&mut self, request: &str) -> Result<String, ClientError> {
        self.writer.write_all(request.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;

        let mut response = String::new();
        if self.reader.read_line(&mut response)? == 0 {
            return Err(ClientError::Protocol(
                "Connection closed by server".to_string(),
            ));
        }
        Ok(response)
    }
}
