//! Newline-delimited stream transport
//!
//! Requests and responses are exchanged one per line over Unix domain sockets or TCP.
//!
//! # Example
//!
//! ```bash
//! echo '{"jsonrpc":"2.0","method":"ping","id":1}' | socat - UNIX-CONNECT:/tmp/rpc-layer-$PID.sock
//! ```

pub mod frame;
mod server;

pub use server::{RequestProcessor, TransportConfig, TransportMessage, TransportServer};
