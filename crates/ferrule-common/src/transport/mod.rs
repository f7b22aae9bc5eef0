//! Ferrule Transport Boundary
//!
//! The RPC library underneath ferrule is external: ferrule drives a
//! transport's lifecycle (`open`, `is_open`, `close`) and hands the
//! transport to a protocol, which the service description wraps in a typed
//! client. The typed client encodes calls and exchanges them as messages
//! through the protocol.
//!
//! # Components
//!
//! - **[`Transport`]** / **[`TransportFactory`]**: connection lifecycle and raw bytes
//! - **[`Protocol`]** / **[`ProtocolFactory`]**: message framing over one transport
//! - **[`Endpoint`]**: host and explicit port parsed from a target URI
//! - **[`TcpTransport`]**: default socket transport
//! - **[`StreamProtocol`]**: default protocol, length-prefixed messages

pub mod tcp;

pub use tcp::{
    StreamProtocol, StreamProtocolFactory, TcpTransport, TcpTransportFactory, MAX_MESSAGE_SIZE,
};

use crate::protocol::error::{Result, RpcError};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Connection lifecycle of an RPC transport.
///
/// Implementations use interior mutability: a transport is shared between
/// the dispatcher that opens and closes it and the protocol that writes to it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Closes the transport. Closing a closed transport is a no-op.
    async fn close(&self);

    /// Writes all of `data` and flushes it.
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// Fills `buf` completely from the transport.
    async fn read_exact(&self, buf: &mut [u8]) -> Result<()>;
}

pub type SharedTransport = Arc<dyn Transport>;

/// Builds one transport per pooled pipeline.
pub trait TransportFactory: Send + Sync {
    fn name(&self) -> &str;

    fn build(&self, endpoint: &Endpoint, rpc_timeout: Duration) -> Result<SharedTransport>;
}

/// A protocol bound to a transport.
///
/// Messages are opaque byte payloads; their encoding belongs to the typed
/// client.
#[async_trait]
pub trait Protocol: Send + Sync {
    fn transport(&self) -> &SharedTransport;

    /// Sends one message.
    async fn send_message(&self, data: &[u8]) -> Result<()>;

    /// Receives one message.
    async fn receive_message(&self) -> Result<Vec<u8>>;
}

pub trait ProtocolFactory: Send + Sync {
    fn name(&self) -> &str;

    fn build(&self, transport: SharedTransport) -> Arc<dyn Protocol>;
}

/// Target of a network client: a host and an explicit port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses a target URI such as `tcp://localhost:9090`.
    ///
    /// The port must be given explicitly; scheme default ports are not used.
    pub fn parse(uri: &str) -> Result<Self> {
        let url = Url::parse(uri)
            .map_err(|e| RpcError::Config(format!("Invalid uri '{}': {}", uri, e)))?;

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| RpcError::Config(format!("URI '{}' did not contain a host", uri)))?;

        let port = url
            .port()
            .ok_or_else(|| RpcError::Config(format!("URI '{}' did not contain port", uri)))?;

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
