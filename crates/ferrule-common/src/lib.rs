//! Ferrule Common Types
//!
//! This crate provides the vocabulary shared by every ferrule component:
//!
//! - **Protocol Layer**: the [`Rpc`] envelope, the [`RpcError`] taxonomy and
//!   the [`ServiceDescription`] / [`ServiceClient`] boundary to the RPC library
//! - **Transport Layer**: transport and protocol traits, [`Endpoint`] parsing
//!   and the default TCP socket transport
//!
//! # Example
//!
//! ```
//! use ferrule_common::{ClientError, Rpc, RpcError, TransportErrorKind};
//! use serde_json::json;
//!
//! let rpc = Rpc::new("echo", vec![json!("hello")]);
//! assert_eq!(rpc.name, "echo");
//!
//! let err = RpcError::transport(TransportErrorKind::NotOpen, "socket closed");
//! let wrapped = ClientError::wrap(&err);
//! assert_eq!(wrapped.to_string(), "TransportError: socket closed");
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
pub use transport::{
    Endpoint, Protocol, ProtocolFactory, SharedTransport, Transport, TransportFactory,
};
