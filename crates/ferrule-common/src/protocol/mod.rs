pub mod envelope;
pub mod error;
pub mod service;


pub use envelope::{OperationName, Rpc, RpcArgs, RpcResult};
pub use error::{
    ApplicationErrorKind, ClientError, ErrorClass, ProtocolErrorKind, Result, RpcError,
    TransportErrorKind,
};
pub use service::{ServiceClient, ServiceDescription};
