//! Boundary to the generated RPC library.
//!
//! A service description knows the methods of the typed client the RPC
//! library generated for it and how to build that client over a protocol.

use crate::protocol::error::Result;
use crate::protocol::envelope::RpcResult;
use crate::transport::Protocol;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// A typed client bound to a protocol (or an in-process implementation).
#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// Invokes operation `name` with `args`.
    async fn call(&self, name: &str, args: Vec<Value>) -> Result<RpcResult>;
}

pub trait ServiceDescription: Send + Sync {
    /// Service name, used in logs.
    fn name(&self) -> &str;

    /// Every method of the generated typed client, including the
    /// `send_*`/`recv_*` pairs and the transport-internal helpers.
    fn methods(&self) -> Vec<String>;

    /// Builds the typed client over `protocol`.
    fn client(&self, protocol: Arc<dyn Protocol>) -> Arc<dyn ServiceClient>;
}
