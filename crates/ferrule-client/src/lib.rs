//! Ferrule Client
//!
//! A resilient client runtime for RPC services. Given a
//! [`ServiceDescription`](ferrule_common::ServiceDescription), ferrule
//! derives the operations the service exposes and builds clients that:
//!
//! - run every call through an ordered middleware pipeline
//! - keep a bounded, instrumented pool of pipelines, one transport each
//! - normalize transport failures into [`ClientError`](ferrule_common::ClientError)
//! - retry retriable failures with a fixed interval
//!
//! # Architecture
//!
//! ```text
//! caller -> Client::call -> InstrumentedPool::checkout -> Pipeline
//!            app stack -> ClientMetrics -> RpcMetrics -> Dispatcher -> transport
//! ```
//!
//! [`RetryProxy`] sits outside the pool and repeats whole pipeline calls.
//!
//! # Example
//!
//! ```rust
//! use ferrule_client::{ClientClass, Validation};
//! use ferrule_common::{Protocol, Result, RpcResult, ServiceClient, ServiceDescription};
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl ServiceClient for Echo {
//!     async fn call(&self, _name: &str, args: Vec<Value>) -> Result<RpcResult> {
//!         Ok(Value::Array(args))
//!     }
//! }
//!
//! struct EchoService;
//!
//! impl ServiceDescription for EchoService {
//!     fn name(&self) -> &str { "Echo" }
//!     fn methods(&self) -> Vec<String> { vec!["send_echo".into(), "recv_echo".into()] }
//!     fn client(&self, _protocol: Arc<dyn Protocol>) -> Arc<dyn ServiceClient> { Arc::new(Echo) }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let class = ClientClass::build(Arc::new(EchoService));
//! class.use_middleware(Validation::new(|_: &Value| -> Result<()> { Ok(()) }))?;
//!
//! let client = class.direct(Arc::new(Echo))?;
//! assert_eq!(client.call("echo", vec![json!("hi")]).await?, json!(["hi"]));
//! # Ok(())
//! # }
//! ```

mod client;
pub mod config;
pub mod dispatch;
pub mod extensions;
mod macros;
pub mod middleware;
pub mod pool;
pub mod surface;

pub use client::{Client, ClientClass, Invoke};
pub use config::{ClientSettings, Configuration};
pub use dispatch::{DirectDispatcher, Dispatcher};
pub use extensions::{Ping, RetryOptions, RetryProxy};
pub use middleware::{
    ClientMetrics, ErrorWrapping, Handler, Layer, MiddlewareStack, Pipeline, RpcMetrics,
    Validation, Validator,
};
pub use pool::{InstrumentedPool, PoolGuard};

#[doc(hidden)]
pub mod __private {
    pub use ferrule_common::Result;
    pub use serde_json::Value;
}
