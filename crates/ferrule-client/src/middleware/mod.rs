//! Middleware pipeline.
//!
//! A pipeline is a chain of [`Handler`]s: every stage receives the [`Rpc`]
//! envelope, may act before and after, and forwards to the next stage; the
//! last one is a dispatcher. Stages are produced by [`Layer`]s, which wrap
//! the rest of the chain, so a stack `[A, B, C]` finalized over terminal `T`
//! compiles to `A(B(C(T)))`: A sees the call first and the result last.
//!
//! # Built-in stages
//!
//! - [`ErrorWrapping`]: normalizes transport-level failures into
//!   [`ClientError`](ferrule_common::ClientError)
//! - [`Validation`]: checks structured arguments and results
//! - [`ClientMetrics`] / [`RpcMetrics`]: client-wide and per-operation metrics

mod client_metrics;
mod error_wrapping;
mod rpc_metrics;
mod validation;

pub use client_metrics::ClientMetrics;
pub use error_wrapping::ErrorWrapping;
pub use rpc_metrics::RpcMetrics;
pub use validation::{Validation, Validator};

use async_trait::async_trait;
use ferrule_common::{Result, Rpc, RpcError, RpcResult};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// One stage of a pipeline.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, rpc: Rpc) -> Result<RpcResult>;
}

pub type BoxHandler = Box<dyn Handler>;

/// Wraps the rest of a pipeline into a new stage.
///
/// A layer is instantiated once per pooled pipeline, so it holds the
/// stage's arguments and builds a fresh stage each time. Closures of type
/// `Fn(BoxHandler) -> BoxHandler` are layers.
pub trait Layer: Send + Sync {
    fn layer(&self, app: BoxHandler) -> BoxHandler;
}

impl<F> Layer for F
where
    F: Fn(BoxHandler) -> BoxHandler + Send + Sync,
{
    fn layer(&self, app: BoxHandler) -> BoxHandler {
        self(app)
    }
}

/// Handler backed by an async closure.
pub struct HandlerFn<F> {
    f: F,
}

/// Builds a [`Handler`] from an async closure.
///
/// ```
/// use ferrule_client::middleware::{handler_fn, Handler};
/// use ferrule_common::Rpc;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() {
/// let echo = handler_fn(|rpc: Rpc| async move { Ok(json!(rpc.args)) });
/// let result = echo.call(Rpc::new("echo", vec![json!(1)])).await.unwrap();
/// assert_eq!(result, json!([1]));
/// # }
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Rpc) -> Fut + Send + Sync,
    Fut: Future<Output = Result<RpcResult>> + Send,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Rpc) -> Fut + Send + Sync,
    Fut: Future<Output = Result<RpcResult>> + Send,
{
    async fn call(&self, rpc: Rpc) -> Result<RpcResult> {
        (self.f)(rpc).await
    }
}

/// Ordered list of layers, appendable until finalized.
#[derive(Clone, Default)]
pub struct MiddlewareStack {
    layers: Vec<Arc<dyn Layer>>,
    frozen: bool,
}

impl MiddlewareStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a layer.
    pub fn push<L>(&mut self, layer: L) -> Result<&mut Self>
    where
        L: Layer + 'static,
    {
        self.push_arc(Arc::new(layer))
    }

    pub fn push_arc(&mut self, layer: Arc<dyn Layer>) -> Result<&mut Self> {
        if self.frozen {
            return Err(RpcError::StackFrozen);
        }
        self.layers.push(layer);
        Ok(self)
    }

    /// Appends every layer of `other`, in order.
    pub fn push_stack(&mut self, other: &MiddlewareStack) -> Result<&mut Self> {
        if self.frozen {
            return Err(RpcError::StackFrozen);
        }
        self.layers.extend(other.layers.iter().cloned());
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Freezes the stack and compiles it around `terminal`.
    pub fn finalize(&mut self, terminal: BoxHandler) -> Result<Pipeline> {
        if self.frozen {
            return Err(RpcError::StackFrozen);
        }
        self.frozen = true;

        let head = self
            .layers
            .iter()
            .rev()
            .fold(terminal, |app, layer| layer.layer(app));

        Ok(Pipeline { head })
    }
}

impl fmt::Debug for MiddlewareStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareStack")
            .field("layers", &self.layers.len())
            .field("frozen", &self.frozen)
            .finish()
    }
}

/// A finalized middleware chain.
pub struct Pipeline {
    head: BoxHandler,
}

impl Pipeline {
    pub async fn call(&self, rpc: Rpc) -> Result<RpcResult> {
        self.head.call(rpc).await
    }
}
