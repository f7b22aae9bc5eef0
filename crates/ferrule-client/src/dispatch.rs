//! Terminal pipeline stages.
//!
//! - [`Dispatcher`]: drives a network transport around each call
//! - [`DirectDispatcher`]: forwards to an in-process implementation

use crate::middleware::Handler;
use async_trait::async_trait;
use ferrule_common::{Result, Rpc, RpcResult, ServiceClient, SharedTransport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Network dispatcher.
///
/// Opens the transport if needed and invokes the typed client. On success
/// the transport is closed unless keep-alive is on; on any failure it is
/// closed and the error is returned unchanged.
///
/// A call dropped before it completes (a caller-side timeout, an aborted
/// task) leaves the transport with a request outstanding. The dispatcher
/// remembers that and closes the transport before the next call, so an
/// interrupted connection is never written to again.
pub struct Dispatcher {
    transport: SharedTransport,
    client: Arc<dyn ServiceClient>,
    keep_alive: bool,
    interrupted: AtomicBool,
}

impl Dispatcher {
    pub fn new(transport: SharedTransport, client: Arc<dyn ServiceClient>, keep_alive: bool) -> Self {
        Self {
            transport,
            client,
            keep_alive,
            interrupted: AtomicBool::new(false),
        }
    }

    async fn dispatch(&self, rpc: &Rpc) -> Result<RpcResult> {
        if !self.transport.is_open() {
            self.transport.open().await?;
        }
        self.client.call(&rpc.name, rpc.args.clone()).await
    }
}

/// Flags the dispatcher as interrupted unless [`finish`](Self::finish)
/// runs first.
struct InFlight<'a> {
    interrupted: &'a AtomicBool,
    finished: bool,
}

impl<'a> InFlight<'a> {
    fn start(interrupted: &'a AtomicBool) -> Self {
        Self {
            interrupted,
            finished: false,
        }
    }

    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.interrupted.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Handler for Dispatcher {
    async fn call(&self, rpc: Rpc) -> Result<RpcResult> {
        if self.interrupted.swap(false, Ordering::SeqCst) {
            tracing::debug!(operation = %rpc.name, "Closing transport left by an interrupted call");
            self.transport.close().await;
        }

        let in_flight = InFlight::start(&self.interrupted);
        let outcome = match self.dispatch(&rpc).await {
            Ok(result) => {
                if !self.keep_alive {
                    self.transport.close().await;
                }
                Ok(result)
            }
            Err(err) => {
                tracing::debug!(operation = %rpc.name, error = %err, "Closing transport after failed call");
                self.transport.close().await;
                Err(err)
            }
        };
        in_flight.finish();

        outcome
    }
}

/// Dispatcher for clients built around an in-process implementation.
pub struct DirectDispatcher {
    implementation: Arc<dyn ServiceClient>,
}

impl DirectDispatcher {
    pub fn new(implementation: Arc<dyn ServiceClient>) -> Self {
        Self { implementation }
    }
}

#[async_trait]
impl Handler for DirectDispatcher {
    async fn call(&self, rpc: Rpc) -> Result<RpcResult> {
        self.implementation.call(&rpc.name, rpc.args).await
    }
}
