use super::{BoxHandler, Handler, Layer};
use async_trait::async_trait;
use ferrule_common::{Result, Rpc, RpcError, RpcResult};
use ferrule_metrics::SharedStatsd;

/// Client-wide call metrics.
///
/// Emits `rpc.outgoing`, the `rpc.latency` timer and `rpc.success`. A
/// failure increments `rpc.error` and one of `rpc.error.transport`,
/// `.protocol`, `.application`, `.timeout`, `.retry` or `.other`, then
/// propagates unchanged.
#[derive(Clone)]
pub struct ClientMetrics {
    statsd: SharedStatsd,
}

impl ClientMetrics {
    pub fn new(statsd: SharedStatsd) -> Self {
        Self { statsd }
    }
}

impl Layer for ClientMetrics {
    fn layer(&self, app: BoxHandler) -> BoxHandler {
        Box::new(ClientMetricsHandler {
            statsd: self.statsd.clone(),
            app,
        })
    }
}

struct ClientMetricsHandler {
    statsd: SharedStatsd,
    app: BoxHandler,
}

fn error_bucket(err: &RpcError) -> &'static str {
    match err {
        RpcError::Transport { .. } => "rpc.error.transport",
        RpcError::Protocol { .. } => "rpc.error.protocol",
        RpcError::Application { .. } => "rpc.error.application",
        RpcError::Timeout(_) => "rpc.error.timeout",
        RpcError::Retry { .. } => "rpc.error.retry",
        _ => "rpc.error.other",
    }
}

#[async_trait]
impl Handler for ClientMetricsHandler {
    async fn call(&self, rpc: Rpc) -> Result<RpcResult> {
        self.statsd.increment("rpc.outgoing", 1);

        match self.statsd.time("rpc.latency", self.app.call(rpc)).await {
            Ok(result) => {
                self.statsd.increment("rpc.success", 1);
                Ok(result)
            }
            Err(err) => {
                self.statsd.increment("rpc.error", 1);
                self.statsd.increment(error_bucket(&err), 1);
                Err(err)
            }
        }
    }
}
