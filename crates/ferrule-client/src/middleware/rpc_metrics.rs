use super::{BoxHandler, Handler, Layer};
use async_trait::async_trait;
use ferrule_common::{Result, Rpc, RpcError, RpcResult};
use ferrule_metrics::SharedStatsd;

/// Per-operation call metrics.
///
/// Same shape as [`ClientMetrics`](super::ClientMetrics) but keyed under
/// `rpc.<name>.`. Transport, protocol and application failures carrying a
/// sub-kind code are counted under it, e.g.
/// `rpc.get_user.error.transport.not_open`.
#[derive(Clone)]
pub struct RpcMetrics {
    statsd: SharedStatsd,
}

impl RpcMetrics {
    pub fn new(statsd: SharedStatsd) -> Self {
        Self { statsd }
    }
}

impl Layer for RpcMetrics {
    fn layer(&self, app: BoxHandler) -> BoxHandler {
        Box::new(RpcMetricsHandler {
            statsd: self.statsd.clone(),
            app,
        })
    }
}

struct RpcMetricsHandler {
    statsd: SharedStatsd,
    app: BoxHandler,
}

/// Error key suffix, without the `rpc.<name>.error.` prefix.
fn error_suffix(err: &RpcError) -> String {
    fn with_code(bucket: &str, code: Option<&str>) -> String {
        match code {
            Some(code) => format!("{}.{}", bucket, code),
            None => bucket.to_string(),
        }
    }

    match err {
        RpcError::Transport { kind, .. } => with_code("transport", kind.map(|k| k.code())),
        RpcError::Protocol { kind, .. } => with_code("protocol", kind.map(|k| k.code())),
        RpcError::Application { kind, .. } => with_code("application", kind.map(|k| k.code())),
        RpcError::Timeout(_) => "timeout".to_string(),
        RpcError::Retry { .. } => "retry".to_string(),
        _ => "other".to_string(),
    }
}

#[async_trait]
impl Handler for RpcMetricsHandler {
    async fn call(&self, rpc: Rpc) -> Result<RpcResult> {
        let prefix = format!("rpc.{}", rpc.name);
        self.statsd.increment(&format!("{}.outgoing", prefix), 1);

        let latency_key = format!("{}.latency", prefix);
        match self.statsd.time(&latency_key, self.app.call(rpc)).await {
            Ok(result) => {
                self.statsd.increment(&format!("{}.success", prefix), 1);
                Ok(result)
            }
            Err(err) => {
                self.statsd.increment(&format!("{}.error", prefix), 1);
                self.statsd
                    .increment(&format!("{}.error.{}", prefix, error_suffix(&err)), 1);
                Err(err)
            }
        }
    }
}
