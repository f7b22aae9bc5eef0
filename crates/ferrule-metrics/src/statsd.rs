use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Metrics sink used by the pool, the metrics middleware and retries.
///
/// Implementations must be safe for concurrent use from every pooled
/// pipeline of a client.
pub trait Statsd: Send + Sync {
    /// Adds `amount` to the counter `key`.
    fn increment(&self, key: &str, amount: i64);

    /// Sets the gauge `key` to `value`.
    fn gauge(&self, key: &str, value: f64);

    /// Records one latency sample for the timer `key`.
    fn timing(&self, key: &str, elapsed: Duration);
}

pub type SharedStatsd = Arc<dyn Statsd>;

impl dyn Statsd {
    /// Runs `fut` and records how long it took under `key`.
    ///
    /// The output of the future is returned unchanged, errors included.
    pub async fn time<F, T>(&self, key: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let start = Instant::now();
        let output = fut.await;
        self.timing(key, start.elapsed());
        output
    }
}

/// Sink that discards every metric. The default when none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStatsd;

impl Statsd for NullStatsd {
    fn increment(&self, _key: &str, _amount: i64) {}

    fn gauge(&self, _key: &str, _value: f64) {}

    fn timing(&self, _key: &str, _elapsed: Duration) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetricsRegistry;

    #[tokio::test]
    async fn test_null_statsd_time_returns_block_result() {
        let statsd: SharedStatsd = Arc::new(NullStatsd);
        let result = statsd.time("rpc.latency", async { 42 }).await;
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn test_time_records_even_for_errors() {
        let registry = Arc::new(MetricsRegistry::new());
        let statsd: SharedStatsd = registry.clone();

        let result: Result<(), &str> = statsd.time("rpc.latency", async { Err("boom") }).await;

        assert!(result.is_err());
        assert_eq!(registry.timer_count("rpc.latency"), 1);
    }
}
