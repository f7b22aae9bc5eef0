use crate::snapshot::{MetricsSnapshot, TimerMetrics};
use crate::statsd::Statsd;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::{Duration, Instant};

const NUM_HISTOGRAM_BINS: usize = 100;

/// Logarithmic histogram for efficient percentile estimation.
///
/// Uses 100 bins covering the latency range from 1μs upward. Each decade
/// (power of 10) is divided into 10 bins, so resolution is finest at low
/// latencies where it matters most.
///
/// # Performance
///
/// - Lock-free recording using atomic operations
/// - O(1) recording, O(bins) percentile calculation
/// - Constant memory usage regardless of sample count
#[derive(Debug)]
struct LatencyHistogram {
    bins: [AtomicU64; NUM_HISTOGRAM_BINS],
    total_latency: AtomicU64,
    sample_count: AtomicU64,
}

impl LatencyHistogram {
    fn new() -> Self {
        let bins: [AtomicU64; NUM_HISTOGRAM_BINS] = std::array::from_fn(|_| AtomicU64::new(0));

        Self {
            bins,
            total_latency: AtomicU64::new(0),
            sample_count: AtomicU64::new(0),
        }
    }

    fn record(&self, latency_us: u64) {
        let bin = Self::latency_to_bin(latency_us);

        self.bins[bin].fetch_add(1, Ordering::Relaxed);
        self.total_latency.fetch_add(latency_us, Ordering::Relaxed);
        self.sample_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Maps a latency value to a histogram bin.
    fn latency_to_bin(latency_us: u64) -> usize {
        if latency_us == 0 {
            return 0;
        }

        let decade = latency_us.ilog10() as usize;
        let leading_digit = (latency_us / 10u64.pow(decade as u32)) as usize;

        (decade * 10 + leading_digit.min(9)).min(NUM_HISTOGRAM_BINS - 1)
    }

    /// Lower bound of a bin's range.
    fn bin_to_latency(bin: usize) -> u64 {
        if bin == 0 {
            return 1;
        }

        let decade = (bin / 10).min(19);
        let sub_bin = bin % 10;

        10u64.saturating_pow(decade as u32).saturating_mul(sub_bin.max(1) as u64)
    }

    /// Estimates the value at a given percentile (0-100), interpolating
    /// linearly within the bin that holds it.
    fn estimate_percentile(&self, percentile: u64) -> u64 {
        let total = self.sample_count.load(Ordering::Relaxed);
        if total == 0 {
            return 0;
        }

        let target_count = ((total * percentile) / 100).max(1);
        let mut cumulative_count = 0;

        for (bin_idx, bin) in self.bins.iter().enumerate() {
            let bin_count = bin.load(Ordering::Relaxed);
            if bin_count > 0 && cumulative_count + bin_count >= target_count {
                let bin_start = Self::bin_to_latency(bin_idx);
                let bin_end = Self::bin_to_latency(bin_idx + 1).max(bin_start);

                let offset_in_bin = target_count - cumulative_count;
                let fraction = offset_in_bin as f64 / bin_count as f64;
                let interpolated = bin_start as f64 + fraction * (bin_end - bin_start) as f64;

                return interpolated as u64;
            }
            cumulative_count += bin_count;
        }

        Self::bin_to_latency(NUM_HISTOGRAM_BINS)
    }

    fn snapshot(&self) -> TimerMetrics {
        let count = self.sample_count.load(Ordering::Relaxed);
        if count == 0 {
            return TimerMetrics::default();
        }

        TimerMetrics {
            count,
            avg_us: self.total_latency.load(Ordering::Relaxed) / count,
            p50_us: self.estimate_percentile(50),
            p95_us: self.estimate_percentile(95),
            p99_us: self.estimate_percentile(99),
        }
    }
}

/// Thread-safe in-memory metrics sink.
///
/// Counters, gauges and timers are registered on first use under a
/// `RwLock`; after that every update is a single atomic operation. Gauges
/// keep their last value only.
///
/// Useful as a sink in tests and for processes that expose their own
/// metrics endpoint from a [`MetricsSnapshot`].
///
/// # Example
///
/// ```rust
/// use ferrule_metrics::{MetricsRegistry, Statsd};
///
/// let registry = MetricsRegistry::new();
/// registry.increment("rpc.echo.retry", 1);
/// registry.increment("rpc.echo.retry", 1);
///
/// assert_eq!(registry.counter("rpc.echo.retry"), 2);
/// assert_eq!(registry.counter("rpc.never"), 0);
/// ```
#[derive(Debug)]
pub struct MetricsRegistry {
    counters: StdRwLock<HashMap<String, Arc<AtomicI64>>>,
    /// f64 values stored as raw bits
    gauges: StdRwLock<HashMap<String, Arc<AtomicU64>>>,
    timers: StdRwLock<HashMap<String, Arc<LatencyHistogram>>>,
    start_time: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: StdRwLock::new(HashMap::new()),
            gauges: StdRwLock::new(HashMap::new()),
            timers: StdRwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Current value of a counter, 0 if it was never incremented.
    pub fn counter(&self, key: &str) -> i64 {
        self.counters
            .read()
            .ok()
            .and_then(|counters| counters.get(key).map(|c| c.load(Ordering::Relaxed)))
            .unwrap_or(0)
    }

    /// Last value of a gauge, if it was ever set.
    pub fn gauge_value(&self, key: &str) -> Option<f64> {
        self.gauges
            .read()
            .ok()
            .and_then(|gauges| gauges.get(key).map(|g| f64::from_bits(g.load(Ordering::Relaxed))))
    }

    /// Number of samples recorded for a timer.
    pub fn timer_count(&self, key: &str) -> u64 {
        self.timers
            .read()
            .ok()
            .and_then(|timers| timers.get(key).map(|t| t.sample_count.load(Ordering::Relaxed)))
            .unwrap_or(0)
    }

    /// Milliseconds since the registry was created.
    pub fn uptime_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Drops every recorded metric.
    pub fn clear(&self) {
        if let Ok(mut counters) = self.counters.write() {
            counters.clear();
        }
        if let Ok(mut gauges) = self.gauges.write() {
            gauges.clear();
        }
        if let Ok(mut timers) = self.timers.write() {
            timers.clear();
        }
    }

    /// Takes a point-in-time snapshot of every metric.
    ///
    /// Counters are read with relaxed ordering, so values recorded
    /// concurrently with the snapshot may or may not be included.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters: BTreeMap<String, i64> = self
            .counters
            .read()
            .map(|counters| {
                counters
                    .iter()
                    .map(|(key, value)| (key.clone(), value.load(Ordering::Relaxed)))
                    .collect()
            })
            .unwrap_or_default();

        let gauges: BTreeMap<String, f64> = self
            .gauges
            .read()
            .map(|gauges| {
                gauges
                    .iter()
                    .map(|(key, value)| (key.clone(), f64::from_bits(value.load(Ordering::Relaxed))))
                    .collect()
            })
            .unwrap_or_default();

        let timers: BTreeMap<String, TimerMetrics> = self
            .timers
            .read()
            .map(|timers| {
                timers
                    .iter()
                    .map(|(key, histogram)| (key.clone(), histogram.snapshot()))
                    .collect()
            })
            .unwrap_or_default();

        MetricsSnapshot {
            uptime_ms: self.uptime_ms(),
            counters,
            gauges,
            timers,
        }
    }

    /// Looks up `key` in `map`, registering it with `init` on first use.
    fn entry<T>(
        map: &StdRwLock<HashMap<String, Arc<T>>>,
        key: &str,
        init: impl FnOnce() -> T,
    ) -> Option<Arc<T>> {
        // Fast path: read lock for existing entries
        if let Ok(entries) = map.read() {
            if let Some(entry) = entries.get(key) {
                return Some(entry.clone());
            }
        }

        match map.write() {
            Ok(mut entries) => Some(
                entries
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(init()))
                    .clone(),
            ),
            Err(_) => {
                tracing::warn!(key, "Metrics registry lock poisoned, dropping sample");
                None
            }
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Statsd for MetricsRegistry {
    fn increment(&self, key: &str, amount: i64) {
        if let Some(counter) = Self::entry(&self.counters, key, || AtomicI64::new(0)) {
            counter.fetch_add(amount, Ordering::Relaxed);
        }
    }

    fn gauge(&self, key: &str, value: f64) {
        if let Some(gauge) = Self::entry(&self.gauges, key, || AtomicU64::new(0)) {
            gauge.store(value.to_bits(), Ordering::Relaxed);
        }
    }

    fn timing(&self, key: &str, elapsed: Duration) {
        if let Some(histogram) = Self::entry(&self.timers, key, LatencyHistogram::new) {
            histogram.record(elapsed.as_micros() as u64);
        }
    }
}
