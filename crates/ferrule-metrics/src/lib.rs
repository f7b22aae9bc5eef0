//! Ferrule Metrics
//!
//! This crate defines the sink every ferrule component reports to and two
//! implementations of it.
//!
//! # Architecture
//!
//! - [`Statsd`]: the sink interface (`increment`, `gauge`, `timing`, plus the
//!   `time` helper that times a future)
//! - [`NullStatsd`]: the default sink, discards everything
//! - [`MetricsRegistry`]: thread-safe in-memory sink with lock-free counters
//!   and latency histograms, readable through [`MetricsSnapshot`]
//!
//! # Usage Example
//!
//! ```rust
//! use ferrule_metrics::{MetricsRegistry, Statsd};
//! use std::time::Duration;
//!
//! let registry = MetricsRegistry::new();
//! registry.increment("rpc.outgoing", 1);
//! registry.gauge("thread_pool.in_use", 0.25);
//! registry.timing("rpc.latency", Duration::from_micros(150));
//!
//! let snapshot = registry.snapshot();
//! assert_eq!(snapshot.counters["rpc.outgoing"], 1);
//! assert_eq!(snapshot.timers["rpc.latency"].count, 1);
//! ```
//!
//! # Thread Safety
//!
//! Sinks are shared by every pooled pipeline of a client, so all of them are
//! `Send + Sync`. The registry uses atomics for the hot path and `RwLock`
//! only to register new metric names.

mod registry;
mod snapshot;
mod statsd;

pub use registry::MetricsRegistry;
pub use snapshot::{MetricsSnapshot, TimerMetrics};
pub use statsd::{NullStatsd, SharedStatsd, Statsd};
