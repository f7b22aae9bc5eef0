use ferrule_common::{Result, RpcError};
use ferrule_metrics::SharedStatsd;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Builds one pooled resource. Called lazily, at most once per slot.
pub type Builder<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

/// Bounded pool of lazily built resources, reporting its usage.
///
/// At most `size` resources are checked out at any time; a checkout waits
/// up to `timeout` for one to come back. Resources are built on demand the
/// first time a checkout finds no idle one, so a pool that never sees
/// concurrent callers builds a single resource.
///
/// # Metrics
///
/// - `thread_pool.size` (gauge) and `thread_pool.latency` (timer) on every checkout
/// - `thread_pool.checkout` / `thread_pool.checkin` counters
/// - `thread_pool.in_use` (gauge): fraction of slots checked out, two decimals
/// - `thread_pool.timeout` counter when a checkout gives up
///
/// # Example
///
/// ```rust
/// use ferrule_client::pool::InstrumentedPool;
/// use ferrule_metrics::{MetricsRegistry, SharedStatsd};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = Arc::new(MetricsRegistry::new());
/// let statsd: SharedStatsd = registry.clone();
/// let pool = InstrumentedPool::new(5, Duration::from_secs(1), statsd, || Ok(String::from("conn")));
///
/// let conn = pool.checkout().await?;
/// assert_eq!(*conn, "conn");
/// assert_eq!(registry.gauge_value("thread_pool.in_use"), Some(0.2));
///
/// conn.checkin();
/// assert_eq!(registry.gauge_value("thread_pool.in_use"), Some(0.0));
/// # Ok(())
/// # }
/// ```
pub struct InstrumentedPool<T> {
    inner: Arc<PoolInner<T>>,
}

struct PoolInner<T> {
    size: usize,
    timeout: Duration,
    semaphore: Arc<Semaphore>,
    slots: Mutex<Slots<T>>,
    builder: Builder<T>,
    statsd: SharedStatsd,
}

struct Slots<T> {
    idle: Vec<T>,
    created: usize,
}

impl<T> PoolInner<T> {
    fn slots(&self) -> MutexGuard<'_, Slots<T>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `1 - available / size`, where never-built slots count as available.
    fn in_use(&self, slots: &Slots<T>) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        let available = (self.size - slots.created) + slots.idle.len();
        let ratio = 1.0 - available as f64 / self.size as f64;
        (ratio * 100.0).round() / 100.0
    }

    fn report_in_use(&self) {
        let in_use = self.in_use(&self.slots());
        self.statsd.gauge("thread_pool.in_use", in_use);
    }

    fn checkin(&self, resource: T) {
        self.slots().idle.push(resource);
        self.statsd.increment("thread_pool.checkin", 1);
        self.report_in_use();
    }
}

/// Largest pool a single semaphore can bound.
pub const MAX_POOL_SIZE: usize = Semaphore::MAX_PERMITS;

impl<T> InstrumentedPool<T> {
    /// # Panics
    ///
    /// If `size` exceeds [`MAX_POOL_SIZE`].
    pub fn new<F>(size: usize, timeout: Duration, statsd: SharedStatsd, builder: F) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(PoolInner {
                size,
                timeout,
                semaphore: Arc::new(Semaphore::new(size)),
                slots: Mutex::new(Slots {
                    idle: Vec::new(),
                    created: 0,
                }),
                builder: Box::new(builder),
                statsd,
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Number of resources built so far.
    pub fn created(&self) -> usize {
        self.inner.slots().created
    }

    /// Current fraction of slots checked out.
    pub fn in_use(&self) -> f64 {
        self.inner.in_use(&self.inner.slots())
    }

    /// Checks out a resource, building one if none is idle.
    ///
    /// # Errors
    ///
    /// - [`RpcError::PoolTimeout`] if no resource comes back within the
    ///   pool timeout; the builder is not called in that case
    /// - whatever the builder returns; the slot stays free
    pub async fn checkout(&self) -> Result<PoolGuard<T>> {
        let inner = &self.inner;
        inner.statsd.gauge("thread_pool.size", inner.size as f64);

        let checkout = async {
            let acquire = inner.semaphore.clone().acquire_owned();
            let permit = match tokio::time::timeout(inner.timeout, acquire).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_closed)) => {
                    return Err(RpcError::Config("Connection pool is closed".to_string()));
                }
                Err(_elapsed) => {
                    inner.statsd.increment("thread_pool.timeout", 1);
                    tracing::warn!(
                        size = inner.size,
                        timeout = ?inner.timeout,
                        "Pool checkout timed out"
                    );
                    return Err(RpcError::PoolTimeout(inner.timeout));
                }
            };
            let resource = self.take_or_build()?;
            Ok::<_, RpcError>((permit, resource))
        };
        let (permit, resource) = inner.statsd.time("thread_pool.latency", checkout).await?;

        inner.statsd.increment("thread_pool.checkout", 1);
        inner.report_in_use();

        Ok(PoolGuard {
            resource: Some(resource),
            pool: inner.clone(),
            _permit: permit,
        })
    }

    fn take_or_build(&self) -> Result<T> {
        let inner = &self.inner;
        {
            let mut slots = inner.slots();
            if let Some(resource) = slots.idle.pop() {
                return Ok(resource);
            }
            // A permit with no idle resource means an unbuilt slot is left
            slots.created += 1;
        }

        tracing::debug!(size = inner.size, "Building pooled resource");
        match (inner.builder)() {
            Ok(resource) => Ok(resource),
            Err(err) => {
                inner.slots().created -= 1;
                tracing::debug!(error = %err, "Failed to build pooled resource");
                Err(err)
            }
        }
    }
}

impl<T> Clone for InstrumentedPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// A checked-out resource. Returned to the pool when dropped.
pub struct PoolGuard<T> {
    resource: Option<T>,
    pool: Arc<PoolInner<T>>,
    _permit: OwnedSemaphorePermit,
}

impl<T> PoolGuard<T> {
    /// Returns the resource to the pool.
    pub fn checkin(self) {
        drop(self);
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for PoolGuard<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolGuard")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl<T> Deref for PoolGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `drop` takes the resource out
        match &self.resource {
            Some(resource) => resource,
            None => unreachable!("pooled resource already checked in"),
        }
    }
}

impl<T> DerefMut for PoolGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.resource {
            Some(resource) => resource,
            None => unreachable!("pooled resource already checked in"),
        }
    }
}

impl<T> Drop for PoolGuard<T> {
    fn drop(&mut self) {
        // Return the resource before the permit is released
        if let Some(resource) = self.resource.take() {
            self.pool.checkin(resource);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrule_metrics::MetricsRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_pool(
        size: usize,
        timeout: Duration,
        registry: &Arc<MetricsRegistry>,
    ) -> (InstrumentedPool<usize>, Arc<AtomicUsize>) {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let pool = InstrumentedPool::new(size, timeout, registry.clone(), move || {
            Ok(counter.fetch_add(1, Ordering::SeqCst))
        });
        (pool, builds)
    }

    #[tokio::test]
    async fn test_checkout_metrics() {
        let registry = Arc::new(MetricsRegistry::new());
        let (pool, _) = counting_pool(5, Duration::from_secs(1), &registry);

        let guard = pool.checkout().await.unwrap();

        assert_eq!(registry.gauge_value("thread_pool.size"), Some(5.0));
        assert_eq!(registry.timer_count("thread_pool.latency"), 1);
        assert_eq!(registry.counter("thread_pool.checkout"), 1);
        assert_eq!(registry.gauge_value("thread_pool.in_use"), Some(0.2));

        guard.checkin();

        assert_eq!(registry.counter("thread_pool.checkin"), 1);
        assert_eq!(registry.gauge_value("thread_pool.in_use"), Some(0.0));
    }

    #[tokio::test]
    async fn test_latency_includes_lazy_build() {
        let registry = Arc::new(MetricsRegistry::new());
        let pool = InstrumentedPool::new(1, Duration::from_secs(1), registry.clone(), || {
            std::thread::sleep(Duration::from_millis(30));
            Ok(())
        });

        let _guard = pool.checkout().await.unwrap();

        let snapshot = registry.snapshot();
        let latency = &snapshot.timers["thread_pool.latency"];
        assert_eq!(latency.count, 1);
        assert!(latency.avg_us >= 30_000, "avg {}us", latency.avg_us);
    }

    #[tokio::test]
    async fn test_resources_are_reused() {
        let registry = Arc::new(MetricsRegistry::new());
        let (pool, builds) = counting_pool(3, Duration::from_secs(1), &registry);

        for _ in 0..5 {
            let guard = pool.checkout().await.unwrap();
            assert_eq!(*guard, 0);
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(pool.created(), 1);
    }

    #[tokio::test]
    async fn test_builds_up_to_size() {
        let registry = Arc::new(MetricsRegistry::new());
        let (pool, builds) = counting_pool(3, Duration::from_millis(50), &registry);

        let a = pool.checkout().await.unwrap();
        let b = pool.checkout().await.unwrap();
        let c = pool.checkout().await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 3);
        assert_eq!(pool.in_use(), 1.0);

        let mut seen = vec![*a, *b, *c];
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_timeout_does_not_build() {
        let registry = Arc::new(MetricsRegistry::new());
        let (pool, builds) = counting_pool(1, Duration::from_millis(20), &registry);

        let _held = pool.checkout().await.unwrap();
        let err = pool.checkout().await.unwrap_err();

        assert!(matches!(err, RpcError::PoolTimeout(timeout) if timeout == Duration::from_millis(20)));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(registry.counter("thread_pool.timeout"), 1);
        assert_eq!(registry.counter("thread_pool.checkout"), 1);
    }

    #[tokio::test]
    async fn test_waiting_checkout_gets_returned_resource() {
        let registry = Arc::new(MetricsRegistry::new());
        let (pool, builds) = counting_pool(1, Duration::from_secs(1), &registry);

        let held = pool.checkout().await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move {
                let guard = pool.checkout().await.unwrap();
                *guard
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert_eq!(waiter.await.unwrap(), 0);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_builder_failure_frees_slot() {
        let registry = Arc::new(MetricsRegistry::new());
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let pool = InstrumentedPool::new(1, Duration::from_millis(50), registry.clone(), move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RpcError::Config("no address".into()))
            } else {
                Ok("built")
            }
        });

        assert!(matches!(pool.checkout().await, Err(RpcError::Config(_))));
        assert_eq!(pool.created(), 0);

        let guard = pool.checkout().await.unwrap();
        assert_eq!(*guard, "built");
        assert_eq!(registry.counter("thread_pool.checkout"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_stay_bounded() {
        let registry = Arc::new(MetricsRegistry::new());
        let (pool, builds) = counting_pool(2, Duration::from_secs(2), &registry);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let pool = pool.clone();
                let active = active.clone();
                let peak = peak.clone();
                async move {
                    let _guard = pool.checkout().await.unwrap();
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .collect();

        futures::future::join_all(tasks).await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(builds.load(Ordering::SeqCst) <= 2);
        assert_eq!(registry.counter("thread_pool.checkout"), 10);
        assert_eq!(registry.counter("thread_pool.checkin"), 10);
    }
}
