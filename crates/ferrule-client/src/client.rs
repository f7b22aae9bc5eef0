use crate::config::Configuration;
use crate::dispatch::{DirectDispatcher, Dispatcher};
use crate::middleware::{BoxHandler, ClientMetrics, Layer, MiddlewareStack, Pipeline, RpcMetrics};
use crate::pool::{InstrumentedPool, MAX_POOL_SIZE};
use crate::surface::derive_rpcs;
use async_trait::async_trait;
use ferrule_common::{
    Endpoint, Result, Rpc, RpcArgs, RpcError, RpcResult, ServiceClient, ServiceDescription,
};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Anything that can invoke the operations of an RPC surface.
///
/// Implemented by [`Client`] and by the retry proxy, so typed wrappers
/// generated with [`rpc_client!`](crate::rpc_client) work over either.
#[async_trait]
pub trait Invoke: Send + Sync {
    /// Operation names this invoker accepts.
    fn rpcs(&self) -> &[String];

    async fn call(&self, name: &str, args: RpcArgs) -> Result<RpcResult>;

    fn responds_to(&self, name: &str) -> bool {
        self.rpcs().iter().any(|rpc| rpc == name)
    }
}

/// A client type built from a service description.
///
/// Holds the derived RPC surface and the configuration every client of
/// this class is built with. Cloning yields a handle to the same class;
/// use [`derive`](Self::derive) for a class with its own configuration.
///
/// # Example
///
/// ```rust,no_run
/// use ferrule_client::{ClientClass, ErrorWrapping};
/// # use ferrule_common::ServiceDescription;
/// # use std::sync::Arc;
/// # fn service() -> Arc<dyn ServiceDescription> { unimplemented!() }
///
/// # fn main() -> Result<(), ferrule_common::RpcError> {
/// let users = ClientClass::build_with(service(), |class| {
///     class.configure(|config| config.uri = Some("tcp://localhost:9090".into()));
///     class.use_middleware(ErrorWrapping::new())
/// })?;
///
/// let client = users.connect()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ClientClass {
    inner: Arc<ClassInner>,
}

struct ClassInner {
    service: Arc<dyn ServiceDescription>,
    rpcs: Arc<[String]>,
    config: RwLock<Configuration>,
}

impl ClientClass {
    /// Builds a class with the surface derived from `service` and a
    /// default configuration.
    pub fn build(service: Arc<dyn ServiceDescription>) -> Self {
        let rpcs: Arc<[String]> = derive_rpcs(service.methods()).into();
        tracing::debug!(service = service.name(), rpcs = rpcs.len(), "Built client class");

        Self {
            inner: Arc::new(ClassInner {
                service,
                rpcs,
                config: RwLock::new(Configuration::default()),
            }),
        }
    }

    /// Builds a class and runs `customize` against it.
    pub fn build_with<F>(service: Arc<dyn ServiceDescription>, customize: F) -> Result<Self>
    where
        F: FnOnce(&ClientClass) -> Result<()>,
    {
        let class = Self::build(service);
        customize(&class)?;
        Ok(class)
    }

    /// A new class with the same surface and a fresh default configuration.
    pub fn derive(&self) -> Self {
        Self {
            inner: Arc::new(ClassInner {
                service: self.inner.service.clone(),
                rpcs: self.inner.rpcs.clone(),
                config: RwLock::new(Configuration::default()),
            }),
        }
    }

    pub fn service(&self) -> &Arc<dyn ServiceDescription> {
        &self.inner.service
    }

    pub fn rpcs(&self) -> &[String] {
        &self.inner.rpcs
    }

    fn read_config(&self) -> RwLockReadGuard<'_, Configuration> {
        self.inner
            .config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_config(&self) -> RwLockWriteGuard<'_, Configuration> {
        self.inner
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mutates the class configuration. Clients already built keep the
    /// configuration they were built with.
    pub fn configure<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Configuration) -> R,
    {
        f(&mut self.write_config())
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Configuration {
        self.read_config().clone()
    }

    /// Appends a middleware layer to the class stack.
    pub fn use_middleware<L>(&self, layer: L) -> Result<()>
    where
        L: Layer + 'static,
    {
        self.write_config().use_middleware(layer)?;
        Ok(())
    }

    /// Builds a network client for the configured uri.
    ///
    /// # Errors
    ///
    /// [`RpcError::Config`] if the uri is missing, has no port, or the pool
    /// size is zero.
    pub fn connect(&self) -> Result<Client> {
        let config = self.config();
        let endpoint = config.endpoint()?;

        tracing::debug!(
            service = self.inner.service.name(),
            endpoint = %endpoint,
            pool_size = config.pool_size,
            "Connecting client"
        );

        Client::new(
            self.inner.rpcs.clone(),
            config,
            Target::Network {
                service: self.inner.service.clone(),
                endpoint,
            },
        )
    }

    /// Builds a client that dispatches to an in-process implementation.
    ///
    /// No uri is needed; the middleware stack and metrics still apply.
    pub fn direct(&self, implementation: Arc<dyn ServiceClient>) -> Result<Client> {
        Client::new(self.inner.rpcs.clone(), self.config(), Target::Direct(implementation))
    }
}

/// Where the terminal stage of each pipeline sends calls.
#[derive(Clone)]
enum Target {
    Network {
        service: Arc<dyn ServiceDescription>,
        endpoint: Endpoint,
    },
    Direct(Arc<dyn ServiceClient>),
}

impl Target {
    fn dispatcher(&self, config: &Configuration) -> Result<BoxHandler> {
        match self {
            Target::Network { service, endpoint } => {
                let transport = config.transport.build(endpoint, config.rpc_timeout)?;
                let protocol = config.protocol.build(transport.clone());
                let client = service.client(protocol);
                Ok(Box::new(Dispatcher::new(transport, client, config.keep_alive)))
            }
            Target::Direct(implementation) => {
                Ok(Box::new(DirectDispatcher::new(implementation.clone())))
            }
        }
    }
}

/// Compiles the pipeline of one pool slot.
///
/// Metrics stages go after the application stack, next to the dispatcher,
/// so they exclude time spent in application middleware.
fn build_pipeline(config: &Configuration, target: &Target) -> Result<Pipeline> {
    let mut stack = MiddlewareStack::new();
    stack
        .push_stack(&config.stack)?
        .push(ClientMetrics::new(config.statsd.clone()))?
        .push(RpcMetrics::new(config.statsd.clone()))?;

    stack.finalize(target.dispatcher(config)?)
}

/// A client instance: one pool of pipelines over a configuration snapshot.
///
/// Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    rpcs: Arc<[String]>,
    config: Arc<Configuration>,
    pool: InstrumentedPool<Pipeline>,
}

impl Client {
    fn new(rpcs: Arc<[String]>, config: Configuration, target: Target) -> Result<Self> {
        if config.pool_size == 0 || config.pool_size > MAX_POOL_SIZE {
            return Err(RpcError::Config(format!(
                "pool_size must be between 1 and {}, got {}",
                MAX_POOL_SIZE, config.pool_size
            )));
        }

        let config = Arc::new(config);
        let pool = {
            let config = config.clone();
            InstrumentedPool::new(
                config.pool_size,
                config.pool_timeout,
                config.statsd.clone(),
                move || build_pipeline(&config, &target),
            )
        };

        Ok(Self {
            inner: Arc::new(ClientInner { rpcs, config, pool }),
        })
    }

    pub fn rpcs(&self) -> &[String] {
        &self.inner.rpcs
    }

    /// Configuration this client was built with.
    pub fn config(&self) -> &Configuration {
        &self.inner.config
    }

    pub fn pool(&self) -> &InstrumentedPool<Pipeline> {
        &self.inner.pool
    }

    /// Invokes operation `name`.
    ///
    /// # Errors
    ///
    /// [`RpcError::UnknownOperation`] if `name` is not on the surface,
    /// otherwise whatever the pipeline returns.
    pub async fn call(&self, name: &str, args: RpcArgs) -> Result<RpcResult> {
        if !Invoke::responds_to(self, name) {
            return Err(RpcError::UnknownOperation(name.to_string()));
        }
        self.invoke(Rpc::new(name, args)).await
    }

    /// Runs `rpc` through a pooled pipeline.
    pub async fn invoke(&self, rpc: Rpc) -> Result<RpcResult> {
        let pipeline = self.inner.pool.checkout().await?;
        pipeline.call(rpc).await
    }
}

#[async_trait]
impl Invoke for Client {
    fn rpcs(&self) -> &[String] {
        &self.inner.rpcs
    }

    async fn call(&self, name: &str, args: RpcArgs) -> Result<RpcResult> {
        Client::call(self, name, args).await
    }
}
