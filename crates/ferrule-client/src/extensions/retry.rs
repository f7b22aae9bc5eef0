//! Retrying calls.
//!
//! [`Client::with_retry`] wraps a client in a [`RetryProxy`] that repeats
//! a failed call while the failure is retriable, sleeping a fixed interval
//! between attempts. Every retriable failure increments
//! `rpc.<name>.retry` on the client's metrics sink. When the attempts run
//! out the last failure is returned inside [`RpcError::Retry`].

use crate::client::{Client, Invoke};
use async_trait::async_trait;
use ferrule_common::{ErrorClass, Result, Rpc, RpcArgs, RpcError, RpcResult};
use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;

pub const DEFAULT_TRIES: u32 = 5;
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(10);

/// Failures retried by every proxy, on top of caller-supplied classes.
pub const DEFAULT_RETRIABLE_ERRORS: [ErrorClass; 11] = [
    ErrorClass::Client,
    ErrorClass::Transport,
    ErrorClass::Protocol,
    ErrorClass::Application,
    ErrorClass::Timeout,
    ErrorClass::PoolTimeout,
    ErrorClass::Io(Some(ErrorKind::ConnectionRefused)),
    ErrorClass::Io(Some(ErrorKind::AddrNotAvailable)),
    ErrorClass::Io(Some(ErrorKind::HostUnreachable)),
    ErrorClass::Io(Some(ErrorKind::NetworkUnreachable)),
    ErrorClass::Io(Some(ErrorKind::TimedOut)),
];

/// How a [`RetryProxy`] retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    /// Total attempts per call
    pub tries: u32,
    /// Pause between attempts
    pub interval: Duration,
    /// Additional retriable classes
    pub retriable: Vec<ErrorClass>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            tries: DEFAULT_TRIES,
            interval: DEFAULT_INTERVAL,
            retriable: Vec::new(),
        }
    }
}

impl RetryOptions {
    pub fn tries(mut self, tries: u32) -> Self {
        self.tries = tries;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn retriable(mut self, classes: impl IntoIterator<Item = ErrorClass>) -> Self {
        self.retriable.extend(classes);
        self
    }
}

/// A client whose calls are retried.
#[derive(Clone)]
pub struct RetryProxy {
    client: Client,
    tries: u32,
    interval: Duration,
    retriable: Vec<ErrorClass>,
}

impl RetryProxy {
    pub fn new(client: Client, options: RetryOptions) -> Self {
        let mut retriable = DEFAULT_RETRIABLE_ERRORS.to_vec();
        retriable.extend(options.retriable);

        Self {
            client,
            tries: options.tries,
            interval: options.interval,
            retriable,
        }
    }

    pub fn tries(&self) -> u32 {
        self.tries
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn retriable(&self) -> &[ErrorClass] {
        &self.retriable
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Invokes `name`, retrying retriable failures.
    ///
    /// # Errors
    ///
    /// - [`RpcError::UnknownOperation`] if `name` is not on the surface
    /// - [`RpcError::Retry`] once `tries` attempts failed with retriable errors
    /// - any non-retriable error, immediately
    pub async fn call(&self, name: &str, args: RpcArgs) -> Result<RpcResult> {
        if !Invoke::responds_to(&self.client, name) {
            return Err(RpcError::UnknownOperation(name.to_string()));
        }

        let statsd = &self.client.config().statsd;
        let metric = format!("rpc.{}.retry", name);
        let mut counter = 0;

        loop {
            counter += 1;

            let err = match self.client.invoke(Rpc::new(name, args.clone())).await {
                Ok(result) => return Ok(result),
                Err(err) => err,
            };

            if !ErrorClass::any_matches(&self.retriable, &err) {
                return Err(err);
            }

            statsd.increment(&metric, 1);

            if counter >= self.tries {
                return Err(RpcError::Retry {
                    tries: self.tries,
                    operation: name.to_string(),
                    source: Box::new(err),
                });
            }

            tracing::warn!(
                attempt = counter,
                tries = self.tries,
                operation = name,
                error = %err,
                interval = ?self.interval,
                "RPC failed, retrying"
            );
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[async_trait]
impl Invoke for RetryProxy {
    fn rpcs(&self) -> &[String] {
        self.client.rpcs()
    }

    async fn call(&self, name: &str, args: RpcArgs) -> Result<RpcResult> {
        RetryProxy::call(self, name, args).await
    }
}

impl Client {
    /// Wraps this client in a [`RetryProxy`].
    pub fn with_retry(&self, options: RetryOptions) -> RetryProxy {
        RetryProxy::new(self.clone(), options)
    }

    /// Runs `block` with a retrying proxy and returns its output.
    ///
    /// ```rust,no_run
    /// # use ferrule_client::{Client, RetryOptions};
    /// # use serde_json::json;
    /// # async fn example(client: Client) -> Result<(), ferrule_common::RpcError> {
    /// let user = client
    ///     .retrying(RetryOptions::default().tries(3), |proxy| async move {
    ///         proxy.call("get_user", vec![json!(1)]).await
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn retrying<F, Fut, T>(&self, options: RetryOptions, block: F) -> T
    where
        F: FnOnce(RetryProxy) -> Fut,
        Fut: Future<Output = T>,
    {
        block(self.with_retry(options)).await
    }
}
