//! Client configuration.
//!
//! Every [`ClientClass`](crate::ClientClass) owns one [`Configuration`],
//! seeded with defaults when the class is built. Options can be set
//! directly or applied from a [`ClientSettings`] document, which accepts
//! numbers either as JSON numbers or as numeric strings (as they come out
//! of environment-driven config files).

use crate::middleware::{Layer, MiddlewareStack};
use crate::pool::MAX_POOL_SIZE;
use ferrule_common::transport::{StreamProtocolFactory, TcpTransportFactory};
use ferrule_common::{Endpoint, ProtocolFactory, Result, RpcError, TransportFactory};
use ferrule_metrics::{NullStatsd, SharedStatsd};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_POOL_SIZE: usize = 12;
pub const DEFAULT_POOL_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(2);

/// Options of one client class.
#[derive(Clone)]
pub struct Configuration {
    pub transport: Arc<dyn TransportFactory>,
    pub protocol: Arc<dyn ProtocolFactory>,
    /// Maximum number of pooled pipelines
    pub pool_size: usize,
    /// How long a call waits for a free pipeline
    pub pool_timeout: Duration,
    /// Target of network clients, e.g. `tcp://localhost:9090`
    pub uri: Option<String>,
    pub rpc_timeout: Duration,
    /// Keep transports open between calls
    pub keep_alive: bool,
    /// Application middleware, run before the metrics stages
    pub stack: MiddlewareStack,
    pub statsd: SharedStatsd,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            transport: Arc::new(TcpTransportFactory),
            protocol: Arc::new(StreamProtocolFactory),
            pool_size: DEFAULT_POOL_SIZE,
            pool_timeout: DEFAULT_POOL_TIMEOUT,
            uri: None,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            keep_alive: true,
            stack: MiddlewareStack::new(),
            statsd: Arc::new(NullStatsd),
        }
    }
}

impl Configuration {
    /// Appends a middleware layer to the class stack.
    pub fn use_middleware<L>(&mut self, layer: L) -> Result<&mut Self>
    where
        L: Layer + 'static,
    {
        self.stack.push(layer)?;
        Ok(self)
    }

    /// Overrides every option present in `settings`.
    ///
    /// Every value is checked before any is applied, so a rejected document
    /// leaves the configuration untouched.
    pub fn apply(&mut self, settings: &ClientSettings) -> Result<()> {
        let pool_size = settings
            .pool_size
            .as_ref()
            .map(|size| size.to_pool_size("pool_size"))
            .transpose()?;
        let pool_timeout = settings
            .pool_timeout
            .as_ref()
            .map(|timeout| timeout.to_duration("pool_timeout"))
            .transpose()?;
        let rpc_timeout = settings
            .rpc_timeout
            .as_ref()
            .map(|timeout| timeout.to_duration("rpc_timeout"))
            .transpose()?;

        if let Some(pool_size) = pool_size {
            self.pool_size = pool_size;
        }
        if let Some(timeout) = pool_timeout {
            self.pool_timeout = timeout;
        }
        if let Some(timeout) = rpc_timeout {
            self.rpc_timeout = timeout;
        }
        if let Some(uri) = &settings.uri {
            self.uri = Some(uri.clone());
        }
        if let Some(keep_alive) = settings.keep_alive {
            self.keep_alive = keep_alive;
        }
        Ok(())
    }

    /// Endpoint of the configured uri.
    ///
    /// # Errors
    ///
    /// [`RpcError::Config`] if no uri is set, or it has no host or port.
    pub fn endpoint(&self) -> Result<Endpoint> {
        let uri = self.uri.as_deref().ok_or_else(|| {
            RpcError::Config("config.uri not set: no target address configured".to_string())
        })?;
        Endpoint::parse(uri)
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("transport", &self.transport.name())
            .field("protocol", &self.protocol.name())
            .field("pool_size", &self.pool_size)
            .field("pool_timeout", &self.pool_timeout)
            .field("uri", &self.uri)
            .field("rpc_timeout", &self.rpc_timeout)
            .field("keep_alive", &self.keep_alive)
            .field("stack", &self.stack)
            .finish()
    }
}

/// A number given either as a JSON number or a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn to_f64(&self, field: &str) -> Result<f64> {
        let value = match self {
            Numeric::Number(n) => *n,
            Numeric::Text(text) => text.trim().parse::<f64>().map_err(|_| {
                RpcError::Config(format!("{} must be numeric, got '{}'", field, text))
            })?,
        };
        if !value.is_finite() || value < 0.0 {
            return Err(RpcError::Config(format!(
                "{} must be a non-negative number, got {}",
                field, value
            )));
        }
        Ok(value)
    }

    /// Interprets the value as seconds.
    fn to_duration(&self, field: &str) -> Result<Duration> {
        Duration::try_from_secs_f64(self.to_f64(field)?).map_err(|e| {
            RpcError::Config(format!("{} is not a usable timeout: {}", field, e))
        })
    }

    /// Interprets the value as a pool size in `1..=MAX_POOL_SIZE`.
    fn to_pool_size(&self, field: &str) -> Result<usize> {
        let size = self.to_f64(field)?;
        if size < 1.0 || size.fract() != 0.0 || size > MAX_POOL_SIZE as f64 {
            return Err(RpcError::Config(format!(
                "{} must be an integer between 1 and {}, got {}",
                field, MAX_POOL_SIZE, self
            )));
        }
        Ok(size as usize)
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Numeric::Number(n) => write!(f, "{}", n),
            Numeric::Text(text) => f.write_str(text),
        }
    }
}

/// Serializable subset of [`Configuration`].
///
/// Timeouts are in seconds.
///
/// ```
/// use ferrule_client::{ClientSettings, Configuration};
/// use std::time::Duration;
///
/// let settings = ClientSettings::from_json(
///     r#"{"uri": "tcp://localhost:9090", "pool_size": "4", "rpc_timeout": 0.5}"#,
/// ).unwrap();
///
/// let mut config = Configuration::default();
/// config.apply(&settings).unwrap();
/// assert_eq!(config.pool_size, 4);
/// assert_eq!(config.rpc_timeout, Duration::from_millis(500));
/// assert_eq!(config.pool_timeout, Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_size: Option<Numeric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_timeout: Option<Numeric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_timeout: Option<Numeric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<bool>,
}

impl ClientSettings {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| RpcError::Config(format!("Invalid client settings: {}", e)))
    }
}
