use super::{BoxHandler, Handler, Layer};
use async_trait::async_trait;
use ferrule_common::{Result, Rpc, RpcError, RpcResult};
use serde_json::Value;
use std::sync::Arc;

/// A pluggable check for structured RPC data.
///
/// Implementations report a violation as an [`RpcError::Protocol`]; the
/// [`Validation`] stage turns that into an [`RpcError::Validation`] naming
/// the operation. Closures `Fn(&Value) -> Result<()>` are validators.
pub trait Validator: Send + Sync {
    fn validate(&self, value: &Value) -> Result<()>;
}

impl<F> Validator for F
where
    F: Fn(&Value) -> Result<()> + Send + Sync,
{
    fn validate(&self, value: &Value) -> Result<()> {
        self(value)
    }
}

/// Validates structured arguments before the call and structured results
/// after it.
///
/// Only JSON objects are structured; scalars pass unchecked. An array
/// result is checked element by element.
#[derive(Clone)]
pub struct Validation {
    validator: Arc<dyn Validator>,
}

impl Validation {
    pub fn new<V>(validator: V) -> Self
    where
        V: Validator + 'static,
    {
        Self {
            validator: Arc::new(validator),
        }
    }
}

impl Layer for Validation {
    fn layer(&self, app: BoxHandler) -> BoxHandler {
        Box::new(ValidationHandler {
            validator: self.validator.clone(),
            app,
        })
    }
}

struct ValidationHandler {
    validator: Arc<dyn Validator>,
    app: BoxHandler,
}

impl ValidationHandler {
    fn check(&self, operation: &str, value: &Value) -> Result<()> {
        if !value.is_object() {
            return Ok(());
        }

        self.validator.validate(value).map_err(|err| match err {
            RpcError::Protocol { .. } => RpcError::Validation {
                operation: operation.to_string(),
                source: Box::new(err),
            },
            other => other,
        })
    }
}

#[async_trait]
impl Handler for ValidationHandler {
    async fn call(&self, rpc: Rpc) -> Result<RpcResult> {
        for arg in &rpc.args {
            self.check(&rpc.name, arg)?;
        }

        let operation = rpc.name.clone();
        let result = self.app.call(rpc).await?;

        match &result {
            Value::Array(items) => {
                for item in items {
                    self.check(&operation, item)?;
                }
            }
            other => self.check(&operation, other)?,
        }

        Ok(result)
    }
}
