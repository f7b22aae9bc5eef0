use crate::client::Invoke;
use async_trait::async_trait;

/// Health probe for services exposing a `ping` operation.
#[async_trait]
pub trait Ping: Invoke {
    /// Calls `ping`; `true` only if it returns without error.
    async fn up(&self) -> bool {
        match self.call("ping", Vec::new()).await {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(error = %err, "Ping failed");
                false
            }
        }
    }
}

impl<T: Invoke + ?Sized> Ping for T {}
