use super::{BoxHandler, Handler, Layer};
use async_trait::async_trait;
use ferrule_common::{ClientError, ErrorClass, Result, Rpc, RpcError, RpcResult};
use std::sync::Arc;

/// Classes every [`ErrorWrapping`] stage normalizes.
pub const WRAPPED_ERRORS: [ErrorClass; 5] = [
    ErrorClass::Transport,
    ErrorClass::Protocol,
    ErrorClass::Application,
    ErrorClass::Timeout,
    ErrorClass::Io(None),
];

/// Normalizes transport-level failures into [`RpcError::Client`].
///
/// Errors of the built-in classes (transport, protocol, application,
/// timeouts and OS errors) plus any caller-supplied extras are replaced by
/// a [`ClientError`] carrying the original class name and message. Other
/// errors pass through unchanged.
#[derive(Debug, Clone, Default)]
pub struct ErrorWrapping {
    extras: Arc<Vec<ErrorClass>>,
}

impl ErrorWrapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also wraps errors of the given classes.
    pub fn with_extras(extras: impl IntoIterator<Item = ErrorClass>) -> Self {
        Self {
            extras: Arc::new(extras.into_iter().collect()),
        }
    }

    fn wraps(&self, err: &RpcError) -> bool {
        ErrorClass::any_matches(&WRAPPED_ERRORS, err) || ErrorClass::any_matches(&self.extras, err)
    }
}

impl Layer for ErrorWrapping {
    fn layer(&self, app: BoxHandler) -> BoxHandler {
        Box::new(ErrorWrappingHandler {
            wrapping: self.clone(),
            app,
        })
    }
}

struct ErrorWrappingHandler {
    wrapping: ErrorWrapping,
    app: BoxHandler,
}

#[async_trait]
impl Handler for ErrorWrappingHandler {
    async fn call(&self, rpc: Rpc) -> Result<RpcResult> {
        self.app.call(rpc).await.map_err(|err| {
            if self.wrapping.wraps(&err) {
                RpcError::Client(ClientError::wrap(&err))
            } else {
                err
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{handler_fn, MiddlewareStack};
    use ferrule_common::TransportErrorKind;
    use serde_json::json;
    use std::io;

    fn failing_with(make: fn() -> RpcError, wrapping: ErrorWrapping) -> crate::middleware::Pipeline {
        let mut stack = MiddlewareStack::new();
        stack.push(wrapping).unwrap();
        stack
            .finalize(Box::new(handler_fn(move |_rpc: Rpc| async move { Err::<RpcResult, _>(make()) })))
            .unwrap()
    }

    #[tokio::test]
    async fn test_wraps_transport_error() {
        let pipeline = failing_with(
            || RpcError::transport(TransportErrorKind::NotOpen, "socket closed"),
            ErrorWrapping::new(),
        );

        let err = pipeline.call(Rpc::new("op", vec![])).await.unwrap_err();
        match err {
            RpcError::Client(client) => {
                assert_eq!(client.class, "TransportError");
                assert_eq!(client.message, "socket closed");
            }
            other => panic!("expected ClientError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wraps_os_errors() {
        let pipeline = failing_with(
            || RpcError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")),
            ErrorWrapping::new(),
        );

        let err = pipeline.call(Rpc::new("op", vec![])).await.unwrap_err();
        assert!(matches!(err, RpcError::Client(_)));
    }

    #[tokio::test]
    async fn test_passes_service_errors_through() {
        let pipeline = failing_with(
            || RpcError::service("UserNotFound", "no such user"),
            ErrorWrapping::new(),
        );

        let err = pipeline.call(Rpc::new("op", vec![])).await.unwrap_err();
        assert!(matches!(err, RpcError::Service { .. }));
    }

    #[tokio::test]
    async fn test_wraps_extra_classes() {
        let pipeline = failing_with(
            || RpcError::service("UserNotFound", "no such user"),
            ErrorWrapping::with_extras([ErrorClass::Service("UserNotFound".into())]),
        );

        let err = pipeline.call(Rpc::new("op", vec![])).await.unwrap_err();
        assert_eq!(err.to_string(), "UserNotFound: no such user");
        assert!(matches!(err, RpcError::Client(_)));
    }

    #[tokio::test]
    async fn test_success_is_untouched() {
        let mut stack = MiddlewareStack::new();
        stack.push(ErrorWrapping::new()).unwrap();
        let pipeline = stack
            .finalize(Box::new(handler_fn(|_rpc: Rpc| async { Ok(json!("ok")) })))
            .unwrap();

        assert_eq!(pipeline.call(Rpc::new("op", vec![])).await.unwrap(), json!("ok"));
    }
}
