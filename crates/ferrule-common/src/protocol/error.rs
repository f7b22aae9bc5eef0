//! Ferrule error taxonomy.
//!
//! Every failure a caller can observe is an [`RpcError`]. Errors raised by
//! the transport layer carry an optional sub-kind code so metrics can break
//! them down further; everything else is a fixed variant consumed by
//! exhaustive matching.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Fine-grained transport failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    Unknown,
    NotOpen,
    AlreadyOpen,
    TimedOut,
    EndOfFile,
}

impl TransportErrorKind {
    /// Metric suffix for this code.
    pub fn code(&self) -> &'static str {
        match self {
            TransportErrorKind::Unknown => "unknown",
            TransportErrorKind::NotOpen => "not_open",
            TransportErrorKind::AlreadyOpen => "already_open",
            TransportErrorKind::TimedOut => "timeout",
            TransportErrorKind::EndOfFile => "eof",
        }
    }
}

/// Fine-grained protocol (decode) failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolErrorKind {
    Unknown,
    InvalidData,
    NegativeSize,
    SizeLimit,
    BadVersion,
    NotImplemented,
    DepthLimit,
}

impl ProtocolErrorKind {
    /// Metric suffix for this code.
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolErrorKind::Unknown => "unknown",
            ProtocolErrorKind::InvalidData => "invalid_data",
            ProtocolErrorKind::NegativeSize => "negative_size",
            ProtocolErrorKind::SizeLimit => "size_limit",
            ProtocolErrorKind::BadVersion => "bad_version",
            ProtocolErrorKind::NotImplemented => "not_implemented",
            ProtocolErrorKind::DepthLimit => "depth_limit",
        }
    }
}

/// Fine-grained application-level protocol failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicationErrorKind {
    Unknown,
    UnknownMethod,
    InvalidMessageType,
    WrongMethodName,
    BadSequenceId,
    MissingResult,
    InternalError,
    ProtocolError,
    InvalidTransform,
    InvalidProtocol,
    UnsupportedClientType,
}

impl ApplicationErrorKind {
    /// Metric suffix for this code.
    pub fn code(&self) -> &'static str {
        match self {
            ApplicationErrorKind::Unknown => "unknown",
            ApplicationErrorKind::UnknownMethod => "unknown_method",
            ApplicationErrorKind::InvalidMessageType => "invalid_message_type",
            ApplicationErrorKind::WrongMethodName => "wrong_method_name",
            ApplicationErrorKind::BadSequenceId => "bad_sequence_id",
            ApplicationErrorKind::MissingResult => "missing_result",
            ApplicationErrorKind::InternalError => "internal_error",
            ApplicationErrorKind::ProtocolError => "protocol_error",
            ApplicationErrorKind::InvalidTransform => "invalid_transform",
            ApplicationErrorKind::InvalidProtocol => "invalid_protocol",
            ApplicationErrorKind::UnsupportedClientType => "unsupported_client_type",
        }
    }
}

/// The normalized error application code catches for "something went wrong
/// talking to the remote side".
///
/// Carries the class name and message of the failure it replaced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{class}: {message}")]
pub struct ClientError {
    /// Class name of the wrapped failure (e.g. `TransportError`)
    pub class: String,
    /// Message of the wrapped failure
    pub message: String,
}

impl ClientError {
    /// Wraps an existing error, keeping its class name and message.
    pub fn wrap(err: &RpcError) -> Self {
        Self {
            class: err.class_name(),
            message: err.detail(),
        }
    }
}

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Transport error: {message}")]
    Transport {
        kind: Option<TransportErrorKind>,
        message: String,
    },

    #[error("Protocol error: {message}")]
    Protocol {
        kind: Option<ProtocolErrorKind>,
        message: String,
    },

    #[error("Application error: {message}")]
    Application {
        kind: Option<ApplicationErrorKind>,
        message: String,
    },

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Invalid data in RPC {operation}! {}", .source.detail())]
    Validation {
        operation: String,
        #[source]
        source: Box<RpcError>,
    },

    #[error("{operation} RPC unsuccessful after {tries} times. {}: {}", .source.class_name(), .source.detail())]
    Retry {
        tries: u32,
        operation: String,
        #[source]
        source: Box<RpcError>,
    },

    #[error("Pool checkout timed out after {0:?}")]
    PoolTimeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{exception}: {message}")]
    Service { exception: String, message: String },

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Middleware stack is already finalized")]
    StackFrozen,
}

impl RpcError {
    /// Transport failure with a sub-kind code.
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        RpcError::Transport {
            kind: Some(kind),
            message: message.into(),
        }
    }

    /// Protocol failure with a sub-kind code.
    pub fn protocol(kind: ProtocolErrorKind, message: impl Into<String>) -> Self {
        RpcError::Protocol {
            kind: Some(kind),
            message: message.into(),
        }
    }

    /// Application failure with a sub-kind code.
    pub fn application(kind: ApplicationErrorKind, message: impl Into<String>) -> Self {
        RpcError::Application {
            kind: Some(kind),
            message: message.into(),
        }
    }

    /// Exception declared by the remote service (or raised in-process).
    pub fn service(exception: impl Into<String>, message: impl Into<String>) -> Self {
        RpcError::Service {
            exception: exception.into(),
            message: message.into(),
        }
    }

    /// Class name used when this error is wrapped or reported.
    pub fn class_name(&self) -> String {
        match self {
            RpcError::Transport { .. } => "TransportError".to_string(),
            RpcError::Protocol { .. } => "ProtocolError".to_string(),
            RpcError::Application { .. } => "ApplicationError".to_string(),
            RpcError::Timeout(_) => "Timeout".to_string(),
            RpcError::Io(err) => format!("Io({:?})", err.kind()),
            RpcError::Client(_) => "ClientError".to_string(),
            RpcError::Validation { .. } => "ValidationError".to_string(),
            RpcError::Retry { .. } => "RetryError".to_string(),
            RpcError::PoolTimeout(_) => "PoolTimeout".to_string(),
            RpcError::Config(_) => "ConfigError".to_string(),
            RpcError::Service { exception, .. } => exception.clone(),
            RpcError::UnknownOperation(_) => "UnknownOperation".to_string(),
            RpcError::StackFrozen => "StackFrozen".to_string(),
        }
    }

    /// Message without the class prefix.
    pub fn detail(&self) -> String {
        match self {
            RpcError::Transport { message, .. }
            | RpcError::Protocol { message, .. }
            | RpcError::Application { message, .. }
            | RpcError::Service { message, .. } => message.clone(),
            RpcError::Timeout(message) | RpcError::Config(message) => message.clone(),
            RpcError::UnknownOperation(name) => name.clone(),
            other => other.to_string(),
        }
    }
}

/// A class of errors, used to build the wrapped and retriable sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    Transport,
    Protocol,
    Application,
    Timeout,
    /// Operating-system errors; `None` matches every kind.
    Io(Option<io::ErrorKind>),
    Client,
    Validation,
    Retry,
    PoolTimeout,
    /// A service exception with the given name.
    Service(String),
}

impl ErrorClass {
    pub fn matches(&self, err: &RpcError) -> bool {
        match (self, err) {
            (ErrorClass::Transport, RpcError::Transport { .. })
            | (ErrorClass::Protocol, RpcError::Protocol { .. })
            | (ErrorClass::Application, RpcError::Application { .. })
            | (ErrorClass::Timeout, RpcError::Timeout(_))
            | (ErrorClass::Client, RpcError::Client(_))
            | (ErrorClass::Validation, RpcError::Validation { .. })
            | (ErrorClass::Retry, RpcError::Retry { .. })
            | (ErrorClass::PoolTimeout, RpcError::PoolTimeout(_)) => true,
            (ErrorClass::Io(None), RpcError::Io(_)) => true,
            (ErrorClass::Io(Some(kind)), RpcError::Io(io)) => io.kind() == *kind,
            (ErrorClass::Service(name), RpcError::Service { exception, .. }) => name == exception,
            _ => false,
        }
    }

    /// True if any class in `classes` matches `err`.
    pub fn any_matches(classes: &[ErrorClass], err: &RpcError) -> bool {
        classes.iter().any(|class| class.matches(err))
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
