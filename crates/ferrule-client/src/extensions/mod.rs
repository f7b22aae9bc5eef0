//! Optional client behaviors.
//!
//! - [`retry`]: repeat calls that fail with retriable errors
//! - [`ping`]: health probe through the `ping` operation

pub mod ping;
pub mod retry;

pub use ping::Ping;
pub use retry::{RetryOptions, RetryProxy, DEFAULT_RETRIABLE_ERRORS};
