//! Error type shared across the messaging runtime.
//!
//! Every fallible operation in the crate reports a [`QpError`]. Transient
//! transport conditions (broker timeouts, empty pops) never surface here;
//! they are absorbed by the receive loops with backoff.

use thiserror::Error;

use crate::envelope::RequestId;

/// Errors surfaced by the messaging runtime.
#[derive(Error, Debug)]
pub enum QpError {
    /// A send or publish was attempted on a transport that is not running.
    #[error("transport is not running")]
    NotRunning,

    /// `start` was called on a running transport, or a handler was
    /// registered after `start`.
    #[error("transport is already running")]
    AlreadyRunning,

    /// The wait on a response future exceeded its timeout.
    #[error("timed out waiting for response")]
    Timeout,

    /// A reply arrived for a request id with no outstanding future.
    #[error("no outstanding request for id {0}")]
    UnknownCorrelation(RequestId),

    /// A future is already being tracked for this request id.
    #[error("request id {0} is already tracked")]
    DuplicateCorrelation(RequestId),

    /// The codec failed to serialize an envelope.
    #[error("encode error: {0}")]
    Encode(String),

    /// The codec failed to deserialize an envelope.
    #[error("decode error: {0}")]
    Decode(String),

    /// Invalid configuration, such as an unparseable broker address.
    #[error("configuration error: {0}")]
    Config(String),

    /// The transport failed to accept or deliver a message.
    #[error("transport error: {0}")]
    Transport(String),

    /// An error reported by the Redis client.
    #[cfg(feature = "redis-transport")]
    #[error("redis error: {0}")]
    Redis(String),
}
