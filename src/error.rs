use std::io;

use thiserror::Error;

use crate::codec::DecodeError;

/// Errors surfaced to callers of the client.
///
/// Everything except [`ClientError::Fatal`] is a recoverable condition: it
/// fails the one request (and at most closes the one offending connection)
/// without poisoning the pool. `Fatal` marks an internal invariant violation;
/// the affected connection is aborted and the error is never silenced.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection closed before the response arrived")]
    ConnectionClosed,

    #[error("content stream already consumed")]
    StreamAlreadyConsumed,

    #[error("upgrade refused, response status is not 101")]
    UpgradeRefused,

    #[error("too many pending acquirers")]
    TooManyWaiters,

    #[error("client already closed")]
    ClientAlreadyClosed,

    #[error("automatic redirect is only supported for GET requests")]
    AutoRedirectNotSupported,

    #[error("request has no host header")]
    HostHeaderMissing,

    #[error("can't connect to peer: {source}")]
    Connect { source: io::Error },

    #[error("write request failed: {source}")]
    Write { source: io::Error },

    #[error("decode response failed: {source}")]
    Decode {
        #[from]
        source: DecodeError,
    },

    #[error("response body failed: {reason}")]
    Body { reason: String },

    #[error("internal fault: {message}")]
    Fatal { message: &'static str },
}

impl ClientError {
    pub(crate) fn connect(source: io::Error) -> Self {
        ClientError::Connect { source }
    }

    pub(crate) fn write(source: io::Error) -> Self {
        ClientError::Write { source }
    }

    pub(crate) fn body(reason: impl Into<String>) -> Self {
        ClientError::Body { reason: reason.into() }
    }

    /// Invariant violation. Logged loudly, asserted in debug builds, and
    /// propagated so the offending connection can be torn down.
    pub(crate) fn fatal(message: &'static str) -> Self {
        tracing::error!(message, "internal invariant violated");
        debug_assert!(false, "internal invariant violated: {message}");
        ClientError::Fatal { message }
    }
}
