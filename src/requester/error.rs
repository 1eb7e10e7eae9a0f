//! Error types for the requester.

use thiserror::Error;

use crate::{
    composite::CompositeError,
    config::ConfigError,
    message::MessageKind,
    pool::PoolError,
    transport::ConnectionError,
};

/// Errors returned by [`Requester`](crate::requester::Requester).
#[derive(Debug, Error)]
pub enum RequesterError {
    /// No connection could be leased.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// The transport failed or an operation timed out mid-exchange.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// The peer answered a fragment exchange with a frame that is neither a
    /// continuation nor a fault.
    #[error("malformed fragment sequence: unexpected {kind:?} frame while {phase}")]
    MalformedSequence {
        /// Exchange phase that received the frame.
        phase: &'static str,
        /// Kind of the offending frame.
        kind: MessageKind,
    },
    /// The reassembled reply would exceed the configured size cap.
    #[error(transparent)]
    Composite(#[from] CompositeError),
    /// The requester configuration is inconsistent.
    #[error("invalid requester configuration: {0}")]
    Config(#[from] ConfigError),
    /// The task driving an asynchronous send ended without a result.
    #[error("asynchronous send was cancelled")]
    Cancelled,
}

impl RequesterError {
    /// Whether the leased connection is in an unknown protocol state and must
    /// be force-closed instead of released.
    #[must_use]
    pub fn requires_force_close(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::MalformedSequence { .. } | Self::Composite(_)
        )
    }

    /// Whether the error was caused by an operation timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Connection(error) if error.is_timeout())
    }
}
