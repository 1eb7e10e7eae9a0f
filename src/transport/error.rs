//! Error types for transport connections.

use std::{io, time::Duration};

use thiserror::Error;

use crate::{codec::CodecError, message::MessageKind};

/// Errors emitted by [`Connection`](crate::transport::Connection)s.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Socket level failure.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// Frame encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// The operation did not finish in time; the connection state is unknown.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    /// The connection is not established.
    #[error("connection is not connected")]
    NotConnected,
    /// The peer closed the connection before answering.
    #[error("connection closed by peer")]
    Closed,
    /// The peer answered a probe with an unexpected frame.
    #[error("unexpected {0:?} reply")]
    UnexpectedReply(MessageKind),
}

impl ConnectionError {
    /// Whether the error is an operation timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool { matches!(self, Self::Timeout(_)) }
}
