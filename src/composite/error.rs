//! Error and status types emitted by the composite layer.

use thiserror::Error;

/// Result of adding a part to a [`CompositeReceiver`](crate::composite::CompositeReceiver).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositeStatus {
    /// More parts are expected.
    Incomplete,
    /// The terminal part arrived; the message is ready.
    Complete,
    /// A fault part collapsed the transfer.
    Fault,
}

/// Errors produced while re-assembling parts.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum CompositeError {
    /// The re-assembled body would exceed the configured cap.
    #[error("composite body of {attempted} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge { attempted: usize, limit: usize },
}
