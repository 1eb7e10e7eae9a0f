//! Error types for the wire codec.

use std::str::Utf8Error;

use bincode::error::{DecodeError, EncodeError};
use thiserror::Error;

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Serialisation failed.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] EncodeError),
    /// The bytes did not form a valid frame.
    #[error("failed to decode frame: {0}")]
    Decode(#[from] DecodeError),
    /// The frame exceeds the configured maximum.
    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },
    /// Unknown frame kind tag.
    #[error("unknown frame kind {0}")]
    UnknownKind(u8),
    /// Unknown message type tag.
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
    /// Unknown fault code.
    #[error("unknown fault code {0}")]
    UnknownFaultCode(u16),
    /// A text body was not valid UTF-8.
    #[error("text body is not valid UTF-8: {0}")]
    InvalidText(Utf8Error),
    /// The body offset does not fit the platform's address width.
    #[error("body offset {0} does not fit in usize")]
    OffsetOverflow(u64),
}
