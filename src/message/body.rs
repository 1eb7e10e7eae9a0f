//! Message payloads.
//!
//! Bodies are either raw bytes or UTF-8 text. Binary bodies are backed by
//! [`Bytes`] so composite parts slice the original buffer without copying.

use std::borrow::Cow;

use bytes::Bytes;

/// Opaque payload of a [`Message`](crate::message::Message).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Body {
    /// Raw bytes.
    Binary(Bytes),
    /// UTF-8 text.
    Text(String),
}

impl Body {
    /// An empty binary body.
    #[must_use]
    pub const fn empty() -> Self { Self::Binary(Bytes::new()) }

    /// Length of the body in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Binary(bytes) => bytes.len(),
            Self::Text(text) => text.len(),
        }
    }

    /// Whether the body holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Whether the body is text.
    #[must_use]
    pub const fn is_text(&self) -> bool { matches!(self, Self::Text(_)) }

    /// Borrow the body as bytes regardless of representation.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Binary(bytes) => bytes,
            Self::Text(text) => text.as_bytes(),
        }
    }

    /// Borrow the body as text, replacing invalid UTF-8 in binary bodies.
    #[must_use]
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Self::Binary(bytes) => String::from_utf8_lossy(bytes),
            Self::Text(text) => Cow::Borrowed(text),
        }
    }
}

impl Default for Body {
    fn default() -> Self { Self::empty() }
}

impl From<Bytes> for Body {
    fn from(value: Bytes) -> Self { Self::Binary(value) }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self { Self::Binary(Bytes::from(value)) }
}

impl From<&'static [u8]> for Body {
    fn from(value: &'static [u8]) -> Self { Self::Binary(Bytes::from_static(value)) }
}

impl From<String> for Body {
    fn from(value: String) -> Self { Self::Text(value) }
}

impl From<&str> for Body {
    fn from(value: &str) -> Self { Self::Text(value.to_owned()) }
}
