//! Inbound helper that stitches parts back into one message.
//!
//! [`CompositeReceiver`] mirrors [`CompositeSender`](crate::composite::CompositeSender).
//! It accepts parts strictly in arrival order, tracks the running body length
//! and becomes complete when a part without the `is_part` flag arrives. A
//! fault part anywhere in the run collapses the whole composite into that
//! fault and discards what was accumulated.

use std::sync::OnceLock;

use bytes::BytesMut;
use tracing::debug;

use super::{CompositeError, CompositeStatus};
use crate::message::{Body, Message};

/// Accumulates the parts of one large message.
#[derive(Debug)]
pub struct CompositeReceiver {
    header: Message,
    parts: Vec<Message>,
    body_length: usize,
    max_body_length: usize,
    complete: bool,
    fault: Option<Message>,
    body: OnceLock<Body>,
}

impl CompositeReceiver {
    /// Start a composite from its first part without a size cap.
    #[must_use]
    pub fn new(first: Message) -> Self { Self::seeded(first, usize::MAX).0 }

    /// Start a composite whose re-assembled body may not exceed
    /// `max_body_length` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CompositeError::MessageTooLarge`] if the first part already
    /// exceeds the cap.
    pub fn with_limit(first: Message, max_body_length: usize) -> Result<Self, CompositeError> {
        let (receiver, status) = Self::seeded(first, max_body_length);
        status.map(|_| receiver)
    }

    fn seeded(
        first: Message,
        max_body_length: usize,
    ) -> (Self, Result<CompositeStatus, CompositeError>) {
        let mut receiver = Self {
            header: first.header_with_body(Body::empty()),
            parts: Vec::new(),
            body_length: 0,
            max_body_length,
            complete: false,
            fault: None,
            body: OnceLock::new(),
        };
        let status = receiver.add(first);
        (receiver, status)
    }

    /// Append the next part in arrival order.
    ///
    /// Parts arriving after completion or after a fault are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CompositeError::MessageTooLarge`] when the part would push
    /// the body beyond the configured cap. The part is not added.
    pub fn add(&mut self, part: Message) -> Result<CompositeStatus, CompositeError> {
        if self.fault.is_some() {
            debug!("part ignored after composite collapsed to fault");
            return Ok(CompositeStatus::Fault);
        }
        if self.complete {
            debug!("part ignored after composite completed");
            return Ok(CompositeStatus::Complete);
        }
        if part.is_fault() {
            debug!(parts = self.parts.len(), "composite collapsed to fault");
            self.parts.clear();
            self.body_length = 0;
            self.body = OnceLock::new();
            self.complete = true;
            self.fault = Some(part);
            return Ok(CompositeStatus::Fault);
        }

        let attempted = self.body_length.saturating_add(part.body_length());
        if attempted > self.max_body_length {
            return Err(CompositeError::MessageTooLarge {
                attempted,
                limit: self.max_body_length,
            });
        }

        self.body_length = attempted;
        self.complete = !part.is_part();
        self.body = OnceLock::new();
        self.header = part.header_with_body(Body::empty());
        self.parts.push(part);
        Ok(if self.complete {
            CompositeStatus::Complete
        } else {
            CompositeStatus::Incomplete
        })
    }

    /// Whether the terminal part (or a fault) arrived.
    #[must_use]
    pub const fn is_complete(&self) -> bool { self.complete }

    /// Whether a fault part collapsed the composite.
    #[must_use]
    pub const fn is_fault(&self) -> bool { self.fault.is_some() }

    /// Number of body bytes received so far.
    #[must_use]
    pub const fn body_length(&self) -> usize { self.body_length }

    /// Number of parts received so far.
    #[must_use]
    pub fn part_count(&self) -> usize { self.parts.len() }

    /// Re-assembled body, concatenated on first access.
    ///
    /// The representation follows the first part: text if it carried text,
    /// bytes otherwise. A collapsed composite yields the fault's body.
    pub fn body(&self) -> &Body {
        if let Some(fault) = &self.fault {
            return fault.body();
        }
        self.body.get_or_init(|| concat(&self.parts, self.body_length))
    }

    /// Consume the receiver and return the logical message.
    ///
    /// The header is taken from the last part received, with the part flag
    /// cleared. A collapsed composite returns the fault message.
    #[must_use]
    pub fn into_message(mut self) -> Message {
        if let Some(fault) = self.fault.take() {
            return fault;
        }
        let body = match self.body.take() {
            Some(body) => body,
            None => concat(&self.parts, self.body_length),
        };
        let mut message = self.header.header_with_body(body);
        message.set_part(false);
        message.set_body_offset(0);
        message
    }
}

fn concat(parts: &[Message], length: usize) -> Body {
    let text = parts.first().is_some_and(|first| first.body().is_text());
    if text {
        let mut joined = String::with_capacity(length);
        for part in parts {
            joined.push_str(&part.body().to_text());
        }
        Body::Text(joined)
    } else {
        let mut joined = BytesMut::with_capacity(length);
        for part in parts {
            joined.extend_from_slice(part.body().as_bytes());
        }
        Body::Binary(joined.freeze())
    }
}
