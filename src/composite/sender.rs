//! Outbound helper that splits one oversized message into parts.
//!
//! [`CompositeSender`] keeps a cursor into the body and hands out one part at
//! a time so the requester can interleave sends with peer acknowledgements.
//! Every part but the last is flagged with `is_part`; a body whose length is
//! an exact multiple of the part size still ends with an empty terminal part.

use std::num::NonZeroUsize;

use bytes::Bytes;

use crate::message::{Body, Message};

/// Splits a message body into contiguous parts of at most `part_size` bytes.
///
/// Text bodies are cut on character boundaries. A part size below
/// [`MIN_PART_SIZE`](crate::config::MIN_PART_SIZE) can make a part grow to
/// the width of one character; validated configurations never allow that.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
///
/// use service_connector::{
///     composite::CompositeSender,
///     message::{Message, MessageType},
/// };
///
/// let message = Message::request(MessageType::Execute).with_body(vec![7_u8; 250]);
/// let mut sender = CompositeSender::new(message, NonZeroUsize::new(100).expect("non-zero"));
/// let sizes: Vec<usize> = std::iter::from_fn(|| sender.next_part())
///     .map(|part| part.body_length())
///     .collect();
/// assert_eq!(sizes, vec![100, 100, 50]);
/// ```
#[derive(Debug)]
pub struct CompositeSender {
    template: Message,
    body: Body,
    part_size: NonZeroUsize,
    offset: usize,
    terminal_sent: bool,
}

impl CompositeSender {
    /// Take ownership of `message` and prepare to emit its parts.
    #[must_use]
    pub fn new(mut message: Message, part_size: NonZeroUsize) -> Self {
        let body = message.take_body();
        Self {
            template: message,
            body,
            part_size,
            offset: 0,
            terminal_sent: false,
        }
    }

    /// Rewind the cursor and return the first part.
    pub fn first_part(&mut self) -> Message {
        self.offset = 0;
        self.terminal_sent = false;
        self.emit()
    }

    /// Return the part after the previous one, or `None` once the terminal
    /// part was emitted.
    pub fn next_part(&mut self) -> Option<Message> {
        if self.terminal_sent {
            return None;
        }
        Some(self.emit())
    }

    /// Whether further parts remain.
    #[must_use]
    pub const fn has_next(&self) -> bool { !self.terminal_sent }

    /// Maximum body bytes per part.
    #[must_use]
    pub const fn part_size(&self) -> NonZeroUsize { self.part_size }

    /// Total body length of the logical message.
    #[must_use]
    pub fn body_length(&self) -> usize { self.body.len() }

    /// Header of the logical message being sent.
    #[must_use]
    pub fn message(&self) -> &Message { &self.template }

    fn emit(&mut self) -> Message {
        let start = self.offset;
        let (slice, end) = self.cut(start);
        let is_last = self.body.len() - start < self.part_size.get();

        let mut part = self.template.header_with_body(slice);
        part.set_part(!is_last);
        part.set_body_offset(start);

        self.offset = end;
        self.terminal_sent = is_last;
        part
    }

    fn cut(&self, start: usize) -> (Body, usize) {
        let limit = (start + self.part_size.get()).min(self.body.len());
        match &self.body {
            Body::Binary(bytes) => (Body::Binary(slice_bytes(bytes, start, limit)), limit),
            Body::Text(text) => {
                let end = char_boundary_at_or_before(text, start, limit);
                (Body::Text(text[start..end].to_owned()), end)
            }
        }
    }
}

impl Iterator for CompositeSender {
    type Item = Message;

    fn next(&mut self) -> Option<Self::Item> { self.next_part() }
}

fn slice_bytes(bytes: &Bytes, start: usize, end: usize) -> Bytes { bytes.slice(start..end) }

/// Largest char boundary in `start..=limit`, or the next boundary after
/// `start` when a single character is wider than the part size.
fn char_boundary_at_or_before(text: &str, start: usize, limit: usize) -> usize {
    let mut end = limit;
    while end > start && !text.is_char_boundary(end) {
        end -= 1;
    }
    if end == start && start < limit {
        end = limit;
        while !text.is_char_boundary(end) {
            end += 1;
        }
    }
    end
}
