//! Message and part sequence numbering.
//!
//! Every exchange on a session carries a [`MessageId`] combining a message
//! sequence number and a part sequence number. [`SequenceTracker`] owns the
//! counters and applies the numbering discipline: one part increment per
//! fragment sent or pulled, one message number reserved per exchange, and one
//! shared number for all members of a group call.

use std::fmt;

/// Identifier stamped on every frame of a session.
///
/// # Examples
///
/// ```
/// use service_connector::message::MessageId;
/// let id = MessageId::new(3, 7);
/// assert_eq!(id.to_string(), "3/7");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId {
    message_sequence_nr: u64,
    part_sequence_nr: u64,
}

impl MessageId {
    /// Create an identifier from its two counters.
    #[must_use]
    pub const fn new(message_sequence_nr: u64, part_sequence_nr: u64) -> Self {
        Self {
            message_sequence_nr,
            part_sequence_nr,
        }
    }

    /// Sequence number of the logical message.
    #[must_use]
    pub const fn message_sequence_nr(self) -> u64 { self.message_sequence_nr }

    /// Sequence number of the fragment.
    #[must_use]
    pub const fn part_sequence_nr(self) -> u64 { self.part_sequence_nr }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.message_sequence_nr, self.part_sequence_nr)
    }
}

/// Per-session counter pair.
///
/// A message number is reserved when an exchange starts, so exchanges that
/// overlap on one session never share it. Part numbers are never reset, so
/// they stay monotonic across exchanges and a peer can use the full
/// identifier to discard duplicates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceTracker {
    next_message_nr: u64,
    part_sequence_nr: u64,
    group: Option<u64>,
}

impl Default for SequenceTracker {
    fn default() -> Self { Self::new() }
}

impl SequenceTracker {
    /// Start numbering at message 1, part 0.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_message_nr: 1,
            part_sequence_nr: 0,
            group: None,
        }
    }

    /// Identifier the next small frame would carry.
    #[must_use]
    pub const fn current(&self) -> MessageId {
        let message = match self.group {
            Some(group) => group,
            None => self.next_message_nr,
        };
        MessageId::new(message, self.part_sequence_nr)
    }

    /// Reserve the message number for a new exchange.
    ///
    /// Inside a group call every member gets the group's number.
    pub fn begin_message(&mut self) -> MessageId {
        let id = self.current();
        if self.group.is_none() {
            self.next_message_nr = self.next_message_nr.wrapping_add(1);
        }
        id
    }

    /// Advance the part counter for one fragment of `message`.
    pub fn next_part(&mut self, message: MessageId) -> MessageId {
        self.part_sequence_nr = self.part_sequence_nr.wrapping_add(1);
        MessageId::new(message.message_sequence_nr(), self.part_sequence_nr)
    }

    /// Open a group call; members share one message number.
    ///
    /// Opening a group that is already open is a no-op.
    pub fn begin_group(&mut self) {
        if self.group.is_none() {
            self.group = Some(self.begin_message().message_sequence_nr());
        }
    }

    /// Close the group call. The next exchange takes a fresh number.
    pub fn end_group(&mut self) { self.group = None; }

    /// Whether a group call is open.
    #[must_use]
    pub const fn in_group(&self) -> bool { self.group.is_some() }
}
