//! In-flight composites on the broker side.
//!
//! Inbound requests arriving as parts are accumulated until their terminal
//! part lands; outbound replies too large for one frame are parked and served
//! one part per poll request. Both are keyed by the session the frames belong
//! to, falling back to the service name for session-less calls, and by the
//! message sequence number every frame of one transfer shares. A request
//! arriving mid-upload with a different number is a transfer of its own.

use std::fmt;

use dashmap::DashMap;

use crate::{
    composite::{CompositeError, CompositeReceiver, CompositeSender, CompositeStatus},
    message::{Message, MessageId, ServiceName, SessionId},
};

/// Key under which a peer's in-flight composite is tracked.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CompositeKey {
    Session(SessionId),
    Service(ServiceName),
    Anonymous,
}

impl CompositeKey {
    /// Key for the composite `frame` belongs to.
    #[must_use]
    pub fn of(frame: &Message) -> Self {
        match (frame.session_id(), frame.service_name()) {
            (Some(session), _) => Self::Session(session.clone()),
            (None, Some(service)) => Self::Service(service.clone()),
            (None, None) => Self::Anonymous,
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(id) => write!(f, "session {id}"),
            Self::Service(name) => write!(f, "service {name}"),
            Self::Anonymous => f.write_str("anonymous"),
        }
    }
}

/// One transfer: its owner plus the message number its frames carry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransferKey {
    owner: CompositeKey,
    message_sequence_nr: Option<u64>,
}

impl TransferKey {
    /// Key for the transfer `frame` belongs to.
    #[must_use]
    pub fn of(frame: &Message) -> Self {
        Self {
            owner: CompositeKey::of(frame),
            message_sequence_nr: frame.message_id().map(MessageId::message_sequence_nr),
        }
    }

    /// Owner of the transfer.
    #[must_use]
    pub fn owner(&self) -> &CompositeKey { &self.owner }
}

impl fmt::Display for TransferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message_sequence_nr {
            Some(nr) => write!(f, "{} message {nr}", self.owner),
            None => fmt::Display::fmt(&self.owner, f),
        }
    }
}

/// Outcome of feeding one inbound frame to the registry.
#[derive(Debug)]
pub enum Inbound {
    /// More parts are expected; acknowledge and wait.
    Pending,
    /// The request is complete and ready for dispatch.
    Complete(Message),
}

/// Per-key inbound receivers and outbound senders.
#[derive(Debug, Default)]
pub struct CompositeRegistry {
    inbound: DashMap<TransferKey, CompositeReceiver>,
    outbound: DashMap<TransferKey, CompositeSender>,
}

impl CompositeRegistry {
    /// Feed an inbound request frame.
    ///
    /// A non-part frame with no composite in progress for its transfer is
    /// complete on its own.
    ///
    /// # Errors
    ///
    /// Returns [`CompositeError::MessageTooLarge`] when the accumulated body
    /// exceeds `max_body_length`; the partial composite is discarded.
    pub fn accept(&self, frame: Message, max_body_length: usize) -> Result<Inbound, CompositeError> {
        let key = TransferKey::of(&frame);
        let status = match self.inbound.get_mut(&key) {
            Some(mut receiver) => receiver.add(frame),
            None if frame.is_part() => {
                let receiver = CompositeReceiver::with_limit(frame, max_body_length)?;
                self.inbound.insert(key, receiver);
                return Ok(Inbound::Pending);
            }
            None => return Ok(Inbound::Complete(frame)),
        };
        match status {
            Ok(CompositeStatus::Incomplete) => Ok(Inbound::Pending),
            Ok(CompositeStatus::Complete | CompositeStatus::Fault) => Ok(self
                .inbound
                .remove(&key)
                .map_or(Inbound::Pending, |(_, receiver)| {
                    Inbound::Complete(receiver.into_message())
                })),
            Err(error) => {
                self.inbound.remove(&key);
                Err(error)
            }
        }
    }

    /// Park `sender` and return its first part.
    ///
    /// A sender whose first part is already terminal is not parked.
    pub fn start_outbound(&self, key: TransferKey, mut sender: CompositeSender) -> Message {
        let first = sender.first_part();
        if sender.has_next() {
            self.outbound.insert(key, sender);
        } else {
            self.outbound.remove(&key);
        }
        first
    }

    /// Next part of the reply parked under `key`, if any.
    pub fn next_outbound(&self, key: &TransferKey) -> Option<Message> {
        let part = self.outbound.get_mut(key)?.next_part();
        self.outbound.remove_if(key, |_, sender| !sender.has_next());
        part
    }

    /// Drop every composite tracked for `owner`.
    pub fn discard(&self, owner: &CompositeKey) {
        self.inbound.retain(|key, _| key.owner() != owner);
        self.outbound.retain(|key, _| key.owner() != owner);
    }

    /// Number of inbound composites in progress.
    #[must_use]
    pub fn inbound_len(&self) -> usize { self.inbound.len() }

    /// Number of outbound replies awaiting polls.
    #[must_use]
    pub fn outbound_len(&self) -> usize { self.outbound.len() }
}
