//! Request/reply orchestration over pooled connections.
//!
//! A [`Requester`] leases a connection, sends one logical message and returns
//! one logical reply. Messages larger than the part size go out as a
//! composite, one acknowledged part per round trip. Replies that arrive as
//! parts are pulled with explicit poll frames until the terminal part lands.
//! The lease always ends in either `release` or, when the connection's
//! protocol state is unknown, `force_close`.

mod error;
mod pending;

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
pub use error::RequesterError;
pub use pending::PendingReply;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::{
    composite::{CompositeReceiver, CompositeSender},
    config::RequesterConfig,
    message::{Body, Message, MessageId, MessageKind, SequenceTracker, SessionId},
    metrics::{self, Direction},
    pool::{ConnectionPool, PooledConnection},
    transport::ConnectionError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    SendingSmall,
    SendingLarge,
    ReceivingSmall,
    ReceivingLarge,
}

impl Phase {
    const fn as_str(self) -> &'static str {
        match self {
            Self::SendingSmall => "sending-small",
            Self::SendingLarge => "sending-large",
            Self::ReceivingSmall => "receiving-small",
            Self::ReceivingLarge => "receiving-large",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Drives request/reply exchanges for one service over its connection pool.
///
/// Sequence numbers are tracked per session; messages without a session
/// share one tracker.
#[derive(Debug)]
pub struct Requester {
    pool: Arc<ConnectionPool>,
    config: RequesterConfig,
    sequences: DashMap<Option<SessionId>, SequenceTracker>,
    next_correlation: AtomicU64,
}

impl Requester {
    /// Create a requester on top of `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`RequesterError::Config`] if `config` fails validation.
    pub fn new(pool: Arc<ConnectionPool>, config: RequesterConfig) -> Result<Self, RequesterError> {
        config.validate()?;
        Ok(Self {
            pool,
            config,
            sequences: DashMap::new(),
            next_correlation: AtomicU64::new(1),
        })
    }

    /// Pool the requester leases from.
    #[must_use]
    pub fn pool(&self) -> &Arc<ConnectionPool> { &self.pool }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &RequesterConfig { &self.config }

    /// Identifier the next small frame on `session` would carry.
    #[must_use]
    pub fn current_message_id(&self, session: Option<&SessionId>) -> MessageId {
        self.sequences
            .get(&session.cloned())
            .map_or_else(|| SequenceTracker::new().current(), |tracker| tracker.current())
    }

    /// Open a group call on `session`. Messages sent on that session until
    /// [`Requester::end_group`] share one message sequence number and carry
    /// the group flag.
    pub fn begin_group(&self, session: Option<&SessionId>) {
        self.with_sequence(session, SequenceTracker::begin_group);
    }

    /// Close the group call on `session`.
    pub fn end_group(&self, session: Option<&SessionId>) {
        self.with_sequence(session, SequenceTracker::end_group);
    }

    fn with_sequence<R>(
        &self,
        session: Option<&SessionId>,
        f: impl FnOnce(&mut SequenceTracker) -> R,
    ) -> R {
        let mut tracker = self.sequences.entry(session.cloned()).or_default();
        f(&mut tracker)
    }

    /// Send `message` and wait for the complete reply.
    ///
    /// `timeout` bounds every single round trip of the exchange. The reply is
    /// either a complete, reassembled message or a fault message.
    ///
    /// # Errors
    ///
    /// Returns [`RequesterError::Pool`] when no connection can be leased and
    /// the transport, sequence or size errors of the exchange otherwise. The
    /// connection is force-closed for every error where
    /// [`RequesterError::requires_force_close`] holds and released otherwise.
    pub async fn send_and_receive(
        &self,
        message: Message,
        timeout: Duration,
    ) -> Result<Message, RequesterError> {
        let mut conn = self.pool.acquire().await?;
        let result = self.exchange(&mut conn, message, timeout).await;
        match &result {
            Err(error) if error.requires_force_close() => {
                warn!(connection_id = %conn.id(), %error, "exchange aborted");
                metrics::inc_errors();
                self.pool.force_close(conn).await;
            }
            Err(error) => {
                debug!(connection_id = %conn.id(), %error, "exchange failed");
                metrics::inc_errors();
                self.pool.release(conn).await;
            }
            Ok(_) => self.pool.release(conn).await,
        }
        result
    }

    /// Send `message` on a background task and return a future for its reply.
    ///
    /// The message is stamped with a fresh correlation identifier which the
    /// reply echoes.
    pub fn send(self: &Arc<Self>, mut message: Message, timeout: Duration) -> PendingReply {
        let correlation_id = self.next_correlation.fetch_add(1, Ordering::Relaxed);
        message.set_correlation_id(Some(correlation_id));
        let (tx, rx) = oneshot::channel();
        let requester = Arc::clone(self);
        tokio::spawn(async move {
            let result = requester.send_and_receive(message, timeout).await;
            if tx.send(result).is_err() {
                trace!(correlation_id, "reply dropped: pending handle gone");
            }
        });
        PendingReply::new(correlation_id, rx)
    }

    async fn exchange(
        &self,
        conn: &mut PooledConnection,
        mut message: Message,
        timeout: Duration,
    ) -> Result<Message, RequesterError> {
        let (id, grouped) = self.with_sequence(message.session_id(), |tracker| {
            (tracker.begin_message(), tracker.in_group())
        });
        if grouped {
            message.set_group(true);
        }
        let header = message.header_with_body(Body::empty());

        let reply = if message.body_length() > self.config.part_size.get() {
            self.send_large(conn, message, id, timeout).await?
        } else {
            trace!(phase = %Phase::SendingSmall, message_id = %id, "sending message");
            message.set_message_id(id);
            Self::round_trip(conn, message, timeout).await?
        };
        if reply.is_part() {
            self.pull(conn, &header, id, reply, timeout).await
        } else {
            trace!(phase = %Phase::ReceivingSmall, "reply received");
            Self::check_reply(Phase::ReceivingSmall, reply)
        }
    }

    async fn send_large(
        &self,
        conn: &mut PooledConnection,
        message: Message,
        id: MessageId,
        timeout: Duration,
    ) -> Result<Message, RequesterError> {
        let session = message.session_id().cloned();
        let mut sender = CompositeSender::new(message, self.config.part_size);
        debug!(
            phase = %Phase::SendingLarge,
            body_length = sender.body_length(),
            part_size = sender.part_size().get(),
            "sending composite"
        );
        let mut part = sender.first_part();
        loop {
            let terminal = !part.is_part();
            let part_id = self.with_sequence(session.as_ref(), |tracker| tracker.next_part(id));
            part.set_message_id(part_id);
            metrics::inc_fragments(Direction::Outbound);
            let reply = Self::round_trip(conn, part, timeout).await?;
            if terminal {
                return Ok(reply);
            }
            let reply = Self::check_reply(Phase::SendingLarge, reply)?;
            if reply.is_fault() || !reply.is_part() {
                debug!(phase = %Phase::SendingLarge, "peer replied before the last part");
                return Ok(reply);
            }
            match sender.next_part() {
                Some(next) => part = next,
                None => return Ok(reply),
            }
        }
    }

    async fn pull(
        &self,
        conn: &mut PooledConnection,
        header: &Message,
        id: MessageId,
        first: Message,
        timeout: Duration,
    ) -> Result<Message, RequesterError> {
        let first = Self::check_reply(Phase::ReceivingLarge, first)?;
        metrics::inc_fragments(Direction::Inbound);
        let mut receiver = CompositeReceiver::with_limit(first, self.config.max_message_size)?;
        debug!(phase = %Phase::ReceivingLarge, "pulling composite reply");
        while !receiver.is_complete() {
            let part_id = self.with_sequence(header.session_id(), |tracker| tracker.next_part(id));
            let poll = Message::poll_request(header, part_id);
            let frame = Self::round_trip(conn, poll, timeout).await?;
            let frame = Self::check_reply(Phase::ReceivingLarge, frame)?;
            if !frame.is_fault() {
                metrics::inc_fragments(Direction::Inbound);
            }
            receiver.add(frame)?;
        }
        trace!(
            phase = %Phase::ReceivingLarge,
            parts = receiver.part_count(),
            body_length = receiver.body_length(),
            "composite reply complete"
        );
        Ok(receiver.into_message())
    }

    async fn round_trip(
        conn: &mut PooledConnection,
        frame: Message,
        timeout: Duration,
    ) -> Result<Message, RequesterError> {
        trace!(connection_id = %conn.id(), message_id = ?frame.message_id(), "frame out");
        metrics::inc_frames(Direction::Outbound);
        let reply = tokio::time::timeout(timeout, conn.send_and_receive(frame))
            .await
            .map_err(|_| ConnectionError::Timeout(timeout))??;
        metrics::inc_frames(Direction::Inbound);
        Ok(reply)
    }

    fn check_reply(phase: Phase, frame: Message) -> Result<Message, RequesterError> {
        match frame.kind() {
            MessageKind::Reply | MessageKind::Fault => Ok(frame),
            kind => {
                warn!(%phase, ?kind, "unexpected frame in exchange");
                Err(RequesterError::MalformedSequence {
                    phase: phase.as_str(),
                    kind,
                })
            }
        }
    }
}
