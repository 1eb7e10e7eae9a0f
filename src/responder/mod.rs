//! Broker side of the connector protocol.
//!
//! [`Responder::handle`] takes one inbound frame and produces the frame to
//! send back. It is the peer half of the requester's state machine:
//!
//! - keep-alive probes are echoed;
//! - request parts are accumulated and acknowledged with empty part replies
//!   until the terminal part completes the request;
//! - complete requests are dispatched through the [`CommandTable`];
//! - replies larger than the part size are parked and served one part per
//!   poll request.
//!
//! All shared state lives in an explicit [`ResponderContext`] handed to every
//! command.

mod commands;
mod composites;
mod error;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

pub use commands::{
    Attach,
    ChangeSubscription,
    Command,
    CommandTable,
    CreateSession,
    DeleteSession,
    Detach,
    Execute,
    Publish,
    ReceivePublication,
    Subscribe,
    Unsubscribe,
};
pub use composites::{CompositeKey, CompositeRegistry, Inbound, TransferKey};
pub use error::CommandError;
use tracing::{debug, trace};

use crate::{
    composite::CompositeSender,
    config::{ConfigError, ResponderConfig},
    message::{Body, Message, MessageKind},
    metrics::{self, Direction},
    registry::{ServiceRegistry, SessionTable},
};

/// State shared by every command of one responder.
#[derive(Debug, Default)]
pub struct ResponderContext {
    services: ServiceRegistry,
    sessions: SessionTable,
    composites: CompositeRegistry,
    config: ResponderConfig,
    clients: AtomicUsize,
}

impl ResponderContext {
    /// Create a context with empty registries.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn new(config: ResponderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    /// Registered services.
    #[must_use]
    pub fn services(&self) -> &ServiceRegistry { &self.services }

    /// Live sessions and subscriptions.
    #[must_use]
    pub fn sessions(&self) -> &SessionTable { &self.sessions }

    /// In-flight composites.
    #[must_use]
    pub fn composites(&self) -> &CompositeRegistry { &self.composites }

    /// Responder settings.
    #[must_use]
    pub fn config(&self) -> &ResponderConfig { &self.config }

    /// Number of attached clients.
    #[must_use]
    pub fn clients(&self) -> usize { self.clients.load(Ordering::Relaxed) }

    pub(crate) fn attach(&self) -> usize { self.clients.fetch_add(1, Ordering::Relaxed) + 1 }

    pub(crate) fn detach(&self) -> usize {
        let previous = self
            .clients
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or_default();
        previous.saturating_sub(1)
    }
}

/// Answers inbound frames using a command table and shared context.
#[derive(Clone, Debug)]
pub struct Responder {
    context: Arc<ResponderContext>,
    commands: Arc<CommandTable>,
}

impl Responder {
    /// Create a responder running the standard broker commands.
    #[must_use]
    pub fn new(context: Arc<ResponderContext>) -> Self {
        Self::with_commands(context, CommandTable::standard())
    }

    /// Create a responder running `commands`.
    #[must_use]
    pub fn with_commands(context: Arc<ResponderContext>, commands: CommandTable) -> Self {
        Self {
            context,
            commands: Arc::new(commands),
        }
    }

    /// Shared context.
    #[must_use]
    pub fn context(&self) -> &Arc<ResponderContext> { &self.context }

    /// Produce the reply frame for `frame`.
    ///
    /// Never fails: problems are reported to the peer as fault frames.
    pub async fn handle(&self, frame: Message) -> Message {
        metrics::inc_frames(Direction::Inbound);
        let reply = self.respond(frame).await;
        metrics::inc_frames(Direction::Outbound);
        reply
    }

    async fn respond(&self, frame: Message) -> Message {
        if frame.kind() == MessageKind::KeepAlive {
            trace!("echoing keep-alive");
            return Message::keep_alive();
        }

        let composites = self.context.composites();
        if frame.is_poll_request() {
            let key = TransferKey::of(&frame);
            return match composites.next_outbound(&key) {
                Some(part) => {
                    metrics::inc_fragments(Direction::Outbound);
                    part
                }
                None => fault(&frame, &CommandError::NothingToPoll),
            };
        }

        if frame.is_part() {
            metrics::inc_fragments(Direction::Inbound);
        }
        let header = frame.header_with_body(Body::empty());
        let request = match composites.accept(frame, self.context.config().max_message_size) {
            Ok(Inbound::Pending) => return Message::reply_to(&header).with_part(true),
            Ok(Inbound::Complete(request)) => request,
            Err(error) => return fault(&header, &error.into()),
        };

        let key = TransferKey::of(&request);
        let header = request.header_with_body(Body::empty());
        let reply = match self.commands.dispatch(&self.context, request).await {
            Ok(reply) => reply,
            Err(error) => return fault(&header, &error),
        };
        self.split_reply(key, reply)
    }

    fn split_reply(&self, key: TransferKey, reply: Message) -> Message {
        let part_size = self.context.config().part_size;
        if reply.body_length() <= part_size.get() {
            return reply;
        }
        debug!(%key, body_length = reply.body_length(), "serving reply as composite");
        metrics::inc_fragments(Direction::Outbound);
        self.context
            .composites()
            .start_outbound(key, CompositeSender::new(reply, part_size))
    }
}

fn fault(request: &Message, error: &CommandError) -> Message {
    debug!(%error, code = error.fault_code().code(), "command failed");
    metrics::inc_errors();
    Message::fault_for(request, error.fault_code(), error.to_string())
}
