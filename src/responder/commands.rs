//! Broker operations dispatched by message type.
//!
//! Each operation is a unit struct implementing [`Command`]. The
//! [`CommandTable`] maps a [`MessageType`] to its handler; the responder looks
//! up the handler for every complete request and turns a [`CommandError`]
//! into a fault reply.

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use tracing::debug;

use super::{CommandError, ResponderContext};
use crate::{
    message::{Body, FaultCode, Message, MessageType, ServiceName, SessionId},
    registry::ServiceHandle,
    requester::Requester,
    subscription::{PollOutcome, SubscriptionMask, SubscriptionQueue, validate_message_mask},
};

/// One broker operation.
#[async_trait]
pub trait Command: Send + Sync {
    /// Message type the command handles.
    fn message_type(&self) -> MessageType;

    /// Carry out `request` and produce the reply.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] that the responder reports as a fault.
    async fn run(&self, ctx: &ResponderContext, request: Message) -> Result<Message, CommandError>;
}

/// Lookup table from message type to command.
#[derive(Clone, Default)]
pub struct CommandTable {
    commands: HashMap<MessageType, Arc<dyn Command>>,
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.commands.keys()).finish()
    }
}

impl CommandTable {
    /// Table holding every broker operation.
    #[must_use]
    pub fn standard() -> Self {
        let mut table = Self::default();
        table
            .register(Arc::new(Attach))
            .register(Arc::new(Detach))
            .register(Arc::new(CreateSession))
            .register(Arc::new(DeleteSession))
            .register(Arc::new(Execute))
            .register(Arc::new(Subscribe))
            .register(Arc::new(ChangeSubscription))
            .register(Arc::new(Unsubscribe))
            .register(Arc::new(ReceivePublication))
            .register(Arc::new(Publish));
        table
    }

    /// Add or replace the handler for its message type.
    pub fn register(&mut self, command: Arc<dyn Command>) -> &mut Self {
        self.commands.insert(command.message_type(), command);
        self
    }

    /// Whether a handler exists for `message_type`.
    #[must_use]
    pub fn handles(&self, message_type: MessageType) -> bool {
        self.commands.contains_key(&message_type)
    }

    /// Run the handler registered for the request's message type.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Unsupported`] when no handler is registered
    /// and the handler's error otherwise.
    pub async fn dispatch(
        &self,
        ctx: &ResponderContext,
        request: Message,
    ) -> Result<Message, CommandError> {
        let message_type = request.message_type();
        let command = self
            .commands
            .get(&message_type)
            .ok_or(CommandError::Unsupported(message_type))?;
        debug!(?message_type, session_id = ?request.session_id(), "dispatching command");
        command.run(ctx, request).await
    }
}

fn service_of(request: &Message) -> Result<&ServiceName, CommandError> {
    request.service_name().ok_or(CommandError::MissingService)
}

fn session_of(request: &Message) -> Result<&SessionId, CommandError> {
    request.session_id().ok_or(CommandError::MissingSession)
}

fn mask_of(request: &Message) -> Result<&str, CommandError> {
    request.mask().ok_or(CommandError::MissingMask)
}

fn lookup(ctx: &ResponderContext, service: &ServiceName) -> Result<ServiceHandle, CommandError> {
    ctx.services()
        .get(service)
        .ok_or_else(|| CommandError::UnknownService(service.clone()))
}

fn requester_of(
    ctx: &ResponderContext,
    service: &ServiceName,
) -> Result<Arc<Requester>, CommandError> {
    lookup(ctx, service)?
        .requester()
        .cloned()
        .ok_or_else(|| CommandError::WrongServiceKind {
            service: service.clone(),
            expected: "session",
        })
}

fn queue_of(
    ctx: &ResponderContext,
    service: &ServiceName,
) -> Result<Arc<SubscriptionQueue>, CommandError> {
    lookup(ctx, service)?
        .queue()
        .cloned()
        .ok_or_else(|| CommandError::WrongServiceKind {
            service: service.clone(),
            expected: "publish",
        })
}

fn owning_service(ctx: &ResponderContext, session: &SessionId) -> Result<ServiceName, CommandError> {
    ctx.sessions()
        .service_of(session)
        .ok_or_else(|| CommandError::UnknownSession(session.clone()))
}

/// Client handshake.
#[derive(Debug)]
pub struct Attach;

#[async_trait]
impl Command for Attach {
    fn message_type(&self) -> MessageType { MessageType::Attach }

    async fn run(&self, ctx: &ResponderContext, request: Message) -> Result<Message, CommandError> {
        let clients = ctx.attach();
        debug!(clients, "client attached");
        Ok(Message::reply_to(&request))
    }
}

/// Client farewell.
#[derive(Debug)]
pub struct Detach;

#[async_trait]
impl Command for Detach {
    fn message_type(&self) -> MessageType { MessageType::Detach }

    async fn run(&self, ctx: &ResponderContext, request: Message) -> Result<Message, CommandError> {
        let clients = ctx.detach();
        debug!(clients, "client detached");
        Ok(Message::reply_to(&request))
    }
}

/// Open a session on a session service.
#[derive(Debug)]
pub struct CreateSession;

#[async_trait]
impl Command for CreateSession {
    fn message_type(&self) -> MessageType { MessageType::CreateSession }

    async fn run(&self, ctx: &ResponderContext, request: Message) -> Result<Message, CommandError> {
        let service = service_of(&request)?;
        requester_of(ctx, service)?;
        let session = ctx.sessions().create(service.clone());
        debug!(session_id = %session, %service, "session created");
        Ok(Message::reply_to(&request).with_session(session))
    }
}

/// Close a session and drop its in-flight composites.
#[derive(Debug)]
pub struct DeleteSession;

#[async_trait]
impl Command for DeleteSession {
    fn message_type(&self) -> MessageType { MessageType::DeleteSession }

    async fn run(&self, ctx: &ResponderContext, request: Message) -> Result<Message, CommandError> {
        let session = session_of(&request)?;
        let service = ctx
            .sessions()
            .remove(session)
            .ok_or_else(|| CommandError::UnknownSession(session.clone()))?;
        ctx.composites()
            .discard(&super::CompositeKey::Session(session.clone()));
        debug!(session_id = %session, %service, "session deleted");
        Ok(Message::reply_to(&request))
    }
}

/// Forward a request to the session's backend and relay the answer.
#[derive(Debug)]
pub struct Execute;

#[async_trait]
impl Command for Execute {
    fn message_type(&self) -> MessageType { MessageType::Execute }

    async fn run(&self, ctx: &ResponderContext, request: Message) -> Result<Message, CommandError> {
        let service = owning_service(ctx, session_of(&request)?)?;
        let requester = requester_of(ctx, &service)?;
        let header = request.header_with_body(Body::empty());
        let mut reply = requester
            .send_and_receive(request, ctx.config().operation_timeout)
            .await?;
        if reply.is_fault() {
            let code = reply.fault_code().unwrap_or(FaultCode::Internal);
            return Ok(Message::fault_for(&header, code, reply.body().to_text()));
        }
        let compressed = reply.is_compressed();
        Ok(Message::reply_to(&header)
            .with_body(reply.take_body())
            .with_compressed(compressed))
    }
}

/// Register a subscription on a publish service.
#[derive(Debug)]
pub struct Subscribe;

#[async_trait]
impl Command for Subscribe {
    fn message_type(&self) -> MessageType { MessageType::Subscribe }

    async fn run(&self, ctx: &ResponderContext, request: Message) -> Result<Message, CommandError> {
        let service = service_of(&request)?;
        let queue = queue_of(ctx, service)?;
        let mask = SubscriptionMask::new(mask_of(&request)?)?;
        let session = ctx.sessions().create(service.clone());
        if let Err(error) = queue.subscribe(session.clone(), mask, ctx.config().no_data_interval) {
            ctx.sessions().remove(&session);
            return Err(error.into());
        }
        Ok(Message::reply_to(&request).with_session(session))
    }
}

/// Replace a subscription's mask.
#[derive(Debug)]
pub struct ChangeSubscription;

#[async_trait]
impl Command for ChangeSubscription {
    fn message_type(&self) -> MessageType { MessageType::ChangeSubscription }

    async fn run(&self, ctx: &ResponderContext, request: Message) -> Result<Message, CommandError> {
        let session = session_of(&request)?;
        let queue = queue_of(ctx, &owning_service(ctx, session)?)?;
        let mask = SubscriptionMask::new(mask_of(&request)?)?;
        queue.change_subscription(session, mask)?;
        Ok(Message::reply_to(&request))
    }
}

/// Remove a subscription, waking its pending poll.
#[derive(Debug)]
pub struct Unsubscribe;

#[async_trait]
impl Command for Unsubscribe {
    fn message_type(&self) -> MessageType { MessageType::Unsubscribe }

    async fn run(&self, ctx: &ResponderContext, request: Message) -> Result<Message, CommandError> {
        let session = session_of(&request)?;
        let queue = queue_of(ctx, &owning_service(ctx, session)?)?;
        ctx.sessions().remove(session);
        if !queue.unsubscribe(session) {
            return Err(CommandError::NotSubscribed(session.clone()));
        }
        Ok(Message::reply_to(&request))
    }
}

/// Blocking poll for the next matching publication.
#[derive(Debug)]
pub struct ReceivePublication;

#[async_trait]
impl Command for ReceivePublication {
    fn message_type(&self) -> MessageType { MessageType::ReceivePublication }

    async fn run(&self, ctx: &ResponderContext, request: Message) -> Result<Message, CommandError> {
        let session = session_of(&request)?;
        let queue = queue_of(ctx, &owning_service(ctx, session)?)?;
        match queue.poll(session).await {
            PollOutcome::Message(mut publication) => {
                let mut reply = Message::reply_to(&request)
                    .with_body(publication.take_body())
                    .with_compressed(publication.is_compressed());
                if let Some(mask) = publication.mask() {
                    reply = reply.with_mask(mask);
                }
                Ok(reply)
            }
            PollOutcome::NoData => Ok(Message::reply_to(&request).with_no_data(true)),
            PollOutcome::Unsubscribed => Err(CommandError::NotSubscribed(session.clone())),
        }
    }
}

/// Append a publication to a publish service's queue.
#[derive(Debug)]
pub struct Publish;

#[async_trait]
impl Command for Publish {
    fn message_type(&self) -> MessageType { MessageType::Publish }

    async fn run(&self, ctx: &ResponderContext, mut request: Message) -> Result<Message, CommandError> {
        let service = service_of(&request)?.clone();
        let queue = queue_of(ctx, &service)?;
        let mask = mask_of(&request)?.to_owned();
        validate_message_mask(&mask)?;
        let publication = Message::request(MessageType::Publish)
            .with_service(service)
            .with_mask(mask)
            .with_compressed(request.is_compressed())
            .with_body(request.take_body());
        queue.insert(publication);
        Ok(Message::reply_to(&request))
    }
}
