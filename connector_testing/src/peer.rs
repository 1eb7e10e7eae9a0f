//! Remote peers answering frames sent over mock connections.

use std::{fmt, num::NonZeroUsize, sync::Arc, time::Duration};

use async_trait::async_trait;
use service_connector::{
    Message,
    MessageType,
    WireCodec,
    config::ResponderConfig,
    responder::{Command, CommandError, CommandTable, Responder, ResponderContext},
    transport::ConnectionError,
};

/// Something on the far side of a connection that answers one frame at a
/// time.
#[async_trait]
pub trait Peer: Send + Sync {
    /// Produce the reply to `frame`.
    async fn reply(&self, frame: Message) -> Result<Message, ConnectionError>;
}

struct FnPeer<F>(F);

#[async_trait]
impl<F> Peer for FnPeer<F>
where
    F: Fn(Message) -> Result<Message, ConnectionError> + Send + Sync,
{
    async fn reply(&self, frame: Message) -> Result<Message, ConnectionError> { (self.0)(frame) }
}

/// Peer answering with a synchronous closure.
pub fn scripted<F>(reply: F) -> Arc<dyn Peer>
where
    F: Fn(Message) -> Result<Message, ConnectionError> + Send + Sync + 'static,
{
    Arc::new(FnPeer(reply))
}

/// Peer echoing every request body back and every keep-alive as is.
#[must_use]
pub fn echo() -> Arc<dyn Peer> {
    scripted(|frame| {
        if frame.is_keep_alive() {
            return Ok(Message::keep_alive());
        }
        Ok(Message::reply_to(&frame).with_body(frame.body().clone()))
    })
}

struct Delayed {
    delay: Duration,
    inner: Arc<dyn Peer>,
}

#[async_trait]
impl Peer for Delayed {
    async fn reply(&self, frame: Message) -> Result<Message, ConnectionError> {
        tokio::time::sleep(self.delay).await;
        self.inner.reply(frame).await
    }
}

/// Peer that waits `delay` before letting `inner` answer.
#[must_use]
pub fn delayed(delay: Duration, inner: Arc<dyn Peer>) -> Arc<dyn Peer> {
    Arc::new(Delayed { delay, inner })
}

/// Peer routing frames into a [`Responder`], optionally through a codec.
///
/// With a codec every frame is encoded and decoded in both directions, so
/// the exchange sees exactly what would cross a real socket.
#[derive(Clone)]
pub struct ResponderPeer {
    responder: Responder,
    codec: Option<WireCodec>,
}

impl fmt::Debug for ResponderPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponderPeer")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl ResponderPeer {
    /// Route frames into `responder` as they are.
    #[must_use]
    pub fn new(responder: Responder) -> Self {
        Self {
            responder,
            codec: None,
        }
    }

    /// Pass every frame through `codec` on its way in and out.
    #[must_use]
    pub fn with_codec(mut self, codec: WireCodec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// The wrapped responder.
    #[must_use]
    pub fn responder(&self) -> &Responder { &self.responder }

    /// Share the peer as a trait object.
    #[must_use]
    pub fn shared(self) -> Arc<dyn Peer> { Arc::new(self) }

    fn transcode(&self, frame: Message) -> Result<Message, ConnectionError> {
        match &self.codec {
            Some(codec) => Ok(codec.decode(&codec.encode(&frame)?)?),
            None => Ok(frame),
        }
    }
}

#[async_trait]
impl Peer for ResponderPeer {
    async fn reply(&self, frame: Message) -> Result<Message, ConnectionError> {
        let frame = self.transcode(frame)?;
        let reply = self.responder.handle(frame).await;
        self.transcode(reply)
    }
}

/// Command running a synchronous closure.
pub struct FnCommand<F> {
    message_type: MessageType,
    handler: F,
}

impl<F> FnCommand<F>
where
    F: Fn(Message) -> Message + Send + Sync,
{
    /// Handle `message_type` requests with `handler`.
    pub fn new(message_type: MessageType, handler: F) -> Self {
        Self {
            message_type,
            handler,
        }
    }
}

#[async_trait]
impl<F> Command for FnCommand<F>
where
    F: Fn(Message) -> Message + Send + Sync,
{
    fn message_type(&self) -> MessageType { self.message_type }

    async fn run(&self, _: &ResponderContext, request: Message) -> Result<Message, CommandError> {
        Ok((self.handler)(request))
    }
}

/// Backend answering execute requests with `handler` and speaking the full
/// part and poll protocol, with replies cut at `part_size`.
///
/// # Panics
///
/// Panics if `part_size` does not fit the default frame size.
pub fn backend<F>(part_size: NonZeroUsize, handler: F) -> ResponderPeer
where
    F: Fn(Message) -> Message + Send + Sync + 'static,
{
    let config = ResponderConfig::default().part_size(part_size);
    let context = ResponderContext::new(config).expect("backend config");
    let mut table = CommandTable::default();
    table.register(Arc::new(FnCommand::new(MessageType::Execute, handler)));
    ResponderPeer::new(Responder::with_commands(Arc::new(context), table))
}
