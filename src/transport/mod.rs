//! Transport connection contract consumed by the pool and the requester.
//!
//! The core never touches sockets directly. It drives [`Connection`]s created
//! by a [`ConnectionFactory`] for one [`Endpoint`]. [`tcp`] provides a
//! length-delimited TCP implementation; tests plug in scripted peers.

pub mod error;
pub mod tcp;

use std::fmt;

use async_trait::async_trait;

pub use error::ConnectionError;
pub use tcp::{TcpConnection, TcpConnectionFactory};

use crate::message::Message;

/// Remote address served by one connection pool.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint for `host:port`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or address.
    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    /// TCP port.
    #[must_use]
    pub const fn port(&self) -> u16 { self.port }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One transport connection to a remote endpoint.
///
/// Implementations are driven by one task at a time: the pool hands out
/// exclusive leases, so methods take `&mut self`.
#[async_trait]
pub trait Connection: Send + fmt::Debug {
    /// Endpoint this connection talks to.
    fn endpoint(&self) -> &Endpoint;

    /// Establish the transport.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] if the transport cannot be established.
    async fn connect(&mut self) -> Result<(), ConnectionError>;

    /// Tear the transport down. Disconnecting twice is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] if the close handshake fails.
    async fn disconnect(&mut self) -> Result<(), ConnectionError>;

    /// Send one frame and wait for the peer's answer.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] on I/O, codec or peer-close failures.
    async fn send_and_receive(&mut self, frame: Message) -> Result<Message, ConnectionError>;

    /// Whether the transport is believed to be usable.
    fn is_connected(&self) -> bool;

    /// Round-trip a keep-alive probe.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::UnexpectedReply`] when the peer answers
    /// with anything but a keep-alive, or the transport error.
    async fn probe(&mut self) -> Result<(), ConnectionError> {
        let reply = self.send_and_receive(Message::keep_alive()).await?;
        if reply.is_keep_alive() {
            Ok(())
        } else {
            Err(ConnectionError::UnexpectedReply(reply.kind()))
        }
    }
}

/// Creates unconnected [`Connection`]s for an endpoint.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + fmt::Debug {
    /// Build a connection; the pool calls [`Connection::connect`] on it.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] if the connection cannot be created.
    async fn create(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, ConnectionError>;
}
