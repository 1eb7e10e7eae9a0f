//! Length-delimited TCP transport.
//!
//! Each frame is a 4-byte big-endian length prefix followed by a
//! [`WireCodec`]-encoded message, matching the framing used by the client
//! runtime of the connector's peers.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::debug;

use super::{Connection, ConnectionError, ConnectionFactory, Endpoint};
use crate::{codec::WireCodec, message::Message};

/// A [`Connection`] over a framed TCP stream.
#[derive(Debug)]
pub struct TcpConnection {
    endpoint: Endpoint,
    codec: WireCodec,
    framed: Option<Framed<TcpStream, LengthDelimitedCodec>>,
}

impl TcpConnection {
    /// Create an unconnected TCP connection.
    #[must_use]
    pub fn new(endpoint: Endpoint, codec: WireCodec) -> Self {
        Self {
            endpoint,
            codec,
            framed: None,
        }
    }

    fn length_codec(&self) -> LengthDelimitedCodec {
        LengthDelimitedCodec::builder()
            .max_frame_length(self.codec.max_frame_size())
            .new_codec()
    }

    async fn exchange(
        framed: &mut Framed<TcpStream, LengthDelimitedCodec>,
        codec: WireCodec,
        frame: &Message,
    ) -> Result<Message, ConnectionError> {
        framed.send(codec.encode(frame)?).await?;
        let Some(reply) = framed.next().await else {
            return Err(ConnectionError::Closed);
        };
        Ok(codec.decode(&reply?)?)
    }
}

#[async_trait]
impl Connection for TcpConnection {
    fn endpoint(&self) -> &Endpoint { &self.endpoint }

    async fn connect(&mut self) -> Result<(), ConnectionError> {
        let stream = TcpStream::connect((self.endpoint.host(), self.endpoint.port())).await?;
        stream.set_nodelay(true)?;
        debug!(endpoint = %self.endpoint, "tcp connection established");
        self.framed = Some(Framed::new(stream, self.length_codec()));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ConnectionError> {
        if let Some(mut framed) = self.framed.take() {
            SinkExt::<Bytes>::close(&mut framed).await?;
            debug!(endpoint = %self.endpoint, "tcp connection closed");
        }
        Ok(())
    }

    async fn send_and_receive(&mut self, frame: Message) -> Result<Message, ConnectionError> {
        let codec = self.codec;
        let framed = self.framed.as_mut().ok_or(ConnectionError::NotConnected)?;
        let result = Self::exchange(framed, codec, &frame).await;
        if matches!(
            result,
            Err(ConnectionError::Io(_) | ConnectionError::Closed)
        ) {
            // The stream is unusable after an I/O failure.
            self.framed = None;
        }
        result
    }

    fn is_connected(&self) -> bool { self.framed.is_some() }
}

/// Creates [`TcpConnection`]s sharing one codec configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnectionFactory {
    codec: WireCodec,
}

impl TcpConnectionFactory {
    /// Create a factory using `codec` for every connection.
    #[must_use]
    pub const fn new(codec: WireCodec) -> Self { Self { codec } }
}

#[async_trait]
impl ConnectionFactory for TcpConnectionFactory {
    async fn create(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, ConnectionError> {
        Ok(Box::new(TcpConnection::new(endpoint.clone(), self.codec)))
    }
}
