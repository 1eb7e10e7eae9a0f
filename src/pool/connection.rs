//! Connections as tracked by the pool.

use std::{
    fmt,
    sync::{Arc, Mutex, Weak},
};

use tokio::{select, sync::Mutex as AsyncMutex, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{PoolState, lock_state};
use crate::{
    message::Message,
    metrics,
    transport::{Connection, ConnectionError, Endpoint},
};

/// Identifier assigned to a pooled connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

/// Lifecycle position of a pooled connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// In the pool, unused.
    Free,
    /// Leased out.
    Used,
    /// Disconnected and no longer tracked.
    Destroyed,
}

/// Transport slot shared between a lease and its pool.
///
/// The slot is emptied by the first disconnect, so a connection is never
/// disconnected twice however its lease and its pool race.
#[derive(Clone)]
pub(super) struct SharedTransport {
    id: ConnectionId,
    slot: Arc<AsyncMutex<Option<Box<dyn Connection>>>>,
    closed: CancellationToken,
}

impl SharedTransport {
    fn new(id: ConnectionId, connection: Box<dyn Connection>) -> Self {
        Self {
            id,
            slot: Arc::new(AsyncMutex::new(Some(connection))),
            closed: CancellationToken::new(),
        }
    }

    /// Abort in-flight I/O on the lease and disconnect the transport.
    pub(super) async fn shut_down(&self) {
        self.closed.cancel();
        let Some(mut connection) = self.slot.lock().await.take() else {
            return;
        };
        if let Err(error) = connection.disconnect().await {
            warn!(connection_id = %self.id, %error, "disconnect failed");
        }
    }
}

/// A transport connection owned by a pool.
///
/// While leased (`state() == Used`) the holder has exclusive access. A lease
/// that is dropped instead of being handed back through
/// [`ConnectionPool::release`](crate::pool::ConnectionPool::release) or
/// [`ConnectionPool::force_close`](crate::pool::ConnectionPool::force_close)
/// frees its pool slot and closes the transport with it. Destroying the pool
/// disconnects outstanding leases at once; their later I/O fails with
/// [`ConnectionError::Closed`].
pub struct PooledConnection {
    id: ConnectionId,
    endpoint: Endpoint,
    transport: SharedTransport,
    state: ConnectionState,
    idle_since: Instant,
    idles_in_sequence: u32,
    pool: Weak<Mutex<PoolState>>,
}

impl PooledConnection {
    pub(super) fn new(
        id: ConnectionId,
        connection: Box<dyn Connection>,
        pool: Weak<Mutex<PoolState>>,
    ) -> Self {
        Self {
            id,
            endpoint: connection.endpoint().clone(),
            transport: SharedTransport::new(id, connection),
            state: ConnectionState::Used,
            idle_since: Instant::now(),
            idles_in_sequence: 0,
            pool,
        }
    }

    /// Pool-assigned identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId { self.id }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState { self.state }

    /// Remote endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint { &self.endpoint }

    /// Keep-alive probes sent since the connection was last used.
    #[must_use]
    pub const fn idles_in_sequence(&self) -> u32 { self.idles_in_sequence }

    /// Send one frame and wait for the peer's answer.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] once the pool was destroyed, and
    /// the transport's error otherwise.
    pub async fn send_and_receive(&mut self, frame: Message) -> Result<Message, ConnectionError> {
        let transport = &self.transport;
        select! {
            biased;
            () = transport.closed.cancelled() => Err(ConnectionError::Closed),
            result = async {
                match transport.slot.lock().await.as_mut() {
                    Some(connection) => connection.send_and_receive(frame).await,
                    None => Err(ConnectionError::Closed),
                }
            } => result,
        }
    }

    /// Send a keep-alive probe.
    ///
    /// # Errors
    ///
    /// As for [`PooledConnection::send_and_receive`].
    pub async fn probe(&mut self) -> Result<(), ConnectionError> {
        let transport = &self.transport;
        select! {
            biased;
            () = transport.closed.cancelled() => Err(ConnectionError::Closed),
            result = async {
                match transport.slot.lock().await.as_mut() {
                    Some(connection) => connection.probe().await,
                    None => Err(ConnectionError::Closed),
                }
            } => result,
        }
    }

    pub(super) async fn is_connected(&self) -> bool {
        !self.transport.closed.is_cancelled()
            && self
                .transport
                .slot
                .lock()
                .await
                .as_ref()
                .is_some_and(|connection| connection.is_connected())
    }

    pub(super) fn lease_handle(&self) -> SharedTransport { self.transport.clone() }

    pub(super) fn idle_since(&self) -> Instant { self.idle_since }

    pub(super) fn mark_used(&mut self) {
        self.state = ConnectionState::Used;
        self.idles_in_sequence = 0;
    }

    pub(super) fn mark_free(&mut self) {
        self.state = ConnectionState::Free;
        self.idle_since = Instant::now();
    }

    pub(super) fn mark_probed(&mut self) {
        self.state = ConnectionState::Free;
        self.idle_since = Instant::now();
        self.idles_in_sequence = self.idles_in_sequence.saturating_add(1);
    }

    pub(super) fn mark_probing(&mut self) { self.state = ConnectionState::Used; }

    /// Disconnect the transport and mark the connection destroyed.
    pub(super) async fn close(mut self) {
        self.state = ConnectionState::Destroyed;
        self.transport.shut_down().await;
        metrics::dec_connections();
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("idles_in_sequence", &self.idles_in_sequence)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        match self.state {
            ConnectionState::Destroyed => return,
            ConnectionState::Free => {}
            ConnectionState::Used => {
                warn!(connection_id = %self.id, "lease dropped without release; closing connection");
                if let Some(pool) = self.pool.upgrade() {
                    lock_state(&pool).used.remove(&self.id);
                }
            }
        }
        metrics::dec_connections();
    }
}
