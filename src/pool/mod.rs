//! Connection pool for one remote endpoint.
//!
//! [`ConnectionPool`] leases connections to requesters, takes them back,
//! probes idle ones with keep-alives and tears down connections whose
//! protocol state became unknown. Free connections are reused most recently
//! freed first. Leasing never waits: once free plus used connections reach
//! `max_connections` and nothing is free, [`ConnectionPool::acquire`] fails
//! with [`PoolError::Exhausted`] and callers back off on their own.
//!
//! The free list, the used set and the pending-connect count live behind one
//! mutex. Transport I/O (connect, probe, disconnect) always runs with the
//! lock released; a slot reserved for a pending connect counts towards the
//! capacity so the bound holds while the connect is in flight.

mod connection;
mod error;
mod keep_alive;

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use connection::SharedTransport;
pub use connection::{ConnectionId, ConnectionState, PooledConnection};
pub use error::PoolError;
pub use keep_alive::IdleOutcome;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    config::PoolConfig,
    metrics,
    transport::{ConnectionError, ConnectionFactory, Endpoint},
};

pub(crate) struct PoolState {
    free: VecDeque<PooledConnection>,
    used: HashMap<ConnectionId, SharedTransport>,
    pending: usize,
    min_connections: usize,
    max_connections: usize,
    close_on_free: bool,
    destroyed: bool,
}

impl PoolState {
    fn total(&self) -> usize { self.free.len() + self.used.len() + self.pending }

    fn take_free(&mut self, id: ConnectionId) -> Option<PooledConnection> {
        let index = self.free.iter().position(|conn| conn.id() == id)?;
        self.free.remove(index)
    }
}

pub(crate) fn lock_state(state: &Mutex<PoolState>) -> MutexGuard<'_, PoolState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Snapshot of a pool's bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections idle in the pool.
    pub free: usize,
    /// Connections leased out or being probed.
    pub used: usize,
    /// Connections currently being opened.
    pub pending: usize,
    /// Current floor.
    pub min_connections: usize,
    /// Ceiling.
    pub max_connections: usize,
}

impl PoolStats {
    /// Free plus used plus pending connections.
    #[must_use]
    pub const fn total(&self) -> usize { self.free + self.used + self.pending }
}

/// Leases, recycles, keeps alive and destroys connections to one endpoint.
#[derive(Debug)]
pub struct ConnectionPool {
    endpoint: Endpoint,
    factory: Arc<dyn ConnectionFactory>,
    config: PoolConfig,
    state: Arc<Mutex<PoolState>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for PoolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolState")
            .field("free", &self.free.len())
            .field("used", &self.used.len())
            .field("pending", &self.pending)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Create an empty pool for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Config`] if `config` fails validation.
    pub fn new(
        endpoint: Endpoint,
        factory: Arc<dyn ConnectionFactory>,
        config: PoolConfig,
    ) -> Result<Self, PoolError> {
        config.validate()?;
        let state = PoolState {
            free: VecDeque::new(),
            used: HashMap::new(),
            pending: 0,
            min_connections: config.min_connections,
            max_connections: config.max_connections,
            close_on_free: config.close_on_free,
            destroyed: false,
        };
        Ok(Self {
            endpoint,
            factory,
            config,
            state: Arc::new(Mutex::new(state)),
            next_id: AtomicU64::new(1),
        })
    }

    /// Endpoint served by this pool.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint { &self.endpoint }

    /// Configuration the pool was built with.
    #[must_use]
    pub fn config(&self) -> &PoolConfig { &self.config }

    /// Current bookkeeping snapshot.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = lock_state(&self.state);
        PoolStats {
            free: state.free.len(),
            used: state.used.len(),
            pending: state.pending,
            min_connections: state.min_connections,
            max_connections: state.max_connections,
        }
    }

    /// Lease a connection.
    ///
    /// Reuses the most recently freed live connection; dead ones found on the
    /// way are dropped. Opens a new connection when nothing is free and the
    /// pool is below capacity.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Exhausted`] at capacity, [`PoolError::Destroyed`]
    /// after [`ConnectionPool::destroy`], or [`PoolError::Connect`] when a new
    /// connection cannot be opened.
    pub async fn acquire(&self) -> Result<PooledConnection, PoolError> {
        loop {
            let candidate = {
                let mut state = lock_state(&self.state);
                if state.destroyed {
                    return Err(PoolError::Destroyed);
                }
                if let Some(mut conn) = state.free.pop_front() {
                    state.used.insert(conn.id(), conn.lease_handle());
                    conn.mark_used();
                    Some(conn)
                } else if state.total() < state.max_connections {
                    state.pending += 1;
                    None
                } else {
                    return Err(PoolError::Exhausted {
                        max: state.max_connections,
                    });
                }
            };

            let Some(conn) = candidate else {
                return self.open_leased().await;
            };
            if conn.is_connected().await {
                debug!(connection_id = %conn.id(), endpoint = %self.endpoint, "connection reused");
                return Ok(conn);
            }
            debug!(connection_id = %conn.id(), "dropping dead pooled connection");
            lock_state(&self.state).used.remove(&conn.id());
            conn.close().await;
        }
    }

    /// Hand a leased connection back.
    ///
    /// With `close_on_free` set and the pool already at or above its floor,
    /// the connection is disconnected instead of pooled.
    pub async fn release(&self, mut conn: PooledConnection) {
        {
            let mut state = lock_state(&self.state);
            let tracked = !state.destroyed && state.used.remove(&conn.id()).is_some();
            let surplus = state.close_on_free && state.total() >= state.min_connections;
            if tracked && !surplus {
                conn.mark_free();
                debug!(connection_id = %conn.id(), "connection released");
                state.free.push_front(conn);
                return;
            }
        }
        debug!(connection_id = %conn.id(), "connection closed on release");
        conn.close().await;
    }

    /// Remove a connection whose protocol state is unknown and disconnect it.
    pub async fn force_close(&self, conn: PooledConnection) {
        {
            let mut state = lock_state(&self.state);
            state.used.remove(&conn.id());
        }
        warn!(connection_id = %conn.id(), endpoint = %self.endpoint, "connection force-closed");
        metrics::inc_force_closed();
        conn.close().await;
    }

    /// Disconnect and drop every connection, free and leased.
    ///
    /// Leases still out are disconnected immediately; their holders see
    /// [`ConnectionError::Closed`] on the next frame and hand back a dead
    /// connection. Calling this more than once is harmless.
    pub async fn destroy(&self) {
        let (free, leased): (Vec<PooledConnection>, Vec<SharedTransport>) = {
            let mut state = lock_state(&self.state);
            if !state.destroyed {
                info!(endpoint = %self.endpoint, "destroying connection pool");
            }
            state.destroyed = true;
            (
                state.free.drain(..).collect(),
                state.used.drain().map(|(_, lease)| lease).collect(),
            )
        };
        for lease in leased {
            lease.shut_down().await;
        }
        for conn in free {
            conn.close().await;
        }
    }

    /// Eagerly open connections until the pool holds `max_connections`.
    ///
    /// The floor is raised to the ceiling while connections are opened and
    /// reset to 1 afterwards.
    ///
    /// # Errors
    ///
    /// Returns the first [`PoolError`] hit; connections opened before the
    /// failure stay pooled.
    pub async fn warm_up(&self) -> Result<(), PoolError> {
        let missing = {
            let mut state = lock_state(&self.state);
            if state.destroyed {
                return Err(PoolError::Destroyed);
            }
            state.min_connections = state.max_connections;
            let missing = state.max_connections.saturating_sub(state.total());
            state.pending += missing;
            missing
        };

        let mut result = Ok(());
        for opened in 0..missing {
            match self.open().await {
                Ok(mut conn) => {
                    let mut state = lock_state(&self.state);
                    state.pending -= 1;
                    conn.mark_free();
                    state.free.push_front(conn);
                }
                Err(error) => {
                    lock_state(&self.state).pending -= missing - opened;
                    result = Err(error);
                    break;
                }
            }
        }

        lock_state(&self.state).min_connections = 1;
        result
    }

    async fn open_leased(&self) -> Result<PooledConnection, PoolError> {
        let opened = self.open().await;
        let conn = {
            let mut state = lock_state(&self.state);
            state.pending -= 1;
            let conn = opened?;
            if !state.destroyed {
                state.used.insert(conn.id(), conn.lease_handle());
                return Ok(conn);
            }
            conn
        };
        conn.close().await;
        Err(PoolError::Destroyed)
    }

    async fn open(&self) -> Result<PooledConnection, PoolError> {
        let mut connection = self
            .factory
            .create(&self.endpoint)
            .await
            .map_err(PoolError::Connect)?;
        let timeout = self.config.operation_timeout;
        match tokio::time::timeout(timeout, connection.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => return Err(PoolError::Connect(error)),
            Err(_) => return Err(PoolError::Connect(ConnectionError::Timeout(timeout))),
        }
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        metrics::inc_connections();
        debug!(connection_id = %id, endpoint = %self.endpoint, "connection opened");
        Ok(PooledConnection::new(
            id,
            connection,
            Arc::downgrade(&self.state),
        ))
    }

    /// Identifiers of free connections idle for at least the keep-alive
    /// interval, as of `now`.
    #[must_use]
    pub fn expired_idle(&self, now: Instant) -> Vec<ConnectionId> {
        let interval = self.config.keep_alive_interval;
        lock_state(&self.state)
            .free
            .iter()
            .filter(|conn| now.saturating_duration_since(conn.idle_since()) >= interval)
            .map(PooledConnection::id)
            .collect()
    }
}
