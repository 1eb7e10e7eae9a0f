//! Keep-alive probing of idle pooled connections.

use std::{sync::Arc, time::Duration};

use tokio::{select, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ConnectionId, ConnectionPool, PooledConnection, lock_state};

/// Result of one idle tick for a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdleOutcome {
    /// The probe succeeded and the connection went back to the free list.
    Probed,
    /// The probe failed or timed out; the connection was closed.
    Closed,
    /// The connection stayed idle too long while the pool was above its
    /// floor and was disconnected.
    Retired,
    /// The connection is not free (leased, gone, or the pool is destroyed).
    NotIdle,
}

impl ConnectionPool {
    /// Handle an expired idle timer for the free connection `id`.
    ///
    /// After `max_idles_in_sequence` unanswered-by-use probes a connection is
    /// retired, provided the pool holds more than `min_connections`.
    /// Otherwise a keep-alive probe is sent, bounded by the operation
    /// timeout. The connection is leased for the duration of the probe so it
    /// cannot be handed out mid-probe.
    pub async fn idle_tick(&self, id: ConnectionId) -> IdleOutcome {
        let max_idles = self.config.max_idles_in_sequence;
        let (mut conn, retire) = {
            let mut state = lock_state(&self.state);
            if state.destroyed {
                return IdleOutcome::NotIdle;
            }
            let Some(conn) = state.take_free(id) else {
                return IdleOutcome::NotIdle;
            };
            let retire =
                conn.idles_in_sequence() >= max_idles && state.total() >= state.min_connections;
            if !retire {
                state.used.insert(id, conn.lease_handle());
            }
            (conn, retire)
        };

        if retire {
            debug!(connection_id = %id, idles = conn.idles_in_sequence(), "retiring idle connection");
            conn.close().await;
            return IdleOutcome::Retired;
        }

        conn.mark_probing();
        let timeout = self.config.operation_timeout;
        let probe = tokio::time::timeout(timeout, conn.probe()).await;
        match probe {
            Ok(Ok(())) => {
                let returned = {
                    let mut state = lock_state(&self.state);
                    if !state.destroyed && state.used.remove(&id).is_some() {
                        conn.mark_probed();
                        debug!(connection_id = %id, idles = conn.idles_in_sequence(), "keep-alive probe succeeded");
                        state.free.push_back(conn);
                        None
                    } else {
                        Some(conn)
                    }
                };
                match returned {
                    None => IdleOutcome::Probed,
                    Some(conn) => {
                        conn.close().await;
                        IdleOutcome::Closed
                    }
                }
            }
            Ok(Err(error)) => {
                warn!(connection_id = %id, %error, "keep-alive probe failed");
                self.discard_probed(conn).await;
                IdleOutcome::Closed
            }
            Err(_) => {
                warn!(connection_id = %id, ?timeout, "keep-alive probe timed out");
                self.discard_probed(conn).await;
                IdleOutcome::Closed
            }
        }
    }

    async fn discard_probed(&self, conn: PooledConnection) {
        lock_state(&self.state).used.remove(&conn.id());
        crate::metrics::inc_force_closed();
        conn.close().await;
    }

    /// Run idle ticks in the background until `shutdown` is cancelled.
    ///
    /// The sweep wakes every half keep-alive interval and ticks each free
    /// connection whose idle timer expired. The task holds only a weak
    /// reference and stops on its own once the pool is dropped.
    #[must_use = "the keep-alive task runs until cancelled; keep the handle to await it"]
    pub fn spawn_keep_alive(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let pool = Arc::downgrade(self);
        let period = (self.config.keep_alive_interval / 2).max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                select! {
                    biased;

                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(pool) = pool.upgrade() else { break };
                        for id in pool.expired_idle(Instant::now()) {
                            pool.idle_tick(id).await;
                        }
                    }
                }
            }
            debug!("keep-alive sweeper stopped");
        })
    }
}
