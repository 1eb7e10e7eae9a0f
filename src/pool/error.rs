//! Error types for connection pools.

use thiserror::Error;

use crate::{config::ConfigError, transport::ConnectionError};

/// Errors returned by [`ConnectionPool`](crate::pool::ConnectionPool).
#[derive(Debug, Error)]
pub enum PoolError {
    /// Every connection is leased and the pool is at capacity.
    #[error("connection pool exhausted: all {max} connections in use")]
    Exhausted { max: usize },
    /// The pool was destroyed.
    #[error("connection pool destroyed")]
    Destroyed,
    /// Opening a new connection failed.
    #[error("failed to open connection: {0}")]
    Connect(#[source] ConnectionError),
    /// The pool configuration is inconsistent.
    #[error("invalid pool configuration: {0}")]
    Config(#[from] ConfigError),
}
