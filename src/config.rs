//! Configuration for pools, requesters and responders.
//!
//! Every type derives serde traits with `#[serde(default)]`, so embedding
//! applications can load partial settings from any serde format and fall back
//! to the defaults below. Builder-style setters cover programmatic setup.

use std::{num::NonZeroUsize, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_PART_SIZE};

const DEFAULT_MAX_CONNECTIONS: usize = 100;
const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_MAX_IDLES_IN_SEQUENCE: u32 = 2;
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_NO_DATA_INTERVAL: Duration = Duration::from_secs(30);

/// Smallest part size accepted: the width of the widest UTF-8 character, so
/// text parts cut on character boundaries never exceed the part size.
pub const MIN_PART_SIZE: usize = 4;

/// Errors reported by `validate()`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A pool must allow at least one connection.
    #[error("max_connections must be at least 1")]
    ZeroMaxConnections,
    /// The pool floor is above its ceiling.
    #[error("min_connections {min} exceeds max_connections {max}")]
    MinAboveMax { min: usize, max: usize },
    /// Parts must fit in a frame.
    #[error("part_size {part_size} exceeds max_frame_size {max_frame_size}")]
    PartAboveFrame {
        part_size: usize,
        max_frame_size: usize,
    },
    /// Parts must hold any single UTF-8 character.
    #[error("part_size {0} is below the minimum of {min}", min = MIN_PART_SIZE)]
    PartBelowMinimum(usize),
    /// A duration that drives a timer was zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

/// Settings for a [`ConnectionPool`](crate::pool::ConnectionPool).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on free plus used connections.
    pub max_connections: usize,
    /// Connections kept open even when idle.
    pub min_connections: usize,
    /// Disconnect released connections instead of pooling them once the
    /// pool holds at least `min_connections`.
    pub close_on_free: bool,
    /// Idle time after which a free connection is probed.
    pub keep_alive_interval: Duration,
    /// Consecutive idle probes after which a surplus connection is closed.
    pub max_idles_in_sequence: u32,
    /// Timeout for connect and keep-alive operations.
    pub operation_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 1,
            close_on_free: false,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            max_idles_in_sequence: DEFAULT_MAX_IDLES_IN_SEQUENCE,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

impl PoolConfig {
    /// Set the connection ceiling.
    #[must_use]
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the connection floor.
    #[must_use]
    pub fn min_connections(mut self, min: usize) -> Self {
        self.min_connections = min;
        self
    }

    /// Toggle close-on-free.
    #[must_use]
    pub fn close_on_free(mut self, enabled: bool) -> Self {
        self.close_on_free = enabled;
        self
    }

    /// Set the keep-alive interval.
    #[must_use]
    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Set the idle probe budget.
    #[must_use]
    pub fn max_idles_in_sequence(mut self, idles: u32) -> Self {
        self.max_idles_in_sequence = idles;
        self
    }

    /// Set the connect and probe timeout.
    #[must_use]
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Check the settings for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first inconsistency found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::ZeroMaxConnections);
        }
        if self.min_connections > self.max_connections {
            return Err(ConfigError::MinAboveMax {
                min: self.min_connections,
                max: self.max_connections,
            });
        }
        if self.keep_alive_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("keep_alive_interval"));
        }
        if self.operation_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("operation_timeout"));
        }
        Ok(())
    }
}

/// Settings for a [`Requester`](crate::requester::Requester).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequesterConfig {
    /// Bodies longer than this travel as composites of parts this size.
    pub part_size: NonZeroUsize,
    /// Frame limit of the wire codec in use.
    pub max_frame_size: usize,
    /// Cap on a re-assembled reply body.
    pub max_message_size: usize,
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self {
            part_size: default_part_size(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_message_size: usize::MAX,
        }
    }
}

impl RequesterConfig {
    /// Set the part size.
    #[must_use]
    pub fn part_size(mut self, part_size: NonZeroUsize) -> Self {
        self.part_size = part_size;
        self
    }

    /// Set the re-assembly cap.
    #[must_use]
    pub fn max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Check the settings for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::PartAboveFrame`] when parts cannot fit a frame.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_part_size(self.part_size, self.max_frame_size)
    }
}

/// Settings for a [`Responder`](crate::responder::Responder).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    /// Replies longer than this are served as composites.
    pub part_size: NonZeroUsize,
    /// Frame limit of the wire codec in use.
    pub max_frame_size: usize,
    /// Cap on a re-assembled request body.
    pub max_message_size: usize,
    /// Timeout applied when forwarding requests to backends.
    pub operation_timeout: Duration,
    /// How long a publication poll waits for data.
    pub no_data_interval: Duration,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            part_size: default_part_size(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_message_size: usize::MAX,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            no_data_interval: DEFAULT_NO_DATA_INTERVAL,
        }
    }
}

impl ResponderConfig {
    /// Set the part size.
    #[must_use]
    pub fn part_size(mut self, part_size: NonZeroUsize) -> Self {
        self.part_size = part_size;
        self
    }

    /// Set the cap on re-assembled request bodies.
    #[must_use]
    pub fn max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Set the backend timeout.
    #[must_use]
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the publication no-data interval.
    #[must_use]
    pub fn no_data_interval(mut self, interval: Duration) -> Self {
        self.no_data_interval = interval;
        self
    }

    /// Check the settings for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first inconsistency found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_part_size(self.part_size, self.max_frame_size)?;
        if self.no_data_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("no_data_interval"));
        }
        if self.operation_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("operation_timeout"));
        }
        Ok(())
    }
}

fn default_part_size() -> NonZeroUsize {
    NonZeroUsize::new(DEFAULT_PART_SIZE).unwrap_or(NonZeroUsize::MIN)
}

fn check_part_size(part_size: NonZeroUsize, max_frame_size: usize) -> Result<(), ConfigError> {
    if part_size.get() < MIN_PART_SIZE {
        return Err(ConfigError::PartBelowMinimum(part_size.get()));
    }
    if part_size.get() > max_frame_size {
        return Err(ConfigError::PartAboveFrame {
            part_size: part_size.get(),
            max_frame_size,
        });
    }
    Ok(())
}
