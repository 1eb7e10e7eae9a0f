//! Metric helpers for the connector.
//!
//! This module defines metric names and thin helpers wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Gauge tracking open pooled connections.
pub const POOL_CONNECTIONS: &str = "connector_pool_connections";
/// Counter tracking frames sent and received by requesters.
pub const FRAMES_TOTAL: &str = "connector_frames_total";
/// Counter tracking composite parts sent and received.
pub const FRAGMENTS_TOTAL: &str = "connector_fragments_total";
/// Counter tracking connections torn down with unknown protocol state.
pub const FORCE_CLOSED_TOTAL: &str = "connector_force_closed_total";
/// Counter tracking errors surfaced to callers.
pub const ERRORS_TOTAL: &str = "connector_errors_total";
/// Counter tracking messages inserted into subscription queues.
pub const PUBLICATIONS_TOTAL: &str = "connector_publications_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Frames received from a peer.
    Inbound,
    /// Frames sent to a peer.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Record a newly opened pooled connection.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(POOL_CONNECTIONS).increment(1.0);
}

/// Record a closed pooled connection.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(POOL_CONNECTIONS).decrement(1.0);
}

/// Record a frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_TOTAL, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a composite part for the given direction.
pub fn inc_fragments(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAGMENTS_TOTAL, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a forced connection teardown.
pub fn inc_force_closed() {
    #[cfg(feature = "metrics")]
    counter!(FORCE_CLOSED_TOTAL).increment(1);
}

/// Record an error surfaced to a caller.
pub fn inc_errors() {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL).increment(1);
}

/// Record a publication inserted into a subscription queue.
pub fn inc_publications() {
    #[cfg(feature = "metrics")]
    counter!(PUBLICATIONS_TOTAL).increment(1);
}
