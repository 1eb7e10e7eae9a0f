//! Shared utilities for integration tests.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{
    error::Error,
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    num::NonZeroUsize,
    time::Duration,
};

use service_connector::{Message, MessageType, ServiceName, SessionId};

/// Result type returned by fallible tests.
pub type TestResult<T = ()> = Result<T, Box<dyn Error + Send + Sync>>;

/// Round-trip timeout used by tests that do not exercise timeouts.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Create a TCP listener bound to a free local port.
#[expect(
    clippy::expect_used,
    reason = "binding to an ephemeral localhost port must abort the test immediately"
)]
pub fn unused_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("failed to bind port")
}

/// Non-zero size helper for part sizes.
#[expect(clippy::expect_used, reason = "test sizes are literals")]
pub fn size(n: usize) -> NonZeroUsize { NonZeroUsize::new(n).expect("non-zero size") }

/// Deterministic binary body of `len` bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| u8::try_from(i % 251).unwrap_or_default())
        .collect()
}

/// Execute request on `session` carrying `body`.
pub fn execute(session: &str, body: Vec<u8>) -> Message {
    Message::request(MessageType::Execute)
        .with_session(SessionId::from(session))
        .with_service(ServiceName::from("backend"))
        .with_body(body)
}
