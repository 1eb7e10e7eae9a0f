//! Test doubles for the service connector.
//!
//! [`MockFactory`] hands out in-memory connections whose far end is a
//! [`Peer`]: a scripted closure, an echo, or a [`ResponderPeer`] running the
//! real broker logic. Every frame sent is recorded for later assertions.
//!
//! ```rust
//! use connector_testing::{MockFactory, echo};
//! use service_connector::PoolConfig;
//!
//! let factory = MockFactory::new(echo());
//! let pool = factory.pool(PoolConfig::default().max_connections(2));
//! assert_eq!(pool.stats().total(), 0);
//! ```

pub mod logging;
pub mod macros;
pub mod mock;
pub mod peer;

pub use logging::{LoggerHandle, logger};
pub use mock::{FrameRecord, MockConnection, MockFactory};
pub use peer::{FnCommand, Peer, ResponderPeer, backend, delayed, echo, scripted};
