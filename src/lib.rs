#![doc(html_root_url = "https://docs.rs/service_connector/latest")]
//! Message transport and delivery engine of a service connector.
//!
//! The connector sits between clients and backend servers. This crate holds
//! its core: splitting and re-assembling messages too large for one frame,
//! numbering message and part sequences, pooling transport connections and
//! fanning publications out to subscribers. A [`Responder`] answers inbound
//! frames on the broker side; a [`Requester`] drives exchanges towards a
//! backend over a [`ConnectionPool`].

pub mod codec;
pub mod composite;
pub mod config;
pub mod message;
pub mod metrics;
pub mod pool;
pub mod registry;
pub mod requester;
pub mod responder;
pub mod subscription;
pub mod transport;

pub use codec::{CodecError, DEFAULT_MAX_FRAME_SIZE, DEFAULT_PART_SIZE, WireCodec};
pub use composite::{CompositeError, CompositeReceiver, CompositeSender, CompositeStatus};
pub use config::{ConfigError, PoolConfig, RequesterConfig, ResponderConfig};
pub use message::{
    Body,
    FaultCode,
    Message,
    MessageId,
    MessageKind,
    MessageType,
    SequenceTracker,
    ServiceName,
    SessionId,
};
pub use metrics::Direction;
pub use pool::{ConnectionId, ConnectionPool, IdleOutcome, PoolError, PoolStats, PooledConnection};
pub use registry::{ServiceHandle, ServiceRegistry, SessionTable};
pub use requester::{PendingReply, Requester, RequesterError};
pub use responder::{CommandError, CommandTable, Responder, ResponderContext};
pub use subscription::{
    ListenEvent,
    ListenHandle,
    MaskError,
    PollOutcome,
    SubscriptionError,
    SubscriptionMask,
    SubscriptionQueue,
};
pub use transport::{Connection, ConnectionError, ConnectionFactory, Endpoint};
