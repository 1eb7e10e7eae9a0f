//! Command failures and their fault codes.

use thiserror::Error;

use crate::{
    composite::CompositeError,
    message::{FaultCode, MessageType, ServiceName, SessionId},
    requester::RequesterError,
    subscription::{MaskError, SubscriptionError},
};

/// Why a command could not be carried out.
///
/// Every variant maps to a [`FaultCode`] so the responder can answer with a
/// fault message instead of dropping the request.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("request carries no service name")]
    MissingService,
    #[error("request carries no session id")]
    MissingSession,
    #[error("request carries no mask")]
    MissingMask,
    #[error("unknown service {0}")]
    UnknownService(ServiceName),
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    #[error("service {service} is not a {expected} service")]
    WrongServiceKind {
        service: ServiceName,
        expected: &'static str,
    },
    #[error("session {0} is not subscribed")]
    NotSubscribed(SessionId),
    #[error("no handler for {0:?} requests")]
    Unsupported(MessageType),
    #[error("no pending reply to poll")]
    NothingToPoll,
    #[error(transparent)]
    Mask(#[from] MaskError),
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
    #[error(transparent)]
    Composite(#[from] CompositeError),
    #[error("backend call failed: {0}")]
    Backend(#[from] RequesterError),
}

impl CommandError {
    /// Fault code reported to the caller.
    #[must_use]
    pub fn fault_code(&self) -> FaultCode {
        match self {
            Self::UnknownService(_) => FaultCode::UnknownService,
            Self::UnknownSession(_) => FaultCode::UnknownSession,
            Self::NotSubscribed(_) | Self::Subscription(SubscriptionError::NotSubscribed(_)) => {
                FaultCode::NotSubscribed
            }
            Self::Backend(_) => FaultCode::ServiceUnavailable,
            Self::MissingService
            | Self::MissingSession
            | Self::MissingMask
            | Self::WrongServiceKind { .. }
            | Self::Unsupported(_)
            | Self::NothingToPoll
            | Self::Mask(_)
            | Self::Subscription(_)
            | Self::Composite(_) => FaultCode::BadRequest,
        }
    }
}
