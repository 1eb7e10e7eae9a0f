use thiserror::Error;

use super::MaskError;
use crate::message::SessionId;

/// Errors returned by [`SubscriptionQueue`](super::SubscriptionQueue)
/// management calls.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("session {0} is already subscribed")]
    AlreadySubscribed(SessionId),
    #[error("session {0} is not subscribed")]
    NotSubscribed(SessionId),
    #[error(transparent)]
    Mask(#[from] MaskError),
}
