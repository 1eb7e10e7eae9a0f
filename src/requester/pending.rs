//! Future resolving to the reply of an asynchronous send.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::oneshot;

use super::RequesterError;
use crate::message::Message;

/// Outstanding reply of [`Requester::send`](super::Requester::send).
///
/// The exchange runs on its own task, so dropping the handle does not cancel
/// it: the connection is still released or force-closed once the exchange
/// ends.
#[derive(Debug)]
#[must_use = "a pending reply does nothing unless awaited"]
pub struct PendingReply {
    correlation_id: u64,
    receiver: oneshot::Receiver<Result<Message, RequesterError>>,
}

impl PendingReply {
    pub(super) fn new(
        correlation_id: u64,
        receiver: oneshot::Receiver<Result<Message, RequesterError>>,
    ) -> Self {
        Self {
            correlation_id,
            receiver,
        }
    }

    /// Correlation identifier stamped on the outgoing message and echoed on
    /// its reply.
    #[must_use]
    pub const fn correlation_id(&self) -> u64 { self.correlation_id }
}

impl Future for PendingReply {
    type Output = Result<Message, RequesterError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(RequesterError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}
