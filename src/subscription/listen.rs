//! Wake-up signals for subscribers waiting on a queue.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::oneshot;

use crate::message::Message;

/// Why a listening subscriber was woken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenEvent {
    /// A matching message is waiting at the subscriber's cursor.
    MessageReady,
    /// The no-data interval elapsed without a matching message.
    NoData,
    /// The subscription was removed while listening.
    Unsubscribed,
}

/// Result of [`SubscriptionQueue::poll`](super::SubscriptionQueue::poll).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    Message(Message),
    NoData,
    Unsubscribed,
}

/// Future returned by [`SubscriptionQueue::listen`](super::SubscriptionQueue::listen).
///
/// Resolves exactly once. A handle whose subscription disappears without an
/// explicit signal resolves to [`ListenEvent::Unsubscribed`].
#[derive(Debug)]
#[must_use = "a listen handle does nothing unless awaited"]
pub struct ListenHandle {
    receiver: oneshot::Receiver<ListenEvent>,
}

impl ListenHandle {
    pub(super) fn new(receiver: oneshot::Receiver<ListenEvent>) -> Self { Self { receiver } }

    pub(super) fn ready(event: ListenEvent) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(event);
        Self::new(rx)
    }
}

impl Future for ListenHandle {
    type Output = ListenEvent;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|event| event.unwrap_or(ListenEvent::Unsubscribed))
    }
}
