//! Publish/subscribe fan-out queue.
//!
//! A [`SubscriptionQueue`] holds one append-only sequence of publications per
//! publish service. Every subscriber owns a cursor into it, filtered by its
//! [`SubscriptionMask`], and consumes at its own pace. Publications live in an
//! arena addressed by absolute index; the head is pruned as soon as no cursor
//! points at it or anything before it.
//!
//! A subscriber with nothing to read can [`listen`](SubscriptionQueue::listen):
//! the returned handle resolves when a matching publication arrives, when the
//! subscriber's no-data interval elapses, or when it is unsubscribed. Timers
//! run as spawned tasks that take the queue lock before firing, so a timer
//! never races the insert or unsubscribe that cancels it.

mod error;
mod listen;
mod mask;

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

pub use error::SubscriptionError;
pub use listen::{ListenEvent, ListenHandle, PollOutcome};
pub use mask::{MaskError, SubscriptionMask, WILDCARD, validate_message_mask};
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, trace};

use crate::{
    message::{Message, ServiceName, SessionId},
    metrics,
};

#[derive(Debug)]
struct Listener {
    notify: oneshot::Sender<ListenEvent>,
    timer: JoinHandle<()>,
    generation: u64,
}

impl Listener {
    fn fire(self, event: ListenEvent) {
        self.timer.abort();
        let _ = self.notify.send(event);
    }
}

#[derive(Debug)]
struct Subscription {
    mask: SubscriptionMask,
    current: Option<u64>,
    no_data_interval: Duration,
    listener: Option<Listener>,
    generation: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    nodes: VecDeque<Message>,
    head: u64,
    subscriptions: HashMap<SessionId, Subscription>,
}

impl QueueState {
    fn tail(&self) -> u64 { self.head + self.nodes.len() as u64 }

    fn node(&self, index: u64) -> Option<&Message> {
        let offset = usize::try_from(index.checked_sub(self.head)?).ok()?;
        self.nodes.get(offset)
    }

    /// First index at or after `from` whose publication passes `mask`.
    fn next_match(&self, mask: &SubscriptionMask, from: u64) -> Option<u64> {
        (from.max(self.head)..self.tail()).find(|&index| {
            self.node(index)
                .and_then(Message::mask)
                .is_some_and(|m| mask.matches(m))
        })
    }

    fn prune(&mut self) {
        let floor = self
            .subscriptions
            .values()
            .filter_map(|sub| sub.current)
            .min()
            .unwrap_or_else(|| self.tail());
        let mut pruned = 0_usize;
        while self.head < floor && self.nodes.pop_front().is_some() {
            self.head += 1;
            pruned += 1;
        }
        if pruned > 0 {
            trace!(pruned, head = self.head, "pruned publications");
        }
    }
}

/// Multi-subscriber delivery queue for one publish service.
#[derive(Debug)]
pub struct SubscriptionQueue {
    service: ServiceName,
    state: Arc<Mutex<QueueState>>,
}

impl SubscriptionQueue {
    /// Create an empty queue for `service`.
    #[must_use]
    pub fn new(service: ServiceName) -> Self {
        Self {
            service,
            state: Arc::new(Mutex::new(QueueState::default())),
        }
    }

    /// Publish service the queue belongs to.
    #[must_use]
    pub fn service(&self) -> &ServiceName { &self.service }

    fn lock(&self) -> MutexGuard<'_, QueueState> { lock_queue(&self.state) }

    /// Append a publication and wake caught-up subscribers whose mask matches.
    ///
    /// Publications without a mask match no subscriber.
    pub fn insert(&self, message: Message) {
        let mut state = self.lock();
        let index = state.tail();
        let mask = message.mask().map(str::to_owned);
        state.nodes.push_back(message);
        metrics::inc_publications();

        let mut woken = 0_usize;
        for (id, sub) in &mut state.subscriptions {
            let matches = mask.as_deref().is_some_and(|m| sub.mask.matches(m));
            if sub.current.is_some() || !matches {
                continue;
            }
            sub.current = Some(index);
            if let Some(listener) = sub.listener.take() {
                debug!(service = %self.service, session_id = %id, "waking subscriber");
                listener.fire(ListenEvent::MessageReady);
                woken += 1;
            }
        }
        trace!(service = %self.service, index, woken, "publication inserted");
        state.prune();
    }

    /// Register `id` with `mask`. The cursor starts past every publication
    /// already queued.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::AlreadySubscribed`] if `id` is registered.
    pub fn subscribe(
        &self,
        id: SessionId,
        mask: SubscriptionMask,
        no_data_interval: Duration,
    ) -> Result<(), SubscriptionError> {
        let mut state = self.lock();
        if state.subscriptions.contains_key(&id) {
            return Err(SubscriptionError::AlreadySubscribed(id));
        }
        debug!(service = %self.service, session_id = %id, %mask, "subscribed");
        state.subscriptions.insert(
            id,
            Subscription {
                mask,
                current: None,
                no_data_interval,
                listener: None,
                generation: 0,
            },
        );
        Ok(())
    }

    /// Replace the mask of `id`.
    ///
    /// The cursor stays on its current publication if that still matches and
    /// otherwise moves forward to the next match. It never moves backwards.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::NotSubscribed`] for unknown ids.
    pub fn change_subscription(
        &self,
        id: &SessionId,
        mask: SubscriptionMask,
    ) -> Result<(), SubscriptionError> {
        let mut state = self.lock();
        let Some(current) = state
            .subscriptions
            .get(id)
            .map(|sub| sub.current)
        else {
            return Err(SubscriptionError::NotSubscribed(id.clone()));
        };
        let current = current.and_then(|index| state.next_match(&mask, index));
        debug!(service = %self.service, session_id = %id, %mask, "subscription changed");
        if let Some(sub) = state.subscriptions.get_mut(id) {
            sub.mask = mask;
            sub.current = current;
        }
        state.prune();
        Ok(())
    }

    /// Take the publication at the cursor of `id` and advance the cursor.
    ///
    /// Returns `None` when nothing is waiting or `id` is unknown.
    #[must_use]
    pub fn get_message(&self, id: &SessionId) -> Option<Message> {
        let mut state = self.lock();
        let sub = state.subscriptions.get(id)?;
        let index = sub.current?;
        let next = state.next_match(&sub.mask, index + 1);
        let message = state.node(index).cloned();
        if let Some(sub) = state.subscriptions.get_mut(id) {
            sub.current = next;
        }
        message
    }

    /// Wait for the next publication matching `id`.
    ///
    /// Resolves immediately with [`ListenEvent::MessageReady`] if one is
    /// already waiting and with [`ListenEvent::Unsubscribed`] for unknown ids.
    /// Otherwise the subscriber's no-data timer is armed. A second `listen`
    /// replaces the first, which resolves with [`ListenEvent::NoData`].
    pub fn listen(&self, id: &SessionId) -> ListenHandle {
        let mut state = self.lock();
        let Some(sub) = state.subscriptions.get_mut(id) else {
            return ListenHandle::ready(ListenEvent::Unsubscribed);
        };
        if sub.current.is_some() {
            return ListenHandle::ready(ListenEvent::MessageReady);
        }
        if let Some(previous) = sub.listener.take() {
            previous.fire(ListenEvent::NoData);
        }

        sub.generation += 1;
        let generation = sub.generation;
        let timer = spawn_no_data_timer(
            Arc::downgrade(&self.state),
            id.clone(),
            generation,
            sub.no_data_interval,
        );
        let (tx, rx) = oneshot::channel();
        sub.listener = Some(Listener {
            notify: tx,
            timer,
            generation,
        });
        trace!(service = %self.service, session_id = %id, "listening");
        ListenHandle::new(rx)
    }

    /// Take the next publication for `id`, waiting up to the subscriber's
    /// no-data interval if none is queued.
    pub async fn poll(&self, id: &SessionId) -> PollOutcome {
        loop {
            if let Some(message) = self.get_message(id) {
                return PollOutcome::Message(message);
            }
            match self.listen(id).await {
                ListenEvent::MessageReady => {}
                ListenEvent::NoData => return PollOutcome::NoData,
                ListenEvent::Unsubscribed => return PollOutcome::Unsubscribed,
            }
        }
    }

    /// Remove `id`. A pending listen resolves with
    /// [`ListenEvent::Unsubscribed`].
    ///
    /// Returns `false` for unknown ids.
    pub fn unsubscribe(&self, id: &SessionId) -> bool {
        let mut state = self.lock();
        let Some(mut sub) = state.subscriptions.remove(id) else {
            return false;
        };
        if let Some(listener) = sub.listener.take() {
            listener.fire(ListenEvent::Unsubscribed);
        }
        debug!(service = %self.service, session_id = %id, "unsubscribed");
        state.prune();
        true
    }

    /// Number of publications retained.
    #[must_use]
    pub fn len(&self) -> usize { self.lock().nodes.len() }

    /// Whether no publication is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.lock().nodes.is_empty() }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize { self.lock().subscriptions.len() }

    /// Whether `id` is registered.
    #[must_use]
    pub fn is_subscribed(&self, id: &SessionId) -> bool {
        self.lock().subscriptions.contains_key(id)
    }

    /// Whether `id` has a pending listen.
    #[must_use]
    pub fn is_listening(&self, id: &SessionId) -> bool {
        self.lock()
            .subscriptions
            .get(id)
            .is_some_and(|sub| sub.listener.is_some())
    }

    /// Mask of `id`, if registered.
    #[must_use]
    pub fn mask(&self, id: &SessionId) -> Option<SubscriptionMask> {
        self.lock().subscriptions.get(id).map(|sub| sub.mask.clone())
    }
}

impl Drop for SubscriptionQueue {
    fn drop(&mut self) {
        let mut state = self.lock();
        for sub in state.subscriptions.values_mut() {
            if let Some(listener) = sub.listener.take() {
                listener.fire(ListenEvent::Unsubscribed);
            }
        }
    }
}

fn lock_queue(state: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn spawn_no_data_timer(
    state: Weak<Mutex<QueueState>>,
    id: SessionId,
    generation: u64,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(interval).await;
        let Some(state) = state.upgrade() else {
            return;
        };
        let mut state = lock_queue(&state);
        let Some(sub) = state.subscriptions.get_mut(&id) else {
            return;
        };
        if sub
            .listener
            .as_ref()
            .is_some_and(|listener| listener.generation == generation)
            && let Some(listener) = sub.listener.take()
        {
            debug!(session_id = %id, "no data before timeout");
            let _ = listener.notify.send(ListenEvent::NoData);
        }
    })
}
