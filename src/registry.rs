//! Name lookups for services and sessions.
//!
//! [`ServiceRegistry`] maps service names to the handle that serves them: a
//! [`Requester`] for session services or a [`SubscriptionQueue`] for publish
//! services. [`SessionTable`] records which service owns each live session.
//! Both are concurrent maps so command handlers can share them without an
//! outer lock.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;

use crate::{
    message::{ServiceName, SessionId},
    requester::Requester,
    subscription::SubscriptionQueue,
};

/// What serves a registered service.
#[derive(Clone, Debug)]
pub enum ServiceHandle {
    /// Request/reply service reached through a requester.
    Session(Arc<Requester>),
    /// Publish service fanned out through a subscription queue.
    Publish(Arc<SubscriptionQueue>),
}

impl ServiceHandle {
    /// The requester, for session services.
    #[must_use]
    pub fn requester(&self) -> Option<&Arc<Requester>> {
        match self {
            Self::Session(requester) => Some(requester),
            Self::Publish(_) => None,
        }
    }

    /// The queue, for publish services.
    #[must_use]
    pub fn queue(&self) -> Option<&Arc<SubscriptionQueue>> {
        match self {
            Self::Publish(queue) => Some(queue),
            Self::Session(_) => None,
        }
    }
}

/// Concurrent registry of services keyed by [`ServiceName`].
#[derive(Debug, Default)]
pub struct ServiceRegistry(DashMap<ServiceName, ServiceHandle>);

impl ServiceRegistry {
    /// Register `handle` under `name`, returning the handle it replaces.
    pub fn register(&self, name: ServiceName, handle: ServiceHandle) -> Option<ServiceHandle> {
        self.0.insert(name, handle)
    }

    /// Look up the handle for `name`.
    #[must_use]
    pub fn get(&self, name: &ServiceName) -> Option<ServiceHandle> {
        self.0.get(name).map(|entry| entry.value().clone())
    }

    /// Remove `name`, typically when its backend is deregistered.
    pub fn remove(&self, name: &ServiceName) -> Option<ServiceHandle> {
        self.0.remove(name).map(|(_, handle)| handle)
    }

    /// Names of every registered service.
    #[must_use]
    pub fn names(&self) -> Vec<ServiceName> { self.0.iter().map(|e| e.key().clone()).collect() }
}

/// Live sessions and subscriptions with their owning service.
#[derive(Debug)]
pub struct SessionTable {
    sessions: DashMap<SessionId, ServiceName>,
    next_id: AtomicU64,
}

impl Default for SessionTable {
    fn default() -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl SessionTable {
    /// Allocate a fresh session identifier owned by `service`.
    pub fn create(&self, service: ServiceName) -> SessionId {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = SessionId::new(format!("{service}-{n}"));
        self.sessions.insert(id.clone(), service);
        id
    }

    /// Service owning `id`.
    #[must_use]
    pub fn service_of(&self, id: &SessionId) -> Option<ServiceName> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Forget `id`, returning its owning service.
    pub fn remove(&self, id: &SessionId) -> Option<ServiceName> {
        self.sessions.remove(id).map(|(_, service)| service)
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize { self.sessions.len() }

    /// Whether no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.sessions.is_empty() }

    /// Identifiers of the sessions owned by `service`.
    #[must_use]
    pub fn sessions_of(&self, service: &ServiceName) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|entry| entry.value() == service)
            .map(|entry| entry.key().clone())
            .collect()
    }
}
