//! In-memory connections and factories driven by a [`Peer`].
//!
//! Every frame sent through a [`MockConnection`] is recorded with the number
//! of the connection it travelled on, so tests can assert on sequencing and
//! on which pooled connection carried an exchange.

use std::{
    fmt,
    io,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use service_connector::{
    ConnectionPool,
    Message,
    PoolConfig,
    transport::{Connection, ConnectionError, ConnectionFactory, Endpoint},
};

use crate::peer::Peer;

/// A frame recorded on its way to the peer.
#[derive(Clone, Debug)]
pub struct FrameRecord {
    /// 1-based number of the connection in creation order.
    pub connection: usize,
    /// The frame as sent.
    pub frame: Message,
}

#[derive(Default)]
struct Shared {
    frames: Mutex<Vec<FrameRecord>>,
    created: AtomicUsize,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    probes: AtomicUsize,
    fail_connect: AtomicBool,
    links: Mutex<Vec<Arc<AtomicBool>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connection whose remote end is a [`Peer`].
pub struct MockConnection {
    number: usize,
    endpoint: Endpoint,
    peer: Arc<dyn Peer>,
    shared: Arc<Shared>,
    link: Arc<AtomicBool>,
    connected: bool,
}

impl fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConnection")
            .field("number", &self.number)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn endpoint(&self) -> &Endpoint { &self.endpoint }

    async fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.shared.fail_connect.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into());
        }
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ConnectionError> {
        if std::mem::take(&mut self.connected) {
            self.shared.disconnects.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn send_and_receive(&mut self, frame: Message) -> Result<Message, ConnectionError> {
        if !self.is_connected() {
            return Err(ConnectionError::NotConnected);
        }
        if frame.is_keep_alive() {
            self.shared.probes.fetch_add(1, Ordering::SeqCst);
        }
        lock(&self.shared.frames).push(FrameRecord {
            connection: self.number,
            frame: frame.clone(),
        });
        self.peer.reply(frame).await
    }

    fn is_connected(&self) -> bool { self.connected && self.link.load(Ordering::SeqCst) }
}

/// Factory handing out [`MockConnection`]s to one shared peer.
#[derive(Clone)]
pub struct MockFactory {
    peer: Arc<dyn Peer>,
    shared: Arc<Shared>,
}

impl fmt::Debug for MockFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockFactory")
            .field("created", &self.created())
            .finish_non_exhaustive()
    }
}

impl MockFactory {
    /// Factory whose connections talk to `peer`.
    #[must_use]
    pub fn new(peer: Arc<dyn Peer>) -> Self {
        Self {
            peer,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Build a pool over this factory for a placeholder endpoint.
    ///
    /// # Panics
    ///
    /// Panics if `config` is invalid.
    #[must_use]
    pub fn pool(&self, config: PoolConfig) -> Arc<ConnectionPool> {
        let pool = ConnectionPool::new(Endpoint::new("mock", 0), Arc::new(self.clone()), config)
            .expect("valid pool config");
        Arc::new(pool)
    }

    /// Connections created so far.
    #[must_use]
    pub fn created(&self) -> usize { self.shared.created.load(Ordering::SeqCst) }

    /// Successful connects so far.
    #[must_use]
    pub fn connects(&self) -> usize { self.shared.connects.load(Ordering::SeqCst) }

    /// Disconnects of connected connections so far.
    #[must_use]
    pub fn disconnects(&self) -> usize { self.shared.disconnects.load(Ordering::SeqCst) }

    /// Keep-alive frames sent so far.
    #[must_use]
    pub fn probes(&self) -> usize { self.shared.probes.load(Ordering::SeqCst) }

    /// Make subsequent connects fail with `ConnectionRefused`.
    pub fn fail_connects(&self, fail: bool) { self.shared.fail_connect.store(fail, Ordering::SeqCst); }

    /// Sever connection number `connection` so it reports itself dead.
    pub fn sever(&self, connection: usize) {
        if let Some(link) = lock(&self.shared.links).get(connection - 1) {
            link.store(false, Ordering::SeqCst);
        }
    }

    /// Every recorded frame in send order.
    #[must_use]
    pub fn records(&self) -> Vec<FrameRecord> { lock(&self.shared.frames).clone() }

    /// Every recorded frame in send order, without connection numbers.
    #[must_use]
    pub fn frames(&self) -> Vec<Message> {
        lock(&self.shared.frames)
            .iter()
            .map(|record| record.frame.clone())
            .collect()
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn create(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, ConnectionError> {
        let number = self.shared.created.fetch_add(1, Ordering::SeqCst) + 1;
        let link = Arc::new(AtomicBool::new(true));
        lock(&self.shared.links).push(Arc::clone(&link));
        Ok(Box::new(MockConnection {
            number,
            endpoint: endpoint.clone(),
            peer: Arc::clone(&self.peer),
            shared: Arc::clone(&self.shared),
            link,
            connected: false,
        }))
    }
}
