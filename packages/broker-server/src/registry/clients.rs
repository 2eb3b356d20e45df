//! The client registry: every logged-in-or-logging-in connection, keyed by `ClientGuid`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use hubline_core::{ClientGuid, Envelope};
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::sync::SyncCorrelator;

/// A registered client's address, outbound channel, login state, and
/// outstanding sync requests.
///
/// `addr` and `outbox` are individually locked rather than the whole entry so
/// that [`ClientRegistry::update_client`] can swap them atomically with
/// respect to each other without blocking unrelated readers of `logged_in`
/// or `email`. `correlator` lives here, rather than on the connection worker
/// alone, so a reply arriving on a *different* connection can still resolve
/// a sync request this client made.
pub struct ClientEntry {
    pub guid: ClientGuid,
    pub connected_at: Instant,
    pub correlator: SyncCorrelator,
    addr: RwLock<SocketAddr>,
    outbox: RwLock<mpsc::Sender<Envelope>>,
    logged_in: AtomicBool,
    email: RwLock<Option<String>>,
}

impl ClientEntry {
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        *self.addr.read()
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::Acquire)
    }

    pub fn set_logged_in(&self, email: String) {
        *self.email.write() = Some(email);
        self.logged_in.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn email(&self) -> Option<String> {
        self.email.read().clone()
    }

    /// Attempts to enqueue an envelope for delivery without blocking.
    ///
    /// Returns `false` if the connection's outbound channel is full or closed.
    #[must_use]
    pub fn try_send(&self, envelope: Envelope) -> bool {
        self.outbox.read().try_send(envelope).is_ok()
    }
}

/// Thread-safe registry of all connected clients, keyed by `ClientGuid`.
///
/// Backed by `DashMap` so reads and writes for different clients never
/// contend with one another; no method here calls another while holding a
/// shard guard, so there is no risk of a nested-lock deadlock.
#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<ClientGuid, Arc<ClientEntry>>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a brand-new client connection.
    pub fn add_client(
        &self,
        guid: ClientGuid,
        addr: SocketAddr,
        outbox: mpsc::Sender<Envelope>,
    ) -> Arc<ClientEntry> {
        let entry = Arc::new(ClientEntry {
            guid,
            connected_at: Instant::now(),
            correlator: SyncCorrelator::new(),
            addr: RwLock::new(addr),
            outbox: RwLock::new(outbox),
            logged_in: AtomicBool::new(false),
            email: RwLock::new(None),
        });
        self.clients.insert(guid, Arc::clone(&entry));
        entry
    }

    /// Replaces an existing client's transport handle in place.
    ///
    /// Used when a client reconnects from a different `(ip, port)` while its
    /// prior connection handle is still registered: the new handle takes
    /// over and the caller is responsible for tearing down the old one.
    pub fn update_client(
        &self,
        guid: ClientGuid,
        addr: SocketAddr,
        outbox: mpsc::Sender<Envelope>,
    ) -> Option<Arc<ClientEntry>> {
        let entry = self.clients.get(&guid)?.clone();
        *entry.addr.write() = addr;
        *entry.outbox.write() = outbox;
        Some(entry)
    }

    pub fn remove_client(&self, guid: ClientGuid) -> Option<Arc<ClientEntry>> {
        self.clients.remove(&guid).map(|(_, entry)| entry)
    }

    #[must_use]
    pub fn get_client(&self, guid: ClientGuid) -> Option<Arc<ClientEntry>> {
        self.clients.get(&guid).map(|r| Arc::clone(r.value()))
    }

    #[must_use]
    pub fn is_client_connected(&self, guid: ClientGuid) -> bool {
        self.clients.contains_key(&guid)
    }

    #[must_use]
    pub fn all_clients(&self) -> Vec<Arc<ClientEntry>> {
        self.clients.iter().map(|e| Arc::clone(e.value())).collect()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.clients.len()
    }

    /// Removes and returns every registered client. Used during shutdown.
    pub fn drain_all(&self) -> Vec<Arc<ClientEntry>> {
        let guids: Vec<ClientGuid> = self.clients.iter().map(|e| *e.key()).collect();
        guids
            .into_iter()
            .filter_map(|g| self.clients.remove(&g).map(|(_, entry)| entry))
            .collect()
    }
}
