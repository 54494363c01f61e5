//! In-memory client directory and per-recipient mailbox.
//!
//! Both live behind one mutex. Every public method takes the lock exactly
//! once, does a short in-memory operation and releases it, so the lock is
//! never held across network I/O. Because `store_message` and
//! `fetch_messages` serialize on the same lock, the order of entries for a
//! recipient is the order in which their stores completed, whichever
//! connections issued them.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, warn};

use keyrelay_core::{
    ClientId, ClientName, ClientRecord, MailboxEntry, MessageId, MessageType, PublicKey,
};

#[derive(Debug)]
struct StoreInner {
    /// Records in registration order. Nothing is ever removed.
    clients: Vec<ClientRecord>,
    /// Client id -> position in `clients`.
    index: HashMap<ClientId, usize>,
    /// Pending messages per recipient, oldest first.
    mailboxes: HashMap<ClientId, VecDeque<MailboxEntry>>,
    next_message_id: u32,
}

impl StoreInner {
    fn record(&self, id: &ClientId) -> Option<&ClientRecord> {
        self.index.get(id).map(|&pos| &self.clients[pos])
    }

    fn allocate_message_id(&mut self) -> MessageId {
        let id = MessageId(self.next_message_id);
        self.next_message_id = match self.next_message_id.checked_add(1) {
            Some(next) => next,
            None => {
                warn!("Message id counter exhausted, restarting at 1");
                MessageId::FIRST.get()
            }
        };
        id
    }
}

/// Directory of registered clients plus their pending mailboxes.
#[derive(Debug)]
pub struct Store {
    inner: Mutex<StoreInner>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Creates an empty store. The first message id handed out is 1.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                clients: Vec::new(),
                index: HashMap::new(),
                mailboxes: HashMap::new(),
                next_message_id: MessageId::FIRST.get(),
            }),
        }
    }

    /// Every critical section is a single self-contained mutation, so a
    /// panic in another holder cannot leave the data half-updated.
    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a client under a fresh random identifier.
    pub fn register(&self, name: ClientName, public_key: PublicKey) -> ClientId {
        let mut inner = self.lock();

        let mut id = ClientId::generate();
        while id.is_zero() || inner.index.contains_key(&id) {
            id = ClientId::generate();
        }

        let pos = inner.clients.len();
        inner.clients.push(ClientRecord {
            id,
            name,
            public_key,
            last_seen: Utc::now(),
        });
        inner.index.insert(id, pos);
        debug!(client_id = %id, clients = inner.clients.len(), "Client registered");
        id
    }

    /// Returns a snapshot of every directory entry in registration order.
    pub fn list_all(&self) -> Vec<ClientRecord> {
        self.lock().clients.clone()
    }

    /// Looks up a client's public key.
    pub fn get_public_key(&self, id: &ClientId) -> Option<PublicKey> {
        self.lock().record(id).map(|r| r.public_key.clone())
    }

    /// Returns true if `id` is registered.
    pub fn contains(&self, id: &ClientId) -> bool {
        self.lock().index.contains_key(id)
    }

    /// Refreshes the last-seen time of a registered client.
    ///
    /// Returns false (and changes nothing) for unknown ids.
    pub fn touch(&self, id: &ClientId) -> bool {
        let mut inner = self.lock();
        match inner.index.get(id).copied() {
            Some(pos) => {
                inner.clients[pos].last_seen = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Queues a message for `to` and returns its identifier.
    ///
    /// `to` is not checked against the directory.
    pub fn store_message(
        &self,
        from: ClientId,
        to: ClientId,
        message_type: MessageType,
        content: Vec<u8>,
    ) -> MessageId {
        let mut inner = self.lock();
        let id = inner.allocate_message_id();
        inner.mailboxes.entry(to).or_default().push_back(MailboxEntry {
            id,
            to,
            from,
            message_type,
            content,
        });
        id
    }

    /// Removes and returns every message queued for `to`, oldest first.
    pub fn fetch_messages(&self, to: &ClientId) -> Vec<MailboxEntry> {
        self.lock()
            .mailboxes
            .remove(to)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.lock().clients.len()
    }

    /// Number of messages waiting across all mailboxes.
    pub fn pending_count(&self) -> usize {
        self.lock().mailboxes.values().map(VecDeque::len).sum()
    }
}

/// Store shared by every connection task.
pub type SharedStore = Arc<Store>;

/// Creates a new shared store.
pub fn new_shared_store() -> SharedStore {
    Arc::new(Store::new())
}
