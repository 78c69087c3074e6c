use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

/// Unique identifier for a connected client
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// A registered client: its bounded outbound queue plus a peer label for logs
struct RegisteredClient {
    sender: mpsc::Sender<Vec<u8>>,
    peer: String,
}

/// Result of one broadcast pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Clients the payload was queued for
    pub delivered: usize,
    /// Clients removed because their queue was full or closed
    pub evicted: usize,
}

/// The live set of connected clients.
///
/// Membership only, no ordering. `broadcast` never blocks: each client's
/// outbound queue is bounded, and a client whose queue is full or closed at
/// delivery time is evicted. Dropping the evicted sender terminates that
/// client's WebSocket sender task, which closes the connection.
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, RegisteredClient>>,
    next_id: AtomicU64,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a client and return its id
    pub async fn register(&self, peer: &str, sender: mpsc::Sender<Vec<u8>>) -> ClientId {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.clients.write().await.insert(
            id,
            RegisteredClient {
                sender,
                peer: peer.to_string(),
            },
        );
        debug!(client = %id, peer = peer, "registered client");
        id
    }

    /// Remove a client; idempotent, returns whether it was present
    pub async fn unregister(&self, id: ClientId) -> bool {
        self.clients.write().await.remove(&id).is_some()
    }

    /// Deliver the same payload to every registered client.
    ///
    /// Per-client failures never abort delivery to the rest and never surface
    /// to the caller; the failed client is evicted instead.
    pub async fn broadcast(&self, data: &[u8]) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        let mut dead: Vec<(ClientId, String, &'static str)> = Vec::new();

        {
            let clients = self.clients.read().await;
            for (id, client) in clients.iter() {
                match client.sender.try_send(data.to_vec()) {
                    Ok(()) => outcome.delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        dead.push((*id, client.peer.clone(), "outbound queue full"));
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        dead.push((*id, client.peer.clone(), "connection closed"));
                    }
                }
            }
        }

        if !dead.is_empty() {
            let mut clients = self.clients.write().await;
            for (id, peer, reason) in dead {
                if clients.remove(&id).is_some() {
                    outcome.evicted += 1;
                    warn!(client = %id, peer = %peer, reason, "evicting client");
                }
            }
        }

        outcome
    }

    /// Current number of registered clients
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}
