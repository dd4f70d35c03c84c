//! Host to client replication over in-process channels
//!
//! Each connected client owns two receivers. Spawns and despawns travel on
//! an unbounded channel and are never dropped. Per-tick snapshots travel on
//! a bounded channel; when it is full the snapshot is lost for that client
//! only, and the next tick's snapshot supersedes it anyway.
//!
//! The host encodes every message once and pushes the same bytes to every
//! client.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::game::constants::net::REPLICATION_CHANNEL_SIZE;
use crate::game::state::ParticipantId;
use crate::metrics::Metrics;
use crate::net::protocol::{decode, encode, ReplicationMessage};

/// Result of queuing one message for one client
enum Delivery {
    Sent,
    Dropped,
    Closed,
}

/// Sending half of one client's channels
struct ClientChannels {
    lifecycle: Sender<Vec<u8>>,
    snapshots: Sender<Vec<u8>>,
}

impl ClientChannels {
    fn send(&self, message: &ReplicationMessage, bytes: Vec<u8>) -> Delivery {
        let result = if message.is_lifecycle() {
            self.lifecycle.try_send(bytes)
        } else {
            self.snapshots.try_send(bytes)
        };

        match result {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Disconnected(_)) => Delivery::Closed,
        }
    }
}

/// Host side: one channel pair per connected client
pub struct ReplicationHub {
    clients: HashMap<ParticipantId, ClientChannels>,
    capacity: usize,
    metrics: Arc<Metrics>,
}

impl ReplicationHub {
    pub fn new() -> Self {
        Self::with_metrics(Arc::new(Metrics::new()))
    }

    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self {
            clients: HashMap::new(),
            capacity: REPLICATION_CHANNEL_SIZE,
            metrics,
        }
    }

    /// Override the per-client snapshot channel capacity (applies to later connects)
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Open channels to `participant`, replacing any previous ones
    pub fn connect(&mut self, participant: ParticipantId) -> ReplicationLink {
        let (lifecycle_tx, lifecycle_rx) = unbounded();
        let (snapshot_tx, snapshot_rx) = bounded(self.capacity);
        let channels = ClientChannels {
            lifecycle: lifecycle_tx,
            snapshots: snapshot_tx,
        };
        if self.clients.insert(participant, channels).is_some() {
            debug!("Replacing replication channels for {}", participant);
        }
        ReplicationLink {
            participant,
            lifecycle: lifecycle_rx,
            snapshots: snapshot_rx,
            metrics: self.metrics.clone(),
        }
    }

    pub fn disconnect(&mut self, participant: ParticipantId) -> bool {
        self.clients.remove(&participant).is_some()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Send `message` to every client; returns how many accepted it
    ///
    /// Clients whose receiver is gone are dropped. A full snapshot channel
    /// loses the message for that client only.
    pub fn broadcast(&mut self, message: &ReplicationMessage) -> usize {
        let bytes = match encode(message) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode replication message for entity {}: {}", message.entity(), e);
                return 0;
            }
        };

        let mut sent = 0;
        let mut closed = Vec::new();
        for (participant, channels) in &self.clients {
            match channels.send(message, bytes.clone()) {
                Delivery::Sent => {
                    sent += 1;
                    Metrics::add(&self.metrics.bytes_sent, bytes.len() as u64);
                }
                Delivery::Dropped => {
                    Metrics::add(&self.metrics.messages_dropped, 1);
                    debug!("Snapshot channel to {} is full, dropping snapshot", participant);
                }
                Delivery::Closed => closed.push(*participant),
            }
        }

        for participant in closed {
            warn!("Replication channel to {} closed, removing client", participant);
            self.clients.remove(&participant);
        }

        self.metrics.messages_sent.fetch_add(sent as u64, Ordering::Relaxed);
        sent
    }

    /// Send `message` to a single client
    pub fn send_to(&mut self, participant: ParticipantId, message: &ReplicationMessage) -> bool {
        let Some(channels) = self.clients.get(&participant) else {
            return false;
        };

        let bytes = match encode(message) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode replication message for {}: {}", participant, e);
                return false;
            }
        };
        let len = bytes.len() as u64;

        match channels.send(message, bytes) {
            Delivery::Sent => {
                Metrics::add(&self.metrics.messages_sent, 1);
                Metrics::add(&self.metrics.bytes_sent, len);
                true
            }
            Delivery::Dropped => {
                Metrics::add(&self.metrics.messages_dropped, 1);
                debug!("Snapshot channel to {} is full, dropping snapshot", participant);
                false
            }
            Delivery::Closed => {
                warn!("Replication channel to {} closed, removing client", participant);
                self.clients.remove(&participant);
                false
            }
        }
    }
}

impl Default for ReplicationHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Client side of a replication channel pair
pub struct ReplicationLink {
    participant: ParticipantId,
    lifecycle: Receiver<Vec<u8>>,
    snapshots: Receiver<Vec<u8>>,
    metrics: Arc<Metrics>,
}

impl ReplicationLink {
    pub fn participant(&self) -> ParticipantId {
        self.participant
    }

    pub fn pending_count(&self) -> usize {
        self.lifecycle.len() + self.snapshots.len()
    }

    /// Decode everything received since the last drain
    ///
    /// Spawns and despawns come first, in send order, followed by snapshots
    /// in send order. Entity ids are never reused, so a snapshot can only
    /// refer to an entity whose spawn is already in this or an earlier drain.
    pub fn drain(&self) -> Vec<ReplicationMessage> {
        let mut messages = Vec::with_capacity(self.pending_count());
        for bytes in self.lifecycle.try_iter().chain(self.snapshots.try_iter()) {
            match decode::<ReplicationMessage>(&bytes) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    Metrics::add(&self.metrics.decode_errors, 1);
                    warn!("Skipping undecodable replication message ({} bytes): {}", bytes.len(), e);
                }
            }
        }
        Metrics::add(&self.metrics.messages_received, messages.len() as u64);
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{EntityId, Pose};
    use crate::net::authority::{AuthorityTable, StateAuthority};
    use crate::net::tick_store::AuthoritativeTickStore;
    use uuid::Uuid;

    fn snapshot(entity: EntityId, tick: u64) -> ReplicationMessage {
        let host = Uuid::new_v4();
        let mut table = AuthorityTable::new();
        table.assign(entity, host, None);
        let view = table.view_for(host);
        let authority = StateAuthority::acquire(&view, entity).unwrap();
        let mut store = AuthoritativeTickStore::new();
        ReplicationMessage::Snapshot(store.write(authority, tick, Pose::default()))
    }

    #[test]
    fn test_broadcast_reaches_every_client() {
        let mut hub = ReplicationHub::new();
        let a = hub.connect(Uuid::new_v4());
        let b = hub.connect(Uuid::new_v4());

        let sent = hub.broadcast(&ReplicationMessage::Despawned { entity: 3 });
        assert_eq!(sent, 2);
        assert_eq!(a.drain(), vec![ReplicationMessage::Despawned { entity: 3 }]);
        assert_eq!(b.drain(), vec![ReplicationMessage::Despawned { entity: 3 }]);
        assert!(a.drain().is_empty());
    }

    #[test]
    fn test_closed_client_is_removed() {
        let mut hub = ReplicationHub::new();
        let kept = hub.connect(Uuid::new_v4());
        let gone = hub.connect(Uuid::new_v4());
        drop(gone);

        assert_eq!(hub.broadcast(&ReplicationMessage::Despawned { entity: 1 }), 1);
        assert_eq!(hub.client_count(), 1);
        assert_eq!(kept.drain().len(), 1);
    }

    #[test]
    fn test_full_channel_drops_snapshot() {
        let metrics = Arc::new(Metrics::new());
        let mut hub = ReplicationHub::with_metrics(metrics.clone()).with_capacity(1);
        let link = hub.connect(Uuid::new_v4());

        assert_eq!(hub.broadcast(&snapshot(1, 1)), 1);
        assert_eq!(hub.broadcast(&snapshot(1, 2)), 0);
        assert_eq!(metrics.messages_dropped.load(Ordering::Relaxed), 1);
        assert_eq!(hub.client_count(), 1);
        assert_eq!(link.drain(), vec![snapshot(1, 1)]);
    }

    #[test]
    fn test_lifecycle_survives_full_snapshot_channel() {
        let mut hub = ReplicationHub::new().with_capacity(2);
        let link = hub.connect(Uuid::new_v4());

        for tick in 0..5 {
            hub.broadcast(&snapshot(1, tick));
        }
        assert_eq!(hub.broadcast(&ReplicationMessage::Despawned { entity: 1 }), 1);
        assert_eq!(hub.broadcast(&ReplicationMessage::Despawned { entity: 2 }), 1);

        let messages = link.drain();
        // Lifecycle messages drain ahead of the snapshots that made it
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], ReplicationMessage::Despawned { entity: 1 });
        assert_eq!(messages[1], ReplicationMessage::Despawned { entity: 2 });
        assert!(messages[2..].iter().all(|m| !m.is_lifecycle()));
    }

    #[test]
    fn test_send_to_single_client() {
        let mut hub = ReplicationHub::new();
        let target = Uuid::new_v4();
        let a = hub.connect(target);
        let b = hub.connect(Uuid::new_v4());

        assert!(hub.send_to(target, &ReplicationMessage::Despawned { entity: 9 }));
        assert!(!hub.send_to(Uuid::new_v4(), &ReplicationMessage::Despawned { entity: 9 }));
        assert_eq!(a.drain().len(), 1);
        assert!(b.drain().is_empty());
    }

    #[test]
    fn test_undecodable_bytes_are_skipped() {
        let metrics = Arc::new(Metrics::new());
        let mut hub = ReplicationHub::with_metrics(metrics.clone());
        let participant = Uuid::new_v4();
        let link = hub.connect(participant);

        // Bypass the encoder to simulate a corrupt frame
        hub.clients[&participant].snapshots.try_send(vec![0xFF]).unwrap();
        hub.broadcast(&ReplicationMessage::Despawned { entity: 5 });

        let messages = link.drain();
        assert_eq!(messages, vec![ReplicationMessage::Despawned { entity: 5 }]);
        assert_eq!(metrics.decode_errors.load(Ordering::Relaxed), 1);
    }
}
