//! Replication messages sent from the host to clients

use serde::{Deserialize, Serialize};

use crate::game::state::{EntityId, ParticipantId, Pose, PrefabKind};
use crate::net::tick_store::Snapshot;

/// Messages from host to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplicationMessage {
    /// An entity was created on the host
    Spawned {
        entity: EntityId,
        kind: PrefabKind,
        pose: Pose,
        state_authority: ParticipantId,
        input_authority: Option<ParticipantId>,
    },
    /// An entity was destroyed on the host
    Despawned { entity: EntityId },
    /// Authoritative pose of one entity for one tick
    Snapshot(Snapshot),
}

impl ReplicationMessage {
    /// Entity the message refers to
    pub fn entity(&self) -> EntityId {
        match self {
            ReplicationMessage::Spawned { entity, .. } => *entity,
            ReplicationMessage::Despawned { entity } => *entity,
            ReplicationMessage::Snapshot(snapshot) => snapshot.entity(),
        }
    }

    /// Spawns and despawns; these must reach every client
    pub fn is_lifecycle(&self) -> bool {
        !matches!(self, ReplicationMessage::Snapshot(_))
    }
}

/// Encode a message using bincode
/// Uses legacy config for fixed-size integers
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::quat::Quat;
    use crate::util::vec3::Vec3;
    use uuid::Uuid;

    #[test]
    fn test_spawned_roundtrip() {
        let message = ReplicationMessage::Spawned {
            entity: 4,
            kind: PrefabKind::PlayerBody,
            pose: Pose::new(Vec3::new(3.0, 0.0, 0.0), Quat::from_axis_angle(Vec3::UP, 1.0)),
            state_authority: Uuid::new_v4(),
            input_authority: Some(Uuid::new_v4()),
        };

        let encoded = encode(&message).unwrap();
        let decoded: ReplicationMessage = decode(&encoded).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.entity(), 4);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result: Result<ReplicationMessage, _> = decode(&[0xFF, 0xFF, 0xFF]);
        assert!(result.is_err());
    }

    #[test]
    fn test_truncated_message_fails() {
        let encoded = encode(&ReplicationMessage::Despawned { entity: 77 }).unwrap();
        let result: Result<ReplicationMessage, _> = decode(&encoded[..encoded.len() - 1]);
        assert!(result.is_err());
    }
}
