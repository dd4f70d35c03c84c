//! Simulated world state
//!
//! Holds the networked entities (player bodies and the ball) with the
//! physical values the host integrates each tick. Observers keep the same
//! structure as a replica filled from replication messages.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::constants::{ball, body};
use crate::util::quat::Quat;
use crate::util::vec3::Vec3;

/// Unique participant identifier
pub type ParticipantId = Uuid;

/// Networked entity identifier
pub type EntityId = u64;

/// Position and orientation of a body
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Pose at `position` with identity rotation
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }
}

/// What kind of networked object to create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrefabKind {
    PlayerBody,
    Ball,
}

impl PrefabKind {
    /// Collision radius
    pub fn radius(&self) -> f32 {
        match self {
            PrefabKind::PlayerBody => body::RADIUS,
            PrefabKind::Ball => ball::RADIUS,
        }
    }
}

/// Any simulated object replicated across participants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkedEntity {
    pub id: EntityId,
    pub kind: PrefabKind,
    pub pose: Pose,
    pub velocity: Vec3,
    /// Participant driving this entity with its input, if any
    pub owner: Option<ParticipantId>,
}

impl NetworkedEntity {
    pub fn new(id: EntityId, kind: PrefabKind, pose: Pose, owner: Option<ParticipantId>) -> Self {
        Self {
            id,
            kind,
            pose,
            velocity: Vec3::ZERO,
            owner,
        }
    }

    pub fn radius(&self) -> f32 {
        self.kind.radius()
    }

    pub fn is_ball(&self) -> bool {
        self.kind == PrefabKind::Ball
    }
}

/// All entities known to one participant
#[derive(Debug)]
pub struct World {
    entities: HashMap<EntityId, NetworkedEntity>,
    next_id: EntityId,
}

impl World {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            next_id: 1,
        }
    }

    /// Create a new entity with a fresh id
    pub fn spawn(&mut self, kind: PrefabKind, pose: Pose, owner: Option<ParticipantId>) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        self.entities
            .insert(id, NetworkedEntity::new(id, kind, pose, owner));
        id
    }

    /// Insert an entity created elsewhere (replicated spawn)
    pub fn insert(&mut self, entity: NetworkedEntity) {
        self.next_id = self.next_id.max(entity.id + 1);
        self.entities.insert(entity.id, entity);
    }

    pub fn despawn(&mut self, id: EntityId) -> Option<NetworkedEntity> {
        self.entities.remove(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&NetworkedEntity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut NetworkedEntity> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkedEntity> {
        self.entities.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut NetworkedEntity> {
        self.entities.values_mut()
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The ball, if one exists
    pub fn ball(&self) -> Option<&NetworkedEntity> {
        self.entities.values().find(|e| e.is_ball())
    }

    /// Body driven by `participant`
    pub fn body_of(&self, participant: ParticipantId) -> Option<&NetworkedEntity> {
        self.entities
            .values()
            .find(|e| e.kind == PrefabKind::PlayerBody && e.owner == Some(participant))
    }

    pub fn count_kind(&self, kind: PrefabKind) -> usize {
        self.entities.values().filter(|e| e.kind == kind).count()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_assigns_unique_ids() {
        let mut world = World::new();
        let a = world.spawn(PrefabKind::PlayerBody, Pose::default(), None);
        let b = world.spawn(PrefabKind::Ball, Pose::default(), None);
        assert_ne!(a, b);
        assert_eq!(world.len(), 2);
    }

    #[test]
    fn test_insert_advances_next_id() {
        let mut world = World::new();
        world.insert(NetworkedEntity::new(10, PrefabKind::Ball, Pose::default(), None));
        let id = world.spawn(PrefabKind::PlayerBody, Pose::default(), None);
        assert_eq!(id, 11);
    }

    #[test]
    fn test_ball_and_body_lookup() {
        let mut world = World::new();
        let owner = Uuid::new_v4();
        let body = world.spawn(PrefabKind::PlayerBody, Pose::default(), Some(owner));
        let ball = world.spawn(PrefabKind::Ball, Pose::default(), None);

        assert_eq!(world.ball().map(|e| e.id), Some(ball));
        assert_eq!(world.body_of(owner).map(|e| e.id), Some(body));
        assert!(world.body_of(Uuid::new_v4()).is_none());
        assert_eq!(world.count_kind(PrefabKind::PlayerBody), 1);
    }

    #[test]
    fn test_despawn() {
        let mut world = World::new();
        let id = world.spawn(PrefabKind::Ball, Pose::default(), None);
        assert!(world.despawn(id).is_some());
        assert!(world.despawn(id).is_none());
        assert!(world.is_empty());
    }

    #[test]
    fn test_prefab_radius() {
        assert!(PrefabKind::PlayerBody.radius() > PrefabKind::Ball.radius());
    }
}
