//! Authoritative tick store
//!
//! Latest authoritative pose per entity. The authority holder rewrites every
//! entity it owns once per fixed tick; observers fill their copy from
//! replicated snapshots.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::game::state::{EntityId, Pose};
use crate::net::authority::StateAuthority;

/// Pose of one entity as written on one simulation tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    entity: EntityId,
    tick: u64,
    pose: Pose,
}

impl Snapshot {
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }
}

/// Per-entity authoritative snapshots held by one participant
#[derive(Debug, Default)]
pub struct AuthoritativeTickStore {
    snapshots: HashMap<EntityId, Snapshot>,
}

impl AuthoritativeTickStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the pose of the entity `authority` was acquired for
    ///
    /// Unconditional: the snapshot is replaced even if the pose is unchanged.
    pub fn write(&mut self, authority: StateAuthority<'_>, tick: u64, pose: Pose) -> Snapshot {
        let snapshot = Snapshot {
            entity: authority.entity(),
            tick,
            pose,
        };
        self.snapshots.insert(snapshot.entity, snapshot);
        snapshot
    }

    /// Store a snapshot received from the authority holder
    ///
    /// Returns false if a newer snapshot for the entity is already held.
    pub fn apply_replicated(&mut self, snapshot: Snapshot) -> bool {
        match self.snapshots.get(&snapshot.entity) {
            Some(held) if held.tick > snapshot.tick => false,
            _ => {
                self.snapshots.insert(snapshot.entity, snapshot);
                true
            }
        }
    }

    pub fn latest(&self, entity: EntityId) -> Option<Snapshot> {
        self.snapshots.get(&entity).copied()
    }

    pub fn pose(&self, entity: EntityId) -> Option<Pose> {
        self.snapshots.get(&entity).map(|s| s.pose)
    }

    pub fn remove(&mut self, entity: EntityId) -> Option<Snapshot> {
        self.snapshots.remove(&entity)
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.values()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::authority::AuthorityView;
    use crate::util::quat::Quat;
    use crate::util::vec3::Vec3;

    struct Holder;

    impl AuthorityView for Holder {
        fn is_authority_holder(&self, _entity: EntityId) -> bool {
            true
        }

        fn has_input_authority(&self, _entity: EntityId) -> bool {
            false
        }
    }

    fn write(store: &mut AuthoritativeTickStore, entity: EntityId, tick: u64, pose: Pose) -> Snapshot {
        let view = Holder;
        let authority = StateAuthority::acquire(&view, entity).unwrap();
        store.write(authority, tick, pose)
    }

    #[test]
    fn test_read_after_tick_matches_write() {
        let mut store = AuthoritativeTickStore::new();

        for tick in 0..50u64 {
            let pose = Pose::new(
                Vec3::new(tick as f32, 0.0, -(tick as f32)),
                Quat::from_axis_angle(Vec3::UP, tick as f32 * 0.1),
            );
            write(&mut store, 1, tick, pose);

            let read = store.latest(1).unwrap();
            assert_eq!(read.tick(), tick);
            assert_eq!(read.pose(), pose);
        }
    }

    #[test]
    fn test_unchanged_pose_is_rewritten() {
        let mut store = AuthoritativeTickStore::new();
        let pose = Pose::at(Vec3::new(1.0, 0.0, 0.0));

        write(&mut store, 1, 1, pose);
        write(&mut store, 1, 2, pose);

        assert_eq!(store.latest(1).map(|s| s.tick()), Some(2));
    }

    #[test]
    fn test_apply_replicated_ignores_stale() {
        let mut store = AuthoritativeTickStore::new();
        let newer = write(&mut AuthoritativeTickStore::new(), 5, 10, Pose::at(Vec3::ONE));
        let older = write(&mut AuthoritativeTickStore::new(), 5, 9, Pose::at(Vec3::ZERO));

        assert!(store.apply_replicated(newer));
        assert!(!store.apply_replicated(older));
        assert_eq!(store.pose(5), Some(Pose::at(Vec3::ONE)));
    }

    #[test]
    fn test_remove() {
        let mut store = AuthoritativeTickStore::new();
        write(&mut store, 3, 0, Pose::default());
        assert_eq!(store.len(), 1);
        assert!(store.remove(3).is_some());
        assert!(store.latest(3).is_none());
        assert!(store.is_empty());
    }
}
