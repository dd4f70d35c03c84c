//! Entity lifecycle coordination on the host
//!
//! Spawns one body per joining participant and a single shared ball, and
//! despawns a participant's body when they leave. Does nothing unless the
//! transport reports that this participant runs the session.

use hashbrown::HashMap;
use tracing::{debug, info, warn};

use crate::game::constants::{ball, spawn};
use crate::game::state::{ParticipantId, PrefabKind};
use crate::lobby::participant::Participant;
use crate::net::transport::{EntityHandle, Transport};
use crate::util::quat::Quat;
use crate::util::vec3::Vec3;

/// Where spawn slots sit in the world
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPlacement {
    pub spacing: f32,
    pub max_slots: usize,
}

impl SpawnPlacement {
    pub fn new(spacing: f32, max_slots: usize) -> Self {
        Self { spacing, max_slots }
    }

    /// Position of `slot` along +X, `None` past the last slot
    pub fn position(&self, slot: usize) -> Option<Vec3> {
        (slot < self.max_slots).then(|| Vec3::new(slot as f32 * self.spacing, 0.0, 0.0))
    }
}

impl Default for SpawnPlacement {
    fn default() -> Self {
        Self::new(spawn::SPACING, spawn::MAX_PARTICIPANTS)
    }
}

/// Participant to body mapping plus the shared ball
#[derive(Debug)]
pub struct EntityLifecycle {
    placement: SpawnPlacement,
    bodies: HashMap<ParticipantId, (EntityHandle, usize)>,
    ball: Option<EntityHandle>,
}

impl EntityLifecycle {
    pub fn new(placement: SpawnPlacement) -> Self {
        Self {
            placement,
            bodies: HashMap::new(),
            ball: None,
        }
    }

    /// Spawn a body for `participant` and make sure the ball exists
    ///
    /// Idempotent per participant. Returns `None` on a non-host transport or
    /// when every slot is taken.
    pub fn on_participant_joined<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        participant: &Participant,
    ) -> Option<EntityHandle> {
        if !transport.is_server() {
            return None;
        }

        if let Some((handle, _)) = self.bodies.get(&participant.id) {
            debug!("Participant {} already has body {}", participant.id, handle.id);
            return Some(*handle);
        }

        let Some(slot) = self.free_slot() else {
            warn!(
                "No free spawn slot for participant {} ({} slots in use)",
                participant.id,
                self.bodies.len()
            );
            return None;
        };
        let position = self.placement.position(slot)?;

        let handle = transport.spawn(
            PrefabKind::PlayerBody,
            position,
            Quat::IDENTITY,
            Some(participant.id),
        );
        self.bodies.insert(participant.id, (handle, slot));
        info!("Participant {} joined in slot {} with body {}", participant.id, slot, handle.id);

        self.ensure_ball(transport);
        Some(handle)
    }

    /// Spawn the ball if it does not exist yet
    pub fn ensure_ball<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Option<EntityHandle> {
        if !transport.is_server() {
            return None;
        }
        if let Some(handle) = self.ball {
            return Some(handle);
        }

        let handle = transport.spawn(PrefabKind::Ball, ball::SPAWN_POSITION, Quat::IDENTITY, None);
        self.ball = Some(handle);
        info!("Ball {} created", handle.id);
        Some(handle)
    }

    /// Despawn the body of a leaving participant and free its slot
    pub fn on_participant_left<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        participant: ParticipantId,
    ) -> Option<EntityHandle> {
        if !transport.is_server() {
            return None;
        }

        let (handle, slot) = self.bodies.remove(&participant)?;
        transport.despawn(handle);
        info!("Participant {} left, freed slot {}", participant, slot);
        Some(handle)
    }

    pub fn body_of(&self, participant: ParticipantId) -> Option<EntityHandle> {
        self.bodies.get(&participant).map(|(handle, _)| *handle)
    }

    pub fn slot_of(&self, participant: ParticipantId) -> Option<usize> {
        self.bodies.get(&participant).map(|(_, slot)| *slot)
    }

    pub fn ball(&self) -> Option<EntityHandle> {
        self.ball
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn free_slot(&self) -> Option<usize> {
        (0..self.placement.max_slots).find(|slot| !self.bodies.values().any(|(_, s)| s == slot))
    }
}

impl Default for EntityLifecycle {
    fn default() -> Self {
        Self::new(SpawnPlacement::default())
    }
}
