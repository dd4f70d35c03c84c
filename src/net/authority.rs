//! State and input authority
//!
//! Every networked entity has exactly one state authority holder (the only
//! participant allowed to write its authoritative pose) and at most one
//! input authority holder (the participant whose input drives it).
//! Authority is assigned once at spawn and never moves during a session.
//!
//! Writes to the tick store require a [`StateAuthority`] token, which can
//! only be obtained by asking an [`AuthorityView`] first.

use std::marker::PhantomData;

use hashbrown::HashMap;
use tracing::warn;

use crate::game::state::{EntityId, ParticipantId};

/// Authority queries resolved for the local participant
pub trait AuthorityView {
    /// Local participant may write this entity's authoritative state
    fn is_authority_holder(&self, entity: EntityId) -> bool;

    /// Local participant's input drives this entity
    fn has_input_authority(&self, entity: EntityId) -> bool;
}

/// Proof that the local participant holds state authority over one entity
///
/// Not `Clone`: a token is acquired per write and borrows the view it came
/// from, so it cannot outlive the authority check.
#[derive(Debug)]
pub struct StateAuthority<'a> {
    entity: EntityId,
    _view: PhantomData<&'a ()>,
}

impl<'a> StateAuthority<'a> {
    /// Returns a token only if `view` reports state authority over `entity`
    pub fn acquire<V: AuthorityView + ?Sized>(view: &'a V, entity: EntityId) -> Option<Self> {
        if view.is_authority_holder(entity) {
            Some(Self {
                entity,
                _view: PhantomData,
            })
        } else {
            None
        }
    }

    /// Entity this token grants writes to
    pub fn entity(&self) -> EntityId {
        self.entity
    }
}

/// Authority assignment for one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorityRecord {
    pub state: ParticipantId,
    pub input: Option<ParticipantId>,
}

/// Authority assignments for every entity a participant knows about
#[derive(Debug, Default)]
pub struct AuthorityTable {
    records: HashMap<EntityId, AuthorityRecord>,
}

impl AuthorityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record authority for a newly spawned entity
    ///
    /// Returns false (and keeps the existing record) if the entity already
    /// has an assignment.
    pub fn assign(
        &mut self,
        entity: EntityId,
        state: ParticipantId,
        input: Option<ParticipantId>,
    ) -> bool {
        if self.records.contains_key(&entity) {
            warn!("Ignoring authority reassignment for entity {}", entity);
            return false;
        }
        self.records.insert(entity, AuthorityRecord { state, input });
        true
    }

    /// Drop the assignment of a despawned entity
    pub fn revoke(&mut self, entity: EntityId) -> Option<AuthorityRecord> {
        self.records.remove(&entity)
    }

    pub fn record(&self, entity: EntityId) -> Option<AuthorityRecord> {
        self.records.get(&entity).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Entity whose input authority belongs to `participant`
    pub fn input_entity_of(&self, participant: ParticipantId) -> Option<EntityId> {
        self.records
            .iter()
            .find(|(_, r)| r.input == Some(participant))
            .map(|(id, _)| *id)
    }

    /// Authority queries as seen by `participant`
    pub fn view_for(&self, participant: ParticipantId) -> ParticipantAuthority<'_> {
        ParticipantAuthority {
            table: self,
            participant,
        }
    }
}

/// [`AuthorityTable`] resolved for one participant
#[derive(Debug, Clone, Copy)]
pub struct ParticipantAuthority<'a> {
    table: &'a AuthorityTable,
    participant: ParticipantId,
}

impl ParticipantAuthority<'_> {
    pub fn participant(&self) -> ParticipantId {
        self.participant
    }
}

impl AuthorityView for ParticipantAuthority<'_> {
    fn is_authority_holder(&self, entity: EntityId) -> bool {
        self.table
            .records
            .get(&entity)
            .is_some_and(|r| r.state == self.participant)
    }

    fn has_input_authority(&self, entity: EntityId) -> bool {
        self.table
            .records
            .get(&entity)
            .is_some_and(|r| r.input == Some(self.participant))
    }
}
