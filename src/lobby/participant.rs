use uuid::Uuid;

use crate::game::state::ParticipantId;

/// Whether the participant runs the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Client,
}

/// A connected peer in the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    pub role: Role,
}

impl Participant {
    pub fn new(id: ParticipantId, role: Role) -> Self {
        Self { id, role }
    }

    /// New host with a fresh id
    pub fn host() -> Self {
        Self::new(Uuid::new_v4(), Role::Host)
    }

    /// New client with a fresh id
    pub fn client() -> Self {
        Self::new(Uuid::new_v4(), Role::Client)
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }
}
