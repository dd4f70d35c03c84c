//! Participants and the entity lifecycle tied to them
//!
//! Handles who is in the session and which networked entities exist for them.

pub mod participant;
pub mod spawner;
