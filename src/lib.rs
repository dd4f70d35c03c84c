//! Netball core library
//!
//! Networked ball game core: a host holds authoritative state for player
//! bodies and a shared ball, and every client smooths the body it drives
//! from snapshots arriving at the fixed tick rate.

pub mod config;
pub mod game;
pub mod lobby;
pub mod metrics;
pub mod net;
pub mod util;
