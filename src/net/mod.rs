pub mod authority;
pub mod change_detector;
pub mod game_session;
pub mod protocol;
pub mod replication;
pub mod tick_store;
pub mod transport;
