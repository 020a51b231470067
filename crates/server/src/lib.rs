//! Authoritative herding game server library.

pub mod config;
pub mod server;

// Re-export commonly used types
pub use config::Config;
pub use server::{run, serve, MatchSetup, PendingBroadcasts, Room, RoomDirectory, RoomError, RoomEvent};
