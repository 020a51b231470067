//! Client session state.

use sim::PlayerId;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::room::Room;

/// Longest nickname kept, in characters.
pub const MAX_NAME_CHARS: usize = 24;

/// The room a session is playing in.
pub struct Membership {
    pub name: String,
    pub room: Arc<RwLock<Room>>,
}

/// A connected client session.
pub struct Client {
    /// Unique player ID, stable for the life of the connection.
    pub id: PlayerId,
    /// Remote address.
    pub addr: SocketAddr,
    /// Player name.
    pub name: String,
    /// Dog skin.
    pub skin: u8,
    /// Set once the client has joined a room.
    pub membership: Option<Membership>,
    /// Last activity timestamp.
    pub last_activity: Instant,
}

impl Client {
    /// Create a new client session.
    pub fn new(id: PlayerId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            name: String::new(),
            skin: 0,
            membership: None,
            last_activity: Instant::now(),
        }
    }

    /// Update activity timestamp.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// When the session counts as idle.
    pub fn idle_deadline(&self, timeout: Duration) -> Instant {
        self.last_activity + timeout
    }

    pub fn room(&self) -> Option<&Arc<RwLock<Room>>> {
        self.membership.as_ref().map(|m| &m.room)
    }
}

/// Trim a nickname and fall back to a generated one when empty.
pub fn clean_name(raw: &str, id: PlayerId) -> String {
    let name: String = raw
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_CHARS)
        .collect::<String>()
        .trim()
        .to_string();
    if name.is_empty() {
        format!("Dog {id}")
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("  Rex\u{7}  ", 1), "Rex");
        assert_eq!(clean_name("", 7), "Dog 7");
        assert_eq!(clean_name(&"x".repeat(100), 1).len(), MAX_NAME_CHARS);
    }
}
