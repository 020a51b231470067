//! Named rooms and their loop tasks.

use sim::PlayerId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

use super::room::{run_room_loop, Room, RoomError, RoomEvent};
use crate::config::Config;

struct RoomHandle {
    room: Arc<RwLock<Room>>,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

/// A successful join: the room and a subscription to its broadcasts.
pub struct Joined {
    pub room: Arc<RwLock<Room>>,
    pub events: broadcast::Receiver<RoomEvent>,
}

/// Maps room names to running rooms. A room exists while it has players.
pub struct RoomDirectory {
    config: Arc<Config>,
    rooms: HashMap<String, RoomHandle>,
}

impl RoomDirectory {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            rooms: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    fn room_seed(&self) -> u64 {
        match self.config.round.seed {
            0 => rand::random(),
            seed => seed,
        }
    }

    /// Join `name`, creating the room and starting its loop if needed.
    pub async fn join(&mut self, name: &str, player: PlayerId, nick: &str, skin: u8) -> Result<Joined, RoomError> {
        if !self.rooms.contains_key(name) {
            let room = Arc::new(RwLock::new(Room::new(name, &self.config, self.room_seed())));
            let shutdown = Arc::new(Notify::new());
            let task = tokio::spawn(run_room_loop(Arc::clone(&room), Arc::clone(&shutdown)));
            info!(room = name, "room created");
            self.rooms.insert(name.to_string(), RoomHandle { room, shutdown, task });
        }

        let handle = &self.rooms[name];
        let joined = {
            let mut room = handle.room.write().await;
            room.add_player(player, nick, skin).map(|()| room.subscribe())
        };
        match joined {
            Ok(events) => Ok(Joined {
                room: Arc::clone(&handle.room),
                events,
            }),
            Err(e) => {
                self.drop_if_empty(name).await;
                Err(e)
            }
        }
    }

    /// Remove `player` from `name`; the room stops once nobody is left.
    pub async fn leave(&mut self, name: &str, player: PlayerId) {
        if let Some(handle) = self.rooms.get(name) {
            handle.room.write().await.remove_player(player);
        }
        self.drop_if_empty(name).await;
    }

    async fn drop_if_empty(&mut self, name: &str) {
        let empty = match self.rooms.get(name) {
            Some(handle) => handle.room.read().await.is_empty(),
            None => return,
        };
        if !empty {
            return;
        }
        if let Some(handle) = self.rooms.remove(name) {
            // Detached: the loop exits at its next wakeup.
            handle.shutdown.notify_one();
            info!(room = name, "room closed");
        }
    }

    /// Stop every room loop and wait for them to finish.
    pub async fn shutdown(&mut self) {
        for (name, handle) in self.rooms.drain() {
            handle.shutdown.notify_one();
            let _ = handle.task.await;
            info!(room = %name, "room closed");
        }
    }
}
