//! One match: the authoritative world plus everything the tick loop needs
//! around it.

use futures_util::FutureExt;
use glam::Vec2;
use protocol::{CompletionEvent, InputPacket, MatchStarted, Snapshot};
use sim::{check_game_completion, DogInput, PlayerId, World};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Notify, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::Config;

/// Directions longer than this are rejected rather than normalized.
const MAX_DIRECTION_LENGTH: f32 = 1.5;

/// Seconds between periodic room metrics at debug level.
const METRICS_INTERVAL_SECS: u64 = 10;

/// Broadcast to every connection in a room.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    Snapshot(Arc<Snapshot>),
    Completion(CompletionEvent),
    MatchStarted(MatchStarted),
}

/// What one tick produced, sent after the write lock is released.
#[derive(Debug, Default)]
pub struct PendingBroadcasts {
    pub snapshot: Option<Snapshot>,
    pub completion: Option<CompletionEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("room is full ({0} players)")]
    Full(usize),

    #[error("player {0} already joined")]
    AlreadyJoined(PlayerId),
}

/// Players and their dog skins, in spawn order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSetup {
    pub players: Vec<(PlayerId, u8)>,
    pub sheep_count: usize,
}

#[derive(Debug)]
struct PlayerSlot {
    name: String,
    skin: u8,
    joined_at: u64,
    inputs: VecDeque<InputPacket>,
}

/// Loop parameters derived from the config once.
#[derive(Debug, Clone, Copy)]
pub struct RoomSettings {
    pub tick_rate_hz: u32,
    pub tick_interval: Duration,
    pub tick_dt: f32,
    pub snapshot_every: u64,
    pub max_players: usize,
    pub input_queue_limit: usize,
    pub sheep_count: usize,
}

impl RoomSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tick_rate_hz: config.server.tick_rate(),
            tick_interval: config.server.tick_interval(),
            tick_dt: config.server.tick_dt(),
            snapshot_every: config.server.snapshot_every(),
            max_players: config.server.max_players_per_room.max(1),
            input_queue_limit: config.server.input_queue_limit.max(1),
            sheep_count: config.round.sheep_count,
        }
    }
}

pub struct Room {
    pub name: String,
    pub world: World,
    pub settings: RoomSettings,
    players: BTreeMap<PlayerId, PlayerSlot>,
    join_counter: u64,
    events_tx: broadcast::Sender<RoomEvent>,
    /// Exponential moving average of tick duration in ms.
    pub update_time_avg: f64,
}

/// Validate a client direction: non-finite or oversized vectors are
/// rejected, slightly long ones are normalized.
pub fn sanitize_direction(direction: Vec2) -> Option<Vec2> {
    if !direction.is_finite() {
        return None;
    }
    let length = direction.length();
    if length > MAX_DIRECTION_LENGTH {
        None
    } else if length > 1.0 {
        Some(direction / length)
    } else {
        Some(direction)
    }
}

impl Room {
    pub fn new(name: impl Into<String>, config: &Config, seed: u64) -> Self {
        let (events_tx, _) = broadcast::channel(16);
        Self {
            name: name.into(),
            world: World::new(&config.field, config.sheep.clone(), config.dog.clone(), seed),
            settings: RoomSettings::from_config(config),
            players: BTreeMap::new(),
            join_counter: 0,
            events_tx,
            update_time_avg: 0.0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events_tx.subscribe()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn has_player(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    /// Add a player and their dog. Works mid-match; the dog spawns at the
    /// next free slot.
    pub fn add_player(&mut self, id: PlayerId, name: impl Into<String>, skin: u8) -> Result<(), RoomError> {
        if self.players.contains_key(&id) {
            return Err(RoomError::AlreadyJoined(id));
        }
        if self.players.len() >= self.settings.max_players {
            return Err(RoomError::Full(self.settings.max_players));
        }
        let name = name.into();
        info!(room = %self.name, player = id, %name, "player joined");

        self.join_counter += 1;
        self.players.insert(
            id,
            PlayerSlot {
                name,
                skin,
                joined_at: self.join_counter,
                inputs: VecDeque::new(),
            },
        );
        self.world.add_dog(id, skin);
        Ok(())
    }

    /// Remove a player and their dog without pausing the match.
    pub fn remove_player(&mut self, id: PlayerId) -> bool {
        let Some(slot) = self.players.remove(&id) else {
            return false;
        };
        self.world.remove_dog(id);
        info!(room = %self.name, player = id, name = %slot.name, "player left");
        true
    }

    /// Queue an input for the next tick. The oldest queued input is dropped
    /// once the queue is full.
    pub fn enqueue_input(&mut self, id: PlayerId, input: InputPacket) -> bool {
        let limit = self.settings.input_queue_limit;
        let Some(slot) = self.players.get_mut(&id) else {
            return false;
        };
        if slot.inputs.len() >= limit {
            slot.inputs.pop_front();
            debug!(room = %self.name, player = id, "input queue full, dropped oldest");
        }
        slot.inputs.push_back(input);
        true
    }

    /// Current players in join order.
    pub fn match_setup(&self) -> MatchSetup {
        let mut players: Vec<_> = self
            .players
            .iter()
            .map(|(&id, slot)| (slot.joined_at, id, slot.skin))
            .collect();
        players.sort_unstable();
        MatchSetup {
            players: players.into_iter().map(|(_, id, skin)| (id, skin)).collect(),
            sheep_count: self.settings.sheep_count,
        }
    }

    /// Begin a fresh round with the given players and flock size, and
    /// announce it.
    pub fn start_match(&mut self, setup: &MatchSetup) -> MatchStarted {
        let state = &mut self.world.state;
        let keep: Vec<PlayerId> = setup.players.iter().map(|&(id, _)| id).collect();
        state.dogs.retain(|id, _| keep.contains(id));
        for &(id, skin) in &setup.players {
            if let Some(dog) = state.dogs.get_mut(&id) {
                dog.skin = skin;
            }
        }
        for &(id, skin) in &setup.players {
            self.world.add_dog(id, skin);
        }
        self.world.start_round(setup.sheep_count);
        for slot in self.players.values_mut() {
            slot.inputs.clear();
        }

        info!(
            room = %self.name,
            players = setup.players.len(),
            sheep = setup.sheep_count,
            "match started"
        );
        let started = MatchStarted {
            total_sheep: setup.sheep_count as u32,
            players: setup.players.clone(),
        };
        let _ = self.events_tx.send(RoomEvent::MatchStarted(started.clone()));
        started
    }

    /// Start again with whoever is in the room now.
    pub fn restart(&mut self) -> MatchStarted {
        let setup = self.match_setup();
        self.start_match(&setup)
    }

    /// Match clock in ms, derived from the tick count.
    pub fn match_time_ms(&self) -> u64 {
        self.world.state.tick * 1000 / self.settings.tick_rate_hz as u64
    }

    /// Apply at most one queued input per player, oldest first, skipping
    /// stale and malformed ones.
    fn apply_inputs(&mut self) {
        let tuning = &self.world.dog_tuning;
        let state = &mut self.world.state;
        let bounds = state.bounds.inset(state.hard_margin);

        for (&id, slot) in self.players.iter_mut() {
            let Some(dog) = state.dogs.get_mut(&id) else {
                slot.inputs.clear();
                continue;
            };
            while let Some(input) = slot.inputs.pop_front() {
                if input.sequence <= dog.input_sequence {
                    debug!(player = id, sequence = input.sequence, last = dog.input_sequence, "stale input dropped");
                    continue;
                }
                let Some(direction) = sanitize_direction(input.direction) else {
                    debug!(player = id, sequence = input.sequence, "malformed input dropped");
                    continue;
                };
                let intent = DogInput {
                    direction,
                    sprint: input.sprint,
                };
                if !dog.apply_input(intent, input.sequence, tuning) {
                    continue;
                }

                if let (true, Some(rest)) = (direction == Vec2::ZERO, input.client_position) {
                    if rest.is_finite() && rest.distance(dog.body.position) <= tuning.max_client_correction {
                        dog.converge_to(bounds.clamp(rest), tuning.client_converge_ticks);
                    } else {
                        debug!(player = id, "client rest position too far off, ignored");
                    }
                }
                break;
            }
        }
    }

    /// One fixed step of the whole room.
    ///
    /// Once the match has completed the world is frozen: queued inputs are
    /// discarded and nothing moves, but the tick count still advances so
    /// snapshots keep flowing until a restart.
    pub fn tick(&mut self) -> PendingBroadcasts {
        if self.world.state.game_completed {
            for slot in self.players.values_mut() {
                slot.inputs.clear();
            }
            self.world.state.tick += 1;
            return self.frozen_broadcasts();
        }

        self.apply_inputs();

        let report = self.world.step(self.settings.tick_dt);
        if !report.newly_retired.is_empty() {
            debug!(
                room = %self.name,
                sheep = ?report.newly_retired,
                retired = self.world.state.sheep_retired,
                "sheep through the gate"
            );
        }

        let mut pending = PendingBroadcasts::default();
        let check = check_game_completion(&self.world.state);
        if check.is_complete && self.world.state.mark_completed() {
            let event = CompletionEvent {
                total_sheep: check.total_sheep as u32,
                sheep_retired: check.sheep_retired as u32,
                game_completed: true,
                completion_time_ms: self.match_time_ms(),
            };
            info!(
                room = %self.name,
                sheep = check.total_sheep,
                time_ms = event.completion_time_ms,
                "all sheep retired"
            );
            pending.completion = Some(event);
        }

        let tick = self.world.state.tick;
        if tick % self.settings.snapshot_every == 0 || pending.completion.is_some() {
            pending.snapshot = Some(Snapshot::capture(&self.world.state, self.match_time_ms()));
        }

        if tick % (self.settings.tick_rate_hz as u64 * METRICS_INTERVAL_SECS) == 0 {
            debug!(
                room = %self.name,
                tick,
                players = self.players.len(),
                sheep = self.world.state.total_sheep(),
                retired = self.world.state.sheep_retired,
                avg_tick_ms = self.update_time_avg,
                "room metrics"
            );
        }
        pending
    }

    fn frozen_broadcasts(&self) -> PendingBroadcasts {
        let mut pending = PendingBroadcasts::default();
        if self.world.state.tick % self.settings.snapshot_every == 0 {
            pending.snapshot = Some(Snapshot::capture(&self.world.state, self.match_time_ms()));
        }
        pending
    }

    /// Hand a tick's output to subscribers. Having none is not an error.
    pub fn publish(&self, pending: PendingBroadcasts) {
        if let Some(snapshot) = pending.snapshot {
            let _ = self.events_tx.send(RoomEvent::Snapshot(Arc::new(snapshot)));
        }
        if let Some(event) = pending.completion {
            let _ = self.events_tx.send(RoomEvent::Completion(event));
        }
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("name", &self.name)
            .field("players", &self.players.len())
            .field("world", &self.world)
            .finish()
    }
}

/// Drive a room at its fixed tick rate until `shutdown` fires.
pub async fn run_room_loop(room: Arc<RwLock<Room>>, shutdown: Arc<Notify>) {
    let (interval, name) = {
        let room = room.read().await;
        (room.settings.tick_interval, room.name.clone())
    };
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let budget_ms = interval.as_secs_f64() * 1000.0 * 0.9;
    info!(room = %name, "room loop started");

    loop {
        let scheduled = tokio::select! {
            scheduled = ticker.tick() => scheduled,
            _ = shutdown.notified() => break,
        };

        // Drain any backlog so the room always runs the most recent tick.
        let mut skipped = 0u32;
        while ticker.tick().now_or_never().is_some() {
            skipped += 1;
        }
        if skipped > 0 {
            debug!(
                room = %name,
                "Skipped {} ticks to stay current (lag: {:?})",
                skipped,
                Instant::now().saturating_duration_since(scheduled)
            );
        }

        let mut room = room.write().await;
        let tick_start = std::time::Instant::now();
        let pending = room.tick();
        let tick_ms = tick_start.elapsed().as_secs_f64() * 1000.0;
        room.update_time_avg = room.update_time_avg * 0.5 + tick_ms * 0.5;
        if tick_ms > budget_ms {
            warn!(
                "Slow tick #{} in {}: {:.3}ms (budget: {:.1}ms) - {} players, {} sheep",
                room.world.state.tick,
                name,
                tick_ms,
                budget_ms,
                room.player_count(),
                room.world.state.total_sheep()
            );
        }
        room.publish(pending);
    }

    info!(room = %name, "room loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(sequence: u32, x: f32, z: f32) -> InputPacket {
        InputPacket {
            direction: Vec2::new(x, z),
            sprint: false,
            sequence,
            timestamp_ms: 0,
            client_position: None,
        }
    }

    fn room() -> Room {
        let mut config = Config::default();
        config.round.sheep_count = 5;
        Room::new("test", &config, 11)
    }

    #[test]
    fn test_sanitize_direction() {
        assert_eq!(sanitize_direction(Vec2::new(0.6, 0.8)), Some(Vec2::new(0.6, 0.8)));
        assert_eq!(sanitize_direction(Vec2::ZERO), Some(Vec2::ZERO));
        let long = sanitize_direction(Vec2::new(1.2, 0.0)).unwrap();
        assert!((long.length() - 1.0).abs() < 1e-6);
        assert_eq!(sanitize_direction(Vec2::new(2.0, 0.0)), None);
        assert_eq!(sanitize_direction(Vec2::new(f32::NAN, 0.0)), None);
        assert_eq!(sanitize_direction(Vec2::new(f32::INFINITY, 0.0)), None);
    }

    #[test]
    fn test_room_capacity() {
        let mut room = room();
        for id in 1..=4 {
            room.add_player(id, format!("p{id}"), 0).unwrap();
        }
        assert_eq!(room.add_player(5, "late", 0), Err(RoomError::Full(4)));
        assert_eq!(room.add_player(2, "again", 0), Err(RoomError::AlreadyJoined(2)));
    }

    #[test]
    fn test_one_input_applied_per_tick() {
        let mut room = room();
        room.add_player(1, "a", 0).unwrap();
        room.enqueue_input(1, input(1, 1.0, 0.0));
        room.enqueue_input(1, input(2, 0.0, 1.0));

        room.tick();
        assert_eq!(room.world.state.dogs[&1].input_sequence, 1);
        room.tick();
        assert_eq!(room.world.state.dogs[&1].input_sequence, 2);
    }

    #[test]
    fn test_stale_and_malformed_inputs_skipped() {
        let mut room = room();
        room.add_player(1, "a", 0).unwrap();
        room.enqueue_input(1, input(5, 1.0, 0.0));
        room.tick();

        room.enqueue_input(1, input(4, -1.0, 0.0));
        room.enqueue_input(1, input(6, f32::NAN, 0.0));
        room.enqueue_input(1, input(7, 0.0, 1.0));
        room.tick();

        let dog = &room.world.state.dogs[&1];
        assert_eq!(dog.input_sequence, 7);
        assert_eq!(dog.input.direction, Vec2::new(0.0, 1.0));
    }

    #[test]
    fn test_input_queue_is_bounded() {
        let mut config = Config::default();
        config.server.input_queue_limit = 2;
        let mut room = Room::new("q", &config, 1);
        room.add_player(1, "a", 0).unwrap();
        for seq in 1..=5 {
            room.enqueue_input(1, input(seq, 1.0, 0.0));
        }
        room.tick();
        assert_eq!(room.world.state.dogs[&1].input_sequence, 4);
    }

    #[test]
    fn test_stop_with_nearby_rest_position_converges() {
        let mut room = room();
        room.add_player(1, "a", 0).unwrap();
        let start = room.world.state.dogs[&1].body.position;
        let rest = start + Vec2::new(1.0, 0.0);

        room.enqueue_input(
            1,
            InputPacket {
                client_position: Some(rest),
                ..input(1, 0.0, 0.0)
            },
        );
        room.tick();
        assert!(room.world.state.dogs[&1].is_interpolating_to_client());

        for _ in 0..10 {
            room.tick();
        }
        let dog = &room.world.state.dogs[&1];
        assert!(!dog.is_interpolating_to_client());
        assert_eq!(dog.body.position, rest);
    }

    #[test]
    fn test_far_rest_position_ignored() {
        let mut room = room();
        room.add_player(1, "a", 0).unwrap();
        let start = room.world.state.dogs[&1].body.position;
        room.enqueue_input(
            1,
            InputPacket {
                client_position: Some(start + Vec2::new(30.0, 0.0)),
                ..input(1, 0.0, 0.0)
            },
        );
        room.tick();
        assert!(!room.world.state.dogs[&1].is_interpolating_to_client());
    }

    #[test]
    fn test_snapshot_cadence_and_match_start() {
        let mut room = room();
        room.add_player(1, "a", 2).unwrap();
        room.add_player(2, "b", 1).unwrap();
        let started = room.restart();
        assert_eq!(started.players, vec![(1, 2), (2, 1)]);
        assert_eq!(room.world.state.total_sheep(), 5);

        let every = room.settings.snapshot_every;
        let mut snapshots = 0;
        for _ in 0..every * 4 {
            if room.tick().snapshot.is_some() {
                snapshots += 1;
            }
        }
        assert_eq!(snapshots, 4);
    }

    #[test]
    fn test_completion_emitted_once() {
        let mut room = room();
        room.add_player(1, "a", 0).unwrap();
        room.restart();
        for sheep in &mut room.world.state.sheep {
            sheep.has_passed_gate = true;
        }

        let first = room.tick();
        let event = first.completion.expect("completion");
        assert_eq!(event.total_sheep, 5);
        assert_eq!(event.completion_time_ms, 1000 / 60);
        assert!(first.snapshot.is_some());
        assert!(!room.world.state.game_active);

        for _ in 0..10 {
            assert!(room.tick().completion.is_none());
        }
    }

    #[test]
    fn test_match_freezes_after_completion() {
        let mut room = room();
        room.add_player(1, "a", 0).unwrap();
        room.restart();
        for sheep in &mut room.world.state.sheep {
            sheep.has_passed_gate = true;
        }
        assert!(room.tick().completion.is_some());

        let frozen = room.world.state.clone();
        let tick = frozen.tick;
        room.enqueue_input(1, input(1, 1.0, 0.0));

        let every = room.settings.snapshot_every;
        let mut snapshots = Vec::new();
        for _ in 0..every * 10 {
            let pending = room.tick();
            assert!(pending.completion.is_none());
            snapshots.extend(pending.snapshot);
        }

        let state = &room.world.state;
        assert_eq!(state.tick, tick + every * 10);
        assert_eq!(state.dogs, frozen.dogs);
        assert_eq!(state.sheep, frozen.sheep);
        assert!(state.game_completed);
        assert!(!state.game_active);

        assert!(!snapshots.is_empty());
        let last = snapshots.last().unwrap();
        assert!(last.game_completed);
        assert_eq!(last.sheep, Snapshot::capture(&frozen, 0).sheep);
        assert_eq!(last.dogs, Snapshot::capture(&frozen, 0).dogs);
    }

    #[test]
    fn test_restart_unfreezes_completed_match() {
        let mut room = room();
        room.add_player(1, "a", 0).unwrap();
        room.restart();
        for sheep in &mut room.world.state.sheep {
            sheep.has_passed_gate = true;
        }
        room.tick();
        room.restart();
        assert!(room.world.state.game_active);
        assert!(!room.world.state.game_completed);

        room.enqueue_input(1, input(1, 1.0, 0.0));
        let start = room.world.state.dogs[&1].body.position;
        for _ in 0..10 {
            room.tick();
        }
        assert!(room.world.state.dogs[&1].body.position.x > start.x);
    }

    #[test]
    fn test_remove_player_mid_match() {
        let mut room = room();
        room.add_player(1, "a", 0).unwrap();
        room.add_player(2, "b", 0).unwrap();
        room.restart();
        room.tick();
        assert!(room.remove_player(1));
        assert!(!room.remove_player(1));
        room.tick();
        assert_eq!(room.world.state.dogs.len(), 1);
        assert!(room.world.state.game_active);
    }
}
