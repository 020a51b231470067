// Game state as the client sees it: staged server messages, the predicted
// local dog and interpolated everything else.
use glam::Vec2;
use protocol::{ClientPacket, CompletionEvent, MatchStarted, ServerPacket, Snapshot, Welcome};
use sim::{DogInput, PlayerId, SheepState};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::interpolation::InterpolationBuffer;
use crate::prediction::{Correction, LocalPredictor, ReconcileTuning};

/// Snapshot spacing assumed until the welcome says otherwise.
const DEFAULT_SNAPSHOT_INTERVAL_MS: f64 = 50.0;
/// Longest frame fed to prediction, in seconds.
const FRAME_DT_MAX: f32 = 0.1;
/// Ground covered per gait cycle.
const DOG_STRIDE: f32 = 2.0;
const SHEEP_STRIDE: f32 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    LocalDog,
    RemoteDog,
    Sheep,
}

/// What the presentation layer draws for one entity this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityView {
    pub kind: EntityKind,
    /// Player id for dogs, sheep id for sheep.
    pub id: u32,
    pub position: Vec2,
    pub rotation: f32,
    /// Ground speed this frame, units/s.
    pub speed: f32,
    /// Walk cycle position in `[0, 1)`, advanced by distance travelled.
    pub gait_phase: f32,
    pub skin: u8,
    pub sheep_state: Option<SheepState>,
}

/// Running totals of reconciliation outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrectionStats {
    pub none: u32,
    pub blends: u32,
    pub snaps: u32,
    pub suspended: u32,
}

impl CorrectionStats {
    fn record(&mut self, correction: &Correction) {
        match correction {
            Correction::None => self.none += 1,
            Correction::Blend { .. } => self.blends += 1,
            Correction::Snap { .. } => self.snaps += 1,
            Correction::Suspended => self.suspended += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Gait {
    last_position: Vec2,
    phase: f32,
}

/// The client's whole game.
pub struct ClientGame {
    reconcile: ReconcileTuning,
    welcome: Option<Welcome>,
    predictor: Option<LocalPredictor>,
    /// A match started; the next snapshot carries our fresh spawn.
    respawn_pending: bool,
    last_reconciled_tick: Option<u64>,
    interpolation: InterpolationBuffer,
    match_info: Option<MatchStarted>,
    completion: Option<CompletionEvent>,
    rejected: Option<String>,
    gait: HashMap<(EntityKind, u32), Gait>,
    views: Vec<EntityView>,
    pub stats: CorrectionStats,
}

impl ClientGame {
    pub fn new(reconcile: ReconcileTuning) -> Self {
        Self {
            reconcile,
            welcome: None,
            predictor: None,
            respawn_pending: false,
            last_reconciled_tick: None,
            interpolation: InterpolationBuffer::new(DEFAULT_SNAPSHOT_INTERVAL_MS),
            match_info: None,
            completion: None,
            rejected: None,
            gait: HashMap::new(),
            views: Vec::new(),
            stats: CorrectionStats::default(),
        }
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.welcome.as_ref().map(|w| w.player_id)
    }

    pub fn welcome(&self) -> Option<&Welcome> {
        self.welcome.as_ref()
    }

    pub fn predictor(&self) -> Option<&LocalPredictor> {
        self.predictor.as_ref()
    }

    pub fn latest_snapshot(&self) -> Option<&Snapshot> {
        self.interpolation.latest()
    }

    pub fn match_info(&self) -> Option<&MatchStarted> {
        self.match_info.as_ref()
    }

    pub fn completion(&self) -> Option<&CompletionEvent> {
        self.completion.as_ref()
    }

    pub fn rejection(&self) -> Option<&str> {
        self.rejected.as_deref()
    }

    pub fn is_match_active(&self) -> bool {
        self.interpolation.latest().is_some_and(|s| s.game_active)
    }

    /// Views built by the last [`ClientGame::update`].
    pub fn views(&self) -> &[EntityView] {
        &self.views
    }

    /// Consume one staged server packet.
    pub fn handle_packet(&mut self, packet: ServerPacket, now_ms: f64) {
        match packet {
            ServerPacket::Welcome(welcome) => {
                info!(
                    player = welcome.player_id,
                    tick_rate = welcome.tick_rate_hz,
                    snapshot_rate = welcome.snapshot_rate_hz,
                    "Joined"
                );
                self.interpolation
                    .set_expected_interval(1000.0 / welcome.snapshot_rate_hz.max(1) as f64);
                self.predictor = None;
                self.welcome = Some(welcome);
            }
            ServerPacket::JoinRejected { reason } => {
                warn!("Join rejected: {}", reason);
                self.rejected = Some(reason);
            }
            ServerPacket::MatchStarted(started) => {
                info!(sheep = started.total_sheep, players = started.players.len(), "Match started");
                self.interpolation.clear();
                self.gait.clear();
                self.completion = None;
                self.last_reconciled_tick = None;
                self.respawn_pending = true;
                self.match_info = Some(started);
            }
            ServerPacket::Snapshot(snapshot) => self.handle_snapshot(snapshot, now_ms),
            ServerPacket::Completion(event) => {
                info!(
                    sheep = event.total_sheep,
                    time_ms = event.completion_time_ms,
                    "All sheep retired"
                );
                self.completion = Some(event);
            }
        }
    }

    fn handle_snapshot(&mut self, snapshot: Snapshot, now_ms: f64) {
        let Some(welcome) = &self.welcome else {
            debug!("Snapshot before welcome, ignored");
            return;
        };
        let own = snapshot.dog(welcome.player_id).copied();
        let tick = snapshot.tick;
        if !self.interpolation.push(snapshot, now_ms) {
            return;
        }
        let Some(own) = own else {
            return;
        };

        match self.predictor.as_mut() {
            None => {
                self.predictor = Some(LocalPredictor::new(
                    welcome.player_id,
                    own.position,
                    own.skin,
                    &welcome.layout,
                    welcome.dog.clone(),
                    self.reconcile.clone(),
                ));
                self.respawn_pending = false;
            }
            Some(predictor) if self.respawn_pending => {
                predictor.respawn(own.position);
                self.respawn_pending = false;
            }
            Some(predictor) => {
                if self.last_reconciled_tick.is_some_and(|t| t >= tick) {
                    return;
                }
                let correction = predictor.reconcile(&own);
                self.stats.record(&correction);
            }
        }
        self.last_reconciled_tick = Some(tick);
    }

    /// One frame: consume staged packets, predict with `input`, and rebuild
    /// the views. Returns the packets to send.
    pub fn update(
        &mut self,
        staged: impl IntoIterator<Item = ServerPacket>,
        input: DogInput,
        now_ms: f64,
        dt: f32,
    ) -> Vec<ClientPacket> {
        for packet in staged {
            self.handle_packet(packet, now_ms);
        }

        let dt = dt.clamp(0.0, FRAME_DT_MAX);
        let timestamp = now_ms.max(0.0) as u64;
        let mut outgoing = Vec::new();
        if let Some(predictor) = self.predictor.as_mut() {
            if let Some(packet) = predictor.apply_local_input(input, timestamp) {
                outgoing.push(ClientPacket::Input(packet));
            }
            if let Some(packet) = predictor.step(dt, timestamp) {
                outgoing.push(ClientPacket::Input(packet));
            }
        }

        self.rebuild_views(now_ms, dt);
        outgoing
    }

    fn rebuild_views(&mut self, now_ms: f64, dt: f32) {
        let mut views = Vec::new();
        let own_id = self.player_id();

        let local = self
            .predictor
            .as_ref()
            .map(|p| (p.dog().id, p.position(), p.dog().rotation, p.dog().skin));
        if let Some((id, position, rotation, skin)) = local {
            views.push(self.view(EntityKind::LocalDog, id, position, rotation, skin, None, dt));
        }
        for (dog, pose) in self.interpolation.dogs(now_ms, own_id) {
            views.push(self.view(EntityKind::RemoteDog, dog.player_id, pose.position, pose.rotation, dog.skin, None, dt));
        }
        for (sheep, pose) in self.interpolation.sheep(now_ms) {
            views.push(self.view(EntityKind::Sheep, sheep.id, pose.position, pose.rotation, 0, Some(sheep.state), dt));
        }

        self.views = views;
    }

    #[allow(clippy::too_many_arguments)]
    fn view(
        &mut self,
        kind: EntityKind,
        id: u32,
        position: Vec2,
        rotation: f32,
        skin: u8,
        sheep_state: Option<SheepState>,
        dt: f32,
    ) -> EntityView {
        let stride = match kind {
            EntityKind::Sheep => SHEEP_STRIDE,
            _ => DOG_STRIDE,
        };
        let gait = self.gait.entry((kind, id)).or_insert(Gait {
            last_position: position,
            phase: 0.0,
        });
        let travelled = gait.last_position.distance(position);
        gait.last_position = position;
        gait.phase = (gait.phase + travelled / stride).fract();
        let speed = if dt > 0.0 { travelled / dt } else { 0.0 };

        EntityView {
            kind,
            id,
            position,
            rotation,
            speed,
            gait_phase: gait.phase,
            skin,
            sheep_state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::DogSnapshot;
    use sim::{DogTuning, FieldLayout};

    const DT: f32 = 1.0 / 60.0;

    fn welcome() -> ServerPacket {
        ServerPacket::Welcome(Welcome {
            player_id: 7,
            tick_rate_hz: 60,
            snapshot_rate_hz: 20,
            layout: FieldLayout::default(),
            dog: DogTuning::default(),
        })
    }

    fn dog(player_id: PlayerId, position: Vec2, ack: u32) -> DogSnapshot {
        DogSnapshot {
            player_id,
            position,
            velocity: Vec2::ZERO,
            rotation: 0.0,
            stamina: 100.0,
            is_sprinting: false,
            last_input_sequence: ack,
            interpolating_to_client: false,
            skin: 1,
        }
    }

    fn snapshot(tick: u64, dogs: Vec<DogSnapshot>) -> ServerPacket {
        ServerPacket::Snapshot(Snapshot {
            tick,
            game_active: true,
            dogs,
            ..Snapshot::default()
        })
    }

    #[test]
    fn test_predictor_created_from_first_snapshot() {
        let mut game = ClientGame::new(ReconcileTuning::default());
        let out = game.update([welcome(), snapshot(3, vec![dog(7, Vec2::new(4.0, 2.0), 0)])], DogInput::default(), 0.0, DT);
        assert_eq!(game.predictor().map(|p| p.position()), Some(Vec2::new(4.0, 2.0)));
        // The first idle frame announces the stop intent.
        assert_eq!(out.len(), 1);
        assert!(game.is_match_active());
    }

    #[test]
    fn test_moving_input_sends_once_and_predicts() {
        let mut game = ClientGame::new(ReconcileTuning::default());
        game.update([welcome(), snapshot(3, vec![dog(7, Vec2::ZERO, 0)])], DogInput::default(), 0.0, DT);

        let forward = DogInput {
            direction: Vec2::Y,
            sprint: false,
        };
        let out = game.update([], forward, 16.0, DT);
        assert!(matches!(out.as_slice(), [ClientPacket::Input(p)] if p.direction == Vec2::Y));
        for i in 0..10 {
            assert!(game.update([], forward, 32.0 + i as f64 * 16.0, DT).is_empty());
        }
        let local = game.views().iter().find(|v| v.kind == EntityKind::LocalDog).unwrap();
        assert!(local.position.y > 0.0);
        assert!(local.speed > 0.0);
        assert!(local.gait_phase > 0.0);
    }

    #[test]
    fn test_far_server_position_snaps_local_dog() {
        let mut game = ClientGame::new(ReconcileTuning::default());
        game.update([welcome(), snapshot(3, vec![dog(7, Vec2::ZERO, 0)])], DogInput::default(), 0.0, DT);
        game.update([snapshot(6, vec![dog(7, Vec2::new(30.0, 30.0), 0)])], DogInput::default(), 50.0, DT);
        assert_eq!(game.stats.snaps, 1);
        assert_eq!(game.predictor().unwrap().position(), Vec2::new(30.0, 30.0));
    }

    #[test]
    fn test_remote_dogs_and_sheep_are_interpolated() {
        let mut game = ClientGame::new(ReconcileTuning::default());
        game.update(
            [welcome(), snapshot(3, vec![dog(7, Vec2::ZERO, 0), dog(9, Vec2::ZERO, 0)])],
            DogInput::default(),
            0.0,
            DT,
        );
        game.update([snapshot(6, vec![dog(7, Vec2::ZERO, 0), dog(9, Vec2::new(10.0, 0.0), 0)])], DogInput::default(), 50.0, DT);
        game.update([], DogInput::default(), 75.0, DT);

        let remote = game.views().iter().find(|v| v.kind == EntityKind::RemoteDog).unwrap();
        assert_eq!(remote.id, 9);
        assert_eq!(remote.position, Vec2::new(5.0, 0.0));
        assert_eq!(game.views().iter().filter(|v| v.kind == EntityKind::LocalDog).count(), 1);
    }

    #[test]
    fn test_match_restart_respawns_and_accepts_reset_ticks() {
        let mut game = ClientGame::new(ReconcileTuning::default());
        game.update([welcome(), snapshot(300, vec![dog(7, Vec2::new(20.0, 0.0), 0)])], DogInput::default(), 0.0, DT);
        let sequence = game.predictor().unwrap().sequence();

        let started = ServerPacket::MatchStarted(MatchStarted {
            total_sheep: 10,
            players: vec![(7, 1)],
        });
        game.update([started, snapshot(3, vec![dog(7, Vec2::new(-20.0, -90.0), sequence)])], DogInput::default(), 100.0, DT);

        assert_eq!(game.latest_snapshot().map(|s| s.tick), Some(3));
        assert_eq!(game.predictor().unwrap().position(), Vec2::new(-20.0, -90.0));
        assert!(game.predictor().unwrap().sequence() > sequence);
        assert_eq!(game.stats.snaps, 0);
    }

    #[test]
    fn test_completion_and_rejection_are_kept() {
        let mut game = ClientGame::new(ReconcileTuning::default());
        game.update(
            [
                ServerPacket::JoinRejected { reason: "room is full (4 players)".into() },
                ServerPacket::Completion(CompletionEvent {
                    total_sheep: 3,
                    sheep_retired: 3,
                    game_completed: true,
                    completion_time_ms: 1000,
                }),
            ],
            DogInput::default(),
            0.0,
            DT,
        );
        assert_eq!(game.rejection(), Some("room is full (4 players)"));
        assert_eq!(game.completion().map(|c| c.sheep_retired), Some(3));
    }
}
