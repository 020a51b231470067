// Local prediction of the player's own sheepdog and reconciliation against
// authoritative snapshots.
use glam::Vec2;
use protocol::{DogSnapshot, InputPacket};
use serde::{Deserialize, Serialize};
use sim::behavior::step_sheepdog;
use sim::{quantize_vec, Bounds, DogInput, DogTuning, FieldLayout, Gate, PlayerId, Sheepdog};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// How hard reconciliation pulls the predicted dog toward the server.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReconcileTuning {
    /// Divergence at or below this is left alone.
    #[serde(default = "default_dead_zone")]
    pub dead_zone: f32,
    /// Divergence beyond this snaps instead of blending.
    #[serde(default = "default_snap_distance")]
    pub snap_distance: f32,
    /// Blend speed floor, units/s.
    #[serde(default = "default_base_speed")]
    pub base_speed: f32,
    /// Extra blend speed per unit of divergence.
    #[serde(default = "default_distance_gain")]
    pub distance_gain: f32,
    /// Blend speed multiplier when local and server sprint flags differ.
    #[serde(default = "default_sprint_mismatch_boost")]
    pub sprint_mismatch_boost: f32,
    /// Unacknowledged inputs kept before the oldest is dropped.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

impl Default for ReconcileTuning {
    fn default() -> Self {
        Self {
            dead_zone: default_dead_zone(),
            snap_distance: default_snap_distance(),
            base_speed: default_base_speed(),
            distance_gain: default_distance_gain(),
            sprint_mismatch_boost: default_sprint_mismatch_boost(),
            max_pending: default_max_pending(),
        }
    }
}

fn default_dead_zone() -> f32 {
    0.1
}
fn default_snap_distance() -> f32 {
    10.0
}
fn default_base_speed() -> f32 {
    2.0
}
fn default_distance_gain() -> f32 {
    3.0
}
fn default_sprint_mismatch_boost() -> f32 {
    1.5
}
fn default_max_pending() -> usize {
    64
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// The server is converging onto our rest position; hands off.
    Suspended,
    /// Within the dead zone.
    None,
    /// `offset` will be worked off at `speed` units/s over the next frames.
    Blend { offset: Vec2, speed: f32 },
    /// Jumped straight to the server position.
    Snap { from: Vec2, to: Vec2 },
}

/// Correction still being applied across frames.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Blend {
    remaining: Vec2,
    speed: f32,
}

/// Shadow copy of the local player's sheepdog, advanced with the same
/// integration the server runs.
#[derive(Debug, Clone)]
pub struct LocalPredictor {
    dog: Sheepdog,
    tuning: DogTuning,
    reconcile: ReconcileTuning,
    bounds: Bounds,
    hard_margin: f32,
    gate: Gate,
    sequence: u32,
    pending: VecDeque<InputPacket>,
    last_sent: Option<DogInput>,
    /// Set on a stop; cleared once the dog has come to rest and the rest
    /// position went out.
    awaiting_rest: bool,
    blend: Option<Blend>,
}

impl LocalPredictor {
    pub fn new(
        player_id: PlayerId,
        position: Vec2,
        skin: u8,
        layout: &FieldLayout,
        tuning: DogTuning,
        reconcile: ReconcileTuning,
    ) -> Self {
        Self {
            dog: Sheepdog::new(player_id, position, skin, &tuning),
            tuning,
            reconcile,
            bounds: layout.bounds(),
            hard_margin: layout.hard_margin,
            gate: layout.gate(),
            sequence: 0,
            pending: VecDeque::new(),
            last_sent: None,
            awaiting_rest: false,
            blend: None,
        }
    }

    #[inline]
    pub fn dog(&self) -> &Sheepdog {
        &self.dog
    }

    #[inline]
    pub fn position(&self) -> Vec2 {
        self.dog.body.position
    }

    #[inline]
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Inputs sent but not yet acknowledged by a snapshot. Bookkeeping
    /// only: reconciliation trims it by the acknowledged sequence and never
    /// replays it, since a snap adopts the server's position and velocity
    /// while the held intent keeps driving the dog.
    pub fn pending(&self) -> impl Iterator<Item = &InputPacket> {
        self.pending.iter()
    }

    pub fn is_blending(&self) -> bool {
        self.blend.is_some()
    }

    /// Feed this frame's intent. Returns a packet to send when the intent
    /// changed since the last one sent.
    pub fn apply_local_input(&mut self, input: DogInput, timestamp_ms: u64) -> Option<InputPacket> {
        if self.last_sent == Some(input) {
            return None;
        }
        self.last_sent = Some(input);
        self.awaiting_rest = !input.is_moving() && self.dog.body.velocity != Vec2::ZERO;
        Some(self.send(input, None, timestamp_ms))
    }

    fn send(&mut self, input: DogInput, client_position: Option<Vec2>, timestamp_ms: u64) -> InputPacket {
        self.sequence = self.sequence.wrapping_add(1);
        self.dog.apply_input(input, self.sequence, &self.tuning);

        let packet = InputPacket {
            direction: input.direction,
            sprint: input.sprint,
            sequence: self.sequence,
            timestamp_ms,
            client_position,
        };
        if self.pending.len() >= self.reconcile.max_pending.max(1) {
            self.pending.pop_front();
        }
        self.pending.push_back(packet);
        packet
    }

    /// Advance one frame. After a stop, returns the packet announcing where
    /// the dog came to rest.
    pub fn step(&mut self, dt: f32, timestamp_ms: u64) -> Option<InputPacket> {
        if step_sheepdog(&mut self.dog, &self.tuning, &self.bounds, self.hard_margin, &self.gate, dt) {
            debug!(player = self.dog.id, "predicted dog repaired");
        }
        self.advance_blend(dt);

        if self.awaiting_rest && self.blend.is_none() && self.dog.body.velocity == Vec2::ZERO {
            self.awaiting_rest = false;
            let input = self.dog.input;
            let rest = quantize_vec(self.dog.body.position);
            return Some(self.send(input, Some(rest), timestamp_ms));
        }
        None
    }

    fn advance_blend(&mut self, dt: f32) {
        let Some(blend) = self.blend.as_mut() else {
            return;
        };
        let distance = blend.remaining.length();
        let step = (blend.speed * dt).min(distance);
        if distance <= f32::EPSILON || step >= distance {
            self.dog.body.teleport(self.dog.body.position + blend.remaining);
            self.blend = None;
            return;
        }
        let delta = blend.remaining * (step / distance);
        blend.remaining -= delta;
        self.dog.body.teleport(self.dog.body.position + delta);
    }

    /// Compare the prediction with the server's view of our dog.
    pub fn reconcile(&mut self, server: &DogSnapshot) -> Correction {
        let acked = server.last_input_sequence;
        self.pending.retain(|p| p.sequence > acked);

        let sprint_mismatch = self.dog.is_sprinting != server.is_sprinting;
        self.dog.stamina = server.stamina;
        self.dog.is_sprinting = server.is_sprinting;

        if server.interpolating_to_client {
            self.blend = None;
            return Correction::Suspended;
        }

        let predicted = self.dog.body.position;
        let distance = predicted.distance(server.position);
        if !distance.is_finite() || distance > self.reconcile.snap_distance {
            debug!(player = self.dog.id, distance, "prediction snapped to server");
            self.dog.body.teleport(server.position);
            self.dog.body.velocity = server.velocity;
            self.blend = None;
            return Correction::Snap {
                from: predicted,
                to: server.position,
            };
        }
        if distance <= self.reconcile.dead_zone {
            return Correction::None;
        }

        let mut speed = self.reconcile.base_speed + distance * self.reconcile.distance_gain;
        if sprint_mismatch {
            speed *= self.reconcile.sprint_mismatch_boost;
        }
        let offset = server.position - predicted;
        trace!(player = self.dog.id, distance, speed, "blending toward server");
        self.blend = Some(Blend {
            remaining: offset,
            speed,
        });
        Correction::Blend { offset, speed }
    }

    /// Put the dog back at a fresh spawn for a new match. The sequence
    /// counter keeps running; the held intent is resent on the next frame.
    pub fn respawn(&mut self, position: Vec2) {
        self.dog.reset(position, &self.tuning);
        self.pending.clear();
        self.last_sent = None;
        self.awaiting_rest = false;
        self.blend = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn predictor() -> LocalPredictor {
        LocalPredictor::new(
            1,
            Vec2::ZERO,
            0,
            &FieldLayout::default(),
            DogTuning::default(),
            ReconcileTuning::default(),
        )
    }

    fn server_at(position: Vec2) -> DogSnapshot {
        DogSnapshot {
            player_id: 1,
            position,
            velocity: Vec2::ZERO,
            rotation: 0.0,
            stamina: 100.0,
            is_sprinting: false,
            last_input_sequence: 0,
            interpolating_to_client: false,
            skin: 0,
        }
    }

    fn moving(x: f32, z: f32) -> DogInput {
        DogInput {
            direction: Vec2::new(x, z),
            sprint: false,
        }
    }

    #[test]
    fn test_far_divergence_snaps_exactly() {
        let mut p = predictor();
        let correction = p.reconcile(&server_at(Vec2::new(50.0, 50.0)));
        assert!(matches!(correction, Correction::Snap { .. }));
        assert_eq!(p.position(), Vec2::new(50.0, 50.0));
        assert!(!p.is_blending());
    }

    #[test]
    fn test_snap_keeps_unacknowledged_inputs_and_held_intent() {
        let mut p = predictor();
        p.apply_local_input(moving(1.0, 0.0), 0);
        p.apply_local_input(moving(0.0, 1.0), 16);

        let mut server = server_at(Vec2::new(20.0, 20.0));
        server.last_input_sequence = 1;
        assert!(matches!(p.reconcile(&server), Correction::Snap { .. }));

        let left: Vec<u32> = p.pending().map(|i| i.sequence).collect();
        assert_eq!(left, vec![2]);
        assert_eq!(p.dog().input, moving(0.0, 1.0));

        p.step(DT, 32);
        let after = p.position();
        assert_eq!(after.x, 20.0);
        assert!(after.y > 20.0);
    }

    #[test]
    fn test_small_divergence_is_ignored() {
        let mut p = predictor();
        let correction = p.reconcile(&server_at(Vec2::new(0.05, 0.0)));
        assert_eq!(correction, Correction::None);
        assert_eq!(p.position(), Vec2::ZERO);
    }

    #[test]
    fn test_moderate_divergence_blends_over_frames() {
        let mut p = predictor();
        let target = Vec2::new(2.0, 0.0);
        let Correction::Blend { offset, speed } = p.reconcile(&server_at(target)) else {
            panic!("expected blend");
        };
        assert_eq!(offset, target);
        assert!((speed - (2.0 + 2.0 * 3.0)).abs() < 1e-5);
        assert_eq!(p.position(), Vec2::ZERO);

        p.step(DT, 0);
        let first = p.position();
        assert!(first.x > 0.0 && first.x < 2.0);

        for _ in 0..60 {
            p.step(DT, 0);
        }
        assert!(!p.is_blending());
        assert!((p.position().x - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_sprint_mismatch_speeds_up_blend() {
        let mut p = predictor();
        let mut server = server_at(Vec2::new(2.0, 0.0));
        let Correction::Blend { speed: calm, .. } = p.reconcile(&server) else {
            panic!("expected blend");
        };

        let mut q = predictor();
        server.is_sprinting = true;
        let Correction::Blend { speed: boosted, .. } = q.reconcile(&server) else {
            panic!("expected blend");
        };
        assert!((boosted - calm * 1.5).abs() < 1e-5);
        assert!(q.dog().is_sprinting);
    }

    #[test]
    fn test_server_convergence_suspends_reconciliation() {
        let mut p = predictor();
        let mut server = server_at(Vec2::new(50.0, 50.0));
        server.interpolating_to_client = true;
        server.stamina = 40.0;
        assert_eq!(p.reconcile(&server), Correction::Suspended);
        assert_eq!(p.position(), Vec2::ZERO);
        assert_eq!(p.dog().stamina, 40.0);
    }

    #[test]
    fn test_inputs_sent_on_change_and_acknowledged() {
        let mut p = predictor();
        let first = p.apply_local_input(moving(1.0, 0.0), 0).unwrap();
        assert_eq!(first.sequence, 1);
        assert!(p.apply_local_input(moving(1.0, 0.0), 16).is_none());
        let second = p.apply_local_input(moving(0.0, 1.0), 32).unwrap();
        assert_eq!(second.sequence, 2);
        assert_eq!(p.pending().count(), 2);

        let mut server = server_at(p.position());
        server.last_input_sequence = 1;
        p.reconcile(&server);
        let left: Vec<u32> = p.pending().map(|i| i.sequence).collect();
        assert_eq!(left, vec![2]);
    }

    #[test]
    fn test_stop_reports_rest_position_once() {
        let mut p = predictor();
        p.apply_local_input(moving(1.0, 0.0), 0);
        for _ in 0..30 {
            assert!(p.step(DT, 0).is_none());
        }
        let stop = p.apply_local_input(DogInput::default(), 500).unwrap();
        assert_eq!(stop.client_position, None);

        let mut rest = None;
        for _ in 0..600 {
            if let Some(packet) = p.step(DT, 1000) {
                rest = Some(packet);
                break;
            }
        }
        let rest = rest.expect("dog came to rest");
        assert_eq!(rest.direction, Vec2::ZERO);
        assert_eq!(rest.sequence, stop.sequence + 1);
        assert_eq!(rest.client_position, Some(quantize_vec(p.position())));
        assert!(p.step(DT, 1016).is_none());
    }

    #[test]
    fn test_prediction_matches_server_integration() {
        let layout = FieldLayout::default();
        let tuning = DogTuning::default();
        let mut p = predictor();
        let mut server_dog = Sheepdog::new(1, Vec2::ZERO, 0, &tuning);

        let input = moving(0.6, 0.8);
        let packet = p.apply_local_input(input, 0).unwrap();
        server_dog.apply_input(input, packet.sequence, &tuning);
        for _ in 0..120 {
            p.step(DT, 0);
            step_sheepdog(&mut server_dog, &tuning, &layout.bounds(), layout.hard_margin, &layout.gate(), DT);
        }
        assert_eq!(p.position(), server_dog.body.position);
        assert_eq!(p.dog().rotation, server_dog.rotation);
    }

    #[test]
    fn test_pending_buffer_is_bounded() {
        let mut p = LocalPredictor::new(
            1,
            Vec2::ZERO,
            0,
            &FieldLayout::default(),
            DogTuning::default(),
            ReconcileTuning {
                max_pending: 3,
                ..ReconcileTuning::default()
            },
        );
        for i in 0..10 {
            let sprint = i % 2 == 0;
            p.apply_local_input(DogInput { direction: Vec2::X, sprint }, 0);
        }
        let kept: Vec<u32> = p.pending().map(|i| i.sequence).collect();
        assert_eq!(kept, vec![8, 9, 10]);
    }
}
