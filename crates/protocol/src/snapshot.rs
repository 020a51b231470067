//! Wire-level views of the simulation.

use glam::Vec2;
use sim::{quantize, quantize_vec, GameState, PlayerId, SheepState};

/// One input sample from a client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputPacket {
    /// Unit vector or zero. Raw on the wire; the server validates it.
    pub direction: Vec2,
    pub sprint: bool,
    pub sequence: u32,
    pub timestamp_ms: u64,
    /// Where the client's dog came to rest. Only sent with a stop.
    pub client_position: Option<Vec2>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SheepSnapshot {
    pub id: u32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub state: SheepState,
    pub facing: f32,
    pub has_passed_gate: bool,
    pub is_retiring: bool,
    pub retirement_target: Option<Vec2>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DogSnapshot {
    pub player_id: PlayerId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub rotation: f32,
    pub stamina: f32,
    pub is_sprinting: bool,
    pub last_input_sequence: u32,
    pub interpolating_to_client: bool,
    pub skin: u8,
}

/// Quantized copy of a [`GameState`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub tick: u64,
    /// Match clock, derived from the tick count.
    pub timestamp_ms: u64,
    pub game_active: bool,
    pub game_completed: bool,
    pub sheep_retired: u32,
    pub total_sheep: u32,
    pub sheep: Vec<SheepSnapshot>,
    pub dogs: Vec<DogSnapshot>,
}

impl Snapshot {
    /// Capture `state`, rounding every float to what the wire will carry.
    pub fn capture(state: &GameState, timestamp_ms: u64) -> Self {
        let sheep = state
            .sheep
            .iter()
            .map(|s| SheepSnapshot {
                id: s.id,
                position: quantize_vec(s.body.position),
                velocity: quantize_vec(s.body.velocity),
                state: s.state,
                facing: quantize(s.facing),
                has_passed_gate: s.has_passed_gate,
                is_retiring: s.is_retiring,
                retirement_target: s.retirement_target.map(quantize_vec),
            })
            .collect();

        let dogs = state
            .dogs
            .values()
            .map(|d| DogSnapshot {
                player_id: d.id,
                position: quantize_vec(d.body.position),
                velocity: quantize_vec(d.body.velocity),
                rotation: quantize(d.rotation),
                stamina: quantize(d.stamina),
                is_sprinting: d.is_sprinting,
                last_input_sequence: d.input_sequence,
                interpolating_to_client: d.is_interpolating_to_client(),
                skin: d.skin,
            })
            .collect();

        Self {
            tick: state.tick,
            timestamp_ms,
            game_active: state.game_active,
            game_completed: state.game_completed,
            sheep_retired: state.sheep_retired as u32,
            total_sheep: state.total_sheep() as u32,
            sheep,
            dogs,
        }
    }

    pub fn dog(&self, player_id: PlayerId) -> Option<&DogSnapshot> {
        self.dogs.iter().find(|d| d.player_id == player_id)
    }
}

/// Sent once when a match completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionEvent {
    pub total_sheep: u32,
    pub sheep_retired: u32,
    pub game_completed: bool,
    pub completion_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim::{DogTuning, FieldLayout, Sheep};

    #[test]
    fn test_capture_quantizes_and_orders_dogs() {
        let mut state = GameState::new(&FieldLayout::default());
        let tuning = DogTuning::default();
        state.add_dog(7, 1, &tuning);
        state.add_dog(3, 0, &tuning);
        let mut sheep = Sheep::new(0, Vec2::new(1.23456, -4.5678), 12.0);
        sheep.body.velocity = Vec2::new(0.15432, 0.0);
        state.sheep.push(sheep);
        state.tick = 12;

        let snap = Snapshot::capture(&state, 200);
        assert_eq!(snap.sheep[0].position, Vec2::new(1.23, -4.57));
        assert_eq!(snap.sheep[0].velocity, Vec2::new(0.15, 0.0));
        assert_eq!(snap.dogs[0].player_id, 3);
        assert_eq!(snap.dogs[1].player_id, 7);
        assert_eq!(snap.total_sheep, 1);
        assert!(snap.dog(7).is_some());
    }
}
