//! One match's simulation: state, tuning, RNG and scratch buffers.

use glam::Vec2;
use tracing::warn;

use crate::behavior::{active_sheep_force, move_active_sheep, step_sheepdog, turn_sheep, Surroundings};
use crate::boundary::{detect_gate_passage, Bounds};
use crate::flocking::Neighbor;
use crate::retirement::{begin_retirement, count_retired, pick_retirement_target, update_grazing, update_retiring};
use crate::spatial::SpatialGrid;
use crate::state::{DogInput, GameState, PlayerId, SheepState};
use crate::tuning::{DogTuning, FieldLayout, SheepTuning};
use crate::{seeded_rng, SimRng};

/// What happened during one [`World::step`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// Sheep ids that passed the gate this step.
    pub newly_retired: Vec<u32>,
    /// Sheep ids that reached their pasture spot this step.
    pub newly_grazing: Vec<u32>,
    /// Entities whose non-finite values had to be repaired.
    pub corrections: u32,
}

pub struct World {
    pub state: GameState,
    pub sheep_tuning: SheepTuning,
    pub dog_tuning: DogTuning,
    rng: SimRng,
    grid: SpatialGrid,
    // Reused every step.
    forces: Vec<Vec2>,
    dog_positions: Vec<Vec2>,
    neighbor_ids: Vec<usize>,
    neighbors: Vec<Neighbor>,
}

impl World {
    pub fn new(layout: &FieldLayout, sheep_tuning: SheepTuning, dog_tuning: DogTuning, seed: u64) -> Self {
        let state = GameState::new(layout);
        let b = state.bounds;
        let p = state.pasture;
        let extent = Bounds::new(
            b.min_x.min(p.min_x),
            b.min_z.min(p.min_z),
            b.max_x.max(p.max_x),
            b.max_z.max(p.max_z),
        );
        let grid = SpatialGrid::new(extent, sheep_tuning.perception_radius);

        Self {
            state,
            sheep_tuning,
            dog_tuning,
            rng: seeded_rng(seed),
            grid,
            forces: Vec::new(),
            dog_positions: Vec::new(),
            neighbor_ids: Vec::new(),
            neighbors: Vec::new(),
        }
    }

    /// Fresh round with `sheep_count` sheep; existing dogs go back to their
    /// slots.
    pub fn start_round(&mut self, sheep_count: usize) {
        self.state
            .reset_round(sheep_count, &self.sheep_tuning, &self.dog_tuning, &mut self.rng);
    }

    pub fn add_dog(&mut self, id: PlayerId, skin: u8) {
        self.state.add_dog(id, skin, &self.dog_tuning);
    }

    pub fn remove_dog(&mut self, id: PlayerId) -> bool {
        self.state.remove_dog(id).is_some()
    }

    /// See [`crate::Sheepdog::apply_input`]. Unknown players are ignored.
    pub fn apply_input(&mut self, id: PlayerId, input: DogInput, sequence: u32) -> bool {
        match self.state.dogs.get_mut(&id) {
            Some(dog) => dog.apply_input(input, sequence, &self.dog_tuning),
            None => false,
        }
    }

    /// Advance dogs, then sheep, then the retirement tally by one tick of
    /// `dt` seconds. Completion is left to the caller.
    pub fn step(&mut self, dt: f32) -> StepReport {
        let mut report = StepReport::default();
        let state = &mut self.state;

        for dog in state.dogs.values_mut() {
            if step_sheepdog(dog, &self.dog_tuning, &state.bounds, state.hard_margin, &state.gate, dt) {
                warn!(player = dog.id, "sheepdog state corrected");
                report.corrections += 1;
            }
        }

        self.dog_positions.clear();
        self.dog_positions
            .extend(state.dogs.values().map(|d| d.body.position));

        // Grazing sheep have left the field and no longer influence the flock.
        self.grid.rebuild(
            state
                .sheep
                .iter()
                .enumerate()
                .filter(|(_, s)| s.state != SheepState::Grazing)
                .map(|(i, s)| (i, s.body.position)),
        );

        let around = Surroundings {
            bounds: &state.bounds,
            gate: &state.gate,
            edge_margin: state.edge_margin,
        };

        // Forces come from the start-of-tick snapshot so update order does
        // not matter.
        self.forces.clear();
        self.forces.resize(state.sheep.len(), Vec2::ZERO);
        for (i, sheep) in state.sheep.iter().enumerate() {
            if sheep.state != SheepState::Active {
                continue;
            }
            self.grid.query(
                sheep.body.position,
                self.sheep_tuning.perception_radius,
                &mut self.neighbor_ids,
            );
            self.neighbors.clear();
            self.neighbors.extend(
                self.neighbor_ids
                    .iter()
                    .filter(|&&j| j != i)
                    .map(|&j| Neighbor {
                        position: state.sheep[j].body.position,
                        velocity: state.sheep[j].body.velocity,
                    }),
            );
            self.forces[i] = active_sheep_force(
                sheep,
                &self.neighbors,
                &self.dog_positions,
                &around,
                &self.sheep_tuning,
            );
        }

        for (sheep, &force) in state.sheep.iter_mut().zip(&self.forces) {
            match sheep.state {
                SheepState::Active => {
                    if move_active_sheep(sheep, force, &around, state.hard_margin, &self.sheep_tuning) {
                        warn!(sheep = sheep.id, "sheep state corrected");
                        report.corrections += 1;
                    }
                    if detect_gate_passage(sheep.body.position, sheep.body.velocity, &state.gate) {
                        let target = pick_retirement_target(&state.pasture, &mut self.rng);
                        begin_retirement(sheep, target);
                        report.newly_retired.push(sheep.id);
                    }
                }
                SheepState::Retiring => {
                    if update_retiring(sheep, &state.gate, &state.pasture, &self.sheep_tuning) {
                        report.newly_grazing.push(sheep.id);
                    }
                    if sheep.body.sanitize(state.pasture.center()) {
                        report.corrections += 1;
                    }
                    turn_sheep(sheep, self.sheep_tuning.min_movement);
                }
                SheepState::Grazing => {
                    update_grazing(sheep, &state.pasture, &self.sheep_tuning);
                    if sheep.body.sanitize(state.pasture.center()) {
                        report.corrections += 1;
                    }
                    turn_sheep(sheep, self.sheep_tuning.min_movement);
                }
            }
        }

        state.sheep_retired = count_retired(&state.sheep);
        state.tick += 1;
        report
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("tick", &self.state.tick)
            .field("sheep", &self.state.sheep.len())
            .field("dogs", &self.state.dogs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retirement::check_game_completion;
    use crate::state::Sheep;
    use crate::validation::validate_state;
    use rand::{Rng, SeedableRng};

    const DT: f32 = 1.0 / 60.0;

    fn world(seed: u64) -> World {
        World::new(&FieldLayout::default(), SheepTuning::default(), DogTuning::default(), seed)
    }

    #[test]
    fn test_sheep_in_zone_moving_forward_retires_in_one_step() {
        let mut w = world(1);
        w.state.game_active = true;
        let mut sheep = Sheep::new(0, Vec2::new(0.0, 99.0), 12.0);
        sheep.body.velocity = Vec2::new(0.0, 1.0);
        w.state.sheep.push(sheep);

        let report = w.step(DT);
        let sheep = &w.state.sheep[0];
        assert!(sheep.has_passed_gate);
        assert_eq!(sheep.state, SheepState::Retiring);
        assert!(sheep.retirement_target.is_some());
        assert_eq!(report.newly_retired, vec![0]);
        assert_eq!(w.state.sheep_retired, 1);
    }

    #[test]
    fn test_identical_seeds_and_inputs_are_bit_identical() {
        let mut a = world(99);
        let mut b = world(99);
        for w in [&mut a, &mut b] {
            w.add_dog(1, 0);
            w.add_dog(2, 1);
            w.start_round(40);
        }

        let mut inputs = rand_pcg::Pcg32::seed_from_u64(5);
        for seq in 1..=600u32 {
            let angle: f32 = inputs.random_range(0.0..std::f32::consts::TAU);
            let input = DogInput {
                direction: Vec2::new(angle.sin(), angle.cos()),
                sprint: inputs.random_bool(0.3),
            };
            for w in [&mut a, &mut b] {
                w.apply_input(1, input, seq);
                w.apply_input(2, DogInput::default(), seq);
                w.step(DT);
            }
        }
        assert_eq!(a.state, b.state);
    }

    #[test]
    fn test_long_random_run_stays_finite_and_contained() {
        let mut w = world(2024);
        for id in 1..=4 {
            w.add_dog(id, id as u8);
        }
        w.start_round(60);

        let mut inputs = rand_pcg::Pcg32::seed_from_u64(17);
        for seq in 1..=10_000u32 {
            for id in 1..=4 {
                let input = if inputs.random_bool(0.1) {
                    DogInput::default()
                } else {
                    let angle: f32 = inputs.random_range(0.0..std::f32::consts::TAU);
                    DogInput {
                        direction: Vec2::new(angle.sin(), angle.cos()),
                        sprint: inputs.random_bool(0.5),
                    }
                };
                w.apply_input(id, input, seq);
            }
            w.step(DT);
            assert!(w.state.is_finite(), "non-finite value at tick {}", w.state.tick);
            assert!(w.state.is_contained(), "escaped bounds at tick {}", w.state.tick);
        }

        assert!(validate_state(&w.state).is_empty());
        for dog in w.state.dogs.values() {
            assert!(dog.body.speed() <= dog.sprint_speed + 1e-3);
        }
    }

    #[test]
    fn test_passed_flag_never_clears() {
        let mut w = world(8);
        w.state.game_active = true;
        let mut sheep = Sheep::new(0, Vec2::new(0.0, 99.0), 12.0);
        sheep.body.velocity = Vec2::new(0.0, 1.0);
        w.state.sheep.push(sheep);

        for _ in 0..1_000 {
            w.step(DT);
            assert!(w.state.sheep[0].has_passed_gate);
        }
        assert_eq!(w.state.sheep[0].state, SheepState::Grazing);
        assert!(check_game_completion(&w.state).is_complete);
    }
}
