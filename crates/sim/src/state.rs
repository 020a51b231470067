//! Entities and the per-match game state.

use glam::Vec2;
use rand::Rng;
use std::collections::BTreeMap;

use crate::boundary::{Bounds, Gate};
use crate::movement::{Body, FrameStep, TimeScaled};
use crate::tuning::{DogTuning, FieldLayout, SheepTuning};
use crate::vector::Steer;
use crate::SimRng;

/// Stable per-connection player identifier.
pub type PlayerId = u32;

/// Sheep lifecycle.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SheepState {
    /// In the field, flocking and fleeing.
    #[default]
    Active = 0,
    /// Through the gate, walking to its spot in the pasture.
    Retiring = 1,
    /// Settled in the pasture.
    Grazing = 2,
}

impl SheepState {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Active),
            1 => Some(Self::Retiring),
            2 => Some(Self::Grazing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheep {
    pub id: u32,
    pub body: Body<FrameStep>,
    pub state: SheepState,
    /// Set once on gate passage and never cleared within a match.
    pub has_passed_gate: bool,
    pub is_retiring: bool,
    pub retirement_target: Option<Vec2>,
    pub flee_radius: f32,
    /// Render hint: heading the model faces.
    pub facing: f32,
}

impl Sheep {
    pub fn new(id: u32, position: Vec2, flee_radius: f32) -> Self {
        Self {
            id,
            body: Body::new(position),
            state: SheepState::Active,
            has_passed_gate: false,
            is_retiring: false,
            retirement_target: None,
            flee_radius,
            facing: 0.0,
        }
    }
}

/// Movement intent held by a sheepdog between input packets.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DogInput {
    /// Unit vector or zero.
    pub direction: Vec2,
    pub sprint: bool,
}

impl DogInput {
    #[inline]
    pub fn is_moving(&self) -> bool {
        self.direction != Vec2::ZERO
    }
}

/// How the server is currently driving a sheepdog.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DogMode {
    /// Normal physics from the held input.
    #[default]
    Physics,
    /// The client reported where it stopped; converge there with velocity
    /// held at zero instead of running physics.
    InterpolatingToClient { target: Vec2, ticks_left: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheepdog {
    pub id: PlayerId,
    pub body: Body<TimeScaled>,
    pub max_speed: f32,
    pub sprint_speed: f32,
    pub max_stamina: f32,
    pub stamina: f32,
    pub is_sprinting: bool,
    pub rotation: f32,
    /// Sequence number of the last applied input.
    pub input_sequence: u32,
    pub input: DogInput,
    pub mode: DogMode,
    /// Render skin chosen in the lobby. Physics ignores it.
    pub skin: u8,
}

impl Sheepdog {
    pub fn new(id: PlayerId, position: Vec2, skin: u8, tuning: &DogTuning) -> Self {
        Self {
            id,
            body: Body::new(position),
            max_speed: tuning.max_speed,
            sprint_speed: tuning.sprint_speed,
            max_stamina: tuning.max_stamina,
            stamina: tuning.max_stamina,
            is_sprinting: false,
            rotation: 0.0,
            input_sequence: 0,
            input: DogInput::default(),
            mode: DogMode::Physics,
            skin,
        }
    }

    /// Apply an input if its sequence is newer than the last applied one.
    ///
    /// Returns `false` (and changes nothing) for stale or duplicate
    /// sequences.
    pub fn apply_input(&mut self, input: DogInput, sequence: u32, tuning: &DogTuning) -> bool {
        if sequence <= self.input_sequence {
            return false;
        }
        self.input_sequence = sequence;
        self.input = input;
        self.body.acceleration = input.direction * tuning.acceleration;
        if input.is_moving() {
            self.mode = DogMode::Physics;
        }
        true
    }

    #[inline]
    pub fn is_interpolating_to_client(&self) -> bool {
        matches!(self.mode, DogMode::InterpolatingToClient { .. })
    }

    /// Stop and glide onto the client's reported rest position.
    pub fn converge_to(&mut self, target: Vec2, ticks: u32) {
        self.input = DogInput::default();
        self.body.velocity = Vec2::ZERO;
        self.body.acceleration = Vec2::ZERO;
        self.mode = DogMode::InterpolatingToClient {
            target,
            ticks_left: ticks.max(1),
        };
    }

    /// Back to spawn with full stamina. The input sequence survives so the
    /// client's counter stays valid across restarts.
    pub fn reset(&mut self, position: Vec2, tuning: &DogTuning) {
        self.body = Body::new(position);
        self.stamina = tuning.max_stamina;
        self.is_sprinting = false;
        self.rotation = 0.0;
        self.input = DogInput::default();
        self.mode = DogMode::Physics;
    }
}

/// Authoritative state of one match.
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    pub bounds: Bounds,
    pub gate: Gate,
    pub pasture: Bounds,
    pub edge_margin: f32,
    pub hard_margin: f32,
    pub sheep: Vec<Sheep>,
    /// Ordered by player id so every pass iterates dogs identically.
    pub dogs: BTreeMap<PlayerId, Sheepdog>,
    pub sheep_retired: usize,
    pub game_completed: bool,
    pub game_active: bool,
    pub tick: u64,
}

impl GameState {
    pub fn new(layout: &FieldLayout) -> Self {
        Self {
            bounds: layout.bounds(),
            gate: layout.gate(),
            pasture: layout.pasture(),
            edge_margin: layout.edge_margin,
            hard_margin: layout.hard_margin,
            sheep: Vec::new(),
            dogs: BTreeMap::new(),
            sheep_retired: 0,
            game_completed: false,
            game_active: false,
            tick: 0,
        }
    }

    #[inline]
    pub fn total_sheep(&self) -> usize {
        self.sheep.len()
    }

    /// Replace the flock with `count` fresh sheep around the spawn point.
    pub fn spawn_flock(&mut self, count: usize, tuning: &SheepTuning, rng: &mut SimRng) {
        let center = Vec2::new(self.bounds.center().x, tuning.spawn_center_z);
        let area = self.bounds.inset(self.edge_margin);

        self.sheep.clear();
        self.sheep.reserve(count);
        for id in 0..count {
            let angle = rng.random_range(0.0..std::f32::consts::TAU);
            let radius = tuning.spawn_radius * rng.random::<f32>().sqrt();
            let offset = Vec2::new(angle.sin(), angle.cos()) * radius;
            let mut sheep = Sheep::new(id as u32, area.clamp(center + offset), tuning.flee_radius);
            sheep.facing = rng.random_range(-std::f32::consts::PI..std::f32::consts::PI);
            self.sheep.push(sheep);
        }
        self.sheep_retired = 0;
    }

    /// Spawn slot for the `index`-th dog, spread along the far end of the
    /// field from the gate.
    pub fn dog_spawn(&self, index: usize) -> Vec2 {
        let spacing = self.bounds.width() / 5.0;
        let x = self.bounds.min_x + spacing * (1 + index % 4) as f32;
        let z = self.bounds.min_z + self.edge_margin * 2.0;
        Vec2::new(x, z)
    }

    pub fn add_dog(&mut self, id: PlayerId, skin: u8, tuning: &DogTuning) {
        let spawn = self.dog_spawn(self.dogs.len());
        self.dogs
            .entry(id)
            .or_insert_with(|| Sheepdog::new(id, spawn, skin, tuning));
    }

    pub fn remove_dog(&mut self, id: PlayerId) -> Option<Sheepdog> {
        self.dogs.remove(&id)
    }

    /// Fresh round: new flock, dogs back to their slots, flags cleared.
    pub fn reset_round(&mut self, sheep_count: usize, sheep: &SheepTuning, dog: &DogTuning, rng: &mut SimRng) {
        self.spawn_flock(sheep_count, sheep, rng);
        let spawns: Vec<Vec2> = (0..self.dogs.len()).map(|i| self.dog_spawn(i)).collect();
        for (dog_state, spawn) in self.dogs.values_mut().zip(spawns) {
            dog_state.reset(spawn, dog);
        }
        self.sheep_retired = 0;
        self.game_completed = false;
        self.game_active = true;
        self.tick = 0;
    }

    /// Edge trigger for completion: true exactly once per match.
    pub fn mark_completed(&mut self) -> bool {
        if self.game_completed {
            return false;
        }
        self.game_completed = true;
        self.game_active = false;
        true
    }

    /// Whether every entity is where containment allows it to be.
    pub fn is_contained(&self) -> bool {
        let dogs_ok = self.dogs.values().all(|d| self.bounds.contains(d.body.position));
        let sheep_ok = self.sheep.iter().all(|s| {
            let p = s.body.position;
            match s.state {
                SheepState::Active => self.bounds.contains(p) || self.gate.zone.contains(p),
                SheepState::Retiring => {
                    self.bounds.contains(p) || self.gate.zone.contains(p) || self.pasture.contains(p)
                }
                SheepState::Grazing => self.pasture.contains(p),
            }
        });
        dogs_ok && sheep_ok
    }

    /// Every position and velocity is finite.
    pub fn is_finite(&self) -> bool {
        self.sheep
            .iter()
            .all(|s| s.body.position.is_sane() && s.body.velocity.is_sane())
            && self
                .dogs
                .values()
                .all(|d| d.body.position.is_sane() && d.body.velocity.is_sane())
    }
}
