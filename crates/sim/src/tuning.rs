//! Tunable simulation constants.
//!
//! Everything here deserializes from the server's `config.toml` with a
//! default for every field, so a partial file is enough.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::boundary::{Bounds, Gate};
use crate::flocking::FlockParams;
use crate::movement::{MotionParams, StaminaParams};

/// Field, gate and pasture geometry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldLayout {
    /// Field extent along X (centred on 0).
    #[serde(default = "default_field_width")]
    pub width: f32,
    /// Field extent along Z (centred on 0). The gate sits on the max-Z edge.
    #[serde(default = "default_field_depth")]
    pub depth: f32,
    /// Gate opening width.
    #[serde(default = "default_gate_width")]
    pub gate_width: f32,
    /// Depth of the passage zone, centred on the gate line.
    #[serde(default = "default_gate_depth")]
    pub gate_depth: f32,
    #[serde(default = "default_pasture_width")]
    pub pasture_width: f32,
    #[serde(default = "default_pasture_depth")]
    pub pasture_depth: f32,
    /// Soft edge avoidance starts this far from an edge.
    #[serde(default = "default_edge_margin")]
    pub edge_margin: f32,
    /// Hard clamp inset from each edge.
    #[serde(default = "default_hard_margin")]
    pub hard_margin: f32,
}

impl Default for FieldLayout {
    fn default() -> Self {
        Self {
            width: default_field_width(),
            depth: default_field_depth(),
            gate_width: default_gate_width(),
            gate_depth: default_gate_depth(),
            pasture_width: default_pasture_width(),
            pasture_depth: default_pasture_depth(),
            edge_margin: default_edge_margin(),
            hard_margin: default_hard_margin(),
        }
    }
}

impl FieldLayout {
    pub fn bounds(&self) -> Bounds {
        Bounds::new(
            -self.width / 2.0,
            -self.depth / 2.0,
            self.width / 2.0,
            self.depth / 2.0,
        )
    }

    pub fn gate(&self) -> Gate {
        Gate::new(
            Vec2::new(0.0, self.depth / 2.0),
            self.gate_width,
            self.gate_depth,
        )
    }

    /// Pasture rectangle, starting where the passage zone ends.
    pub fn pasture(&self) -> Bounds {
        let start = self.depth / 2.0 + self.gate_depth / 2.0;
        Bounds::new(
            -self.pasture_width / 2.0,
            start,
            self.pasture_width / 2.0,
            start + self.pasture_depth,
        )
    }
}

fn default_field_width() -> f32 {
    100.0
}
fn default_field_depth() -> f32 {
    200.0
}
fn default_gate_width() -> f32 {
    8.0
}
fn default_gate_depth() -> f32 {
    4.0
}
fn default_pasture_width() -> f32 {
    40.0
}
fn default_pasture_depth() -> f32 {
    28.0
}
fn default_edge_margin() -> f32 {
    5.0
}
fn default_hard_margin() -> f32 {
    0.5
}

/// Sheep steering and motion. Speeds and forces are per tick (frame
/// integration).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SheepTuning {
    #[serde(default = "default_sheep_max_speed")]
    pub max_speed: f32,
    #[serde(default = "default_sheep_max_force")]
    pub max_force: f32,
    #[serde(default = "default_perception_radius")]
    pub perception_radius: f32,
    #[serde(default = "default_separation_distance")]
    pub separation_distance: f32,
    #[serde(default = "default_separation_weight")]
    pub separation_weight: f32,
    #[serde(default = "default_one")]
    pub alignment_weight: f32,
    #[serde(default = "default_one")]
    pub cohesion_weight: f32,
    /// Dogs closer than this scare the sheep.
    #[serde(default = "default_flee_radius")]
    pub flee_radius: f32,
    #[serde(default = "default_flee_weight")]
    pub flee_weight: f32,
    #[serde(default = "default_gate_attraction_weight")]
    pub gate_attraction_weight: f32,
    #[serde(default = "default_boundary_weight")]
    pub boundary_weight: f32,
    #[serde(default = "default_sheep_damping")]
    pub damping: f32,
    #[serde(default = "default_sheep_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_sheep_min_movement")]
    pub min_movement: f32,
    /// Top speed while walking to the retirement target.
    #[serde(default = "default_retire_speed")]
    pub retire_speed: f32,
    /// Top speed while grazing.
    #[serde(default = "default_graze_speed")]
    pub graze_speed: f32,
    /// Spawn cluster radius at round start.
    #[serde(default = "default_spawn_radius")]
    pub spawn_radius: f32,
    /// Spawn cluster centre Z.
    #[serde(default = "default_spawn_center_z")]
    pub spawn_center_z: f32,
}

impl Default for SheepTuning {
    fn default() -> Self {
        Self {
            max_speed: default_sheep_max_speed(),
            max_force: default_sheep_max_force(),
            perception_radius: default_perception_radius(),
            separation_distance: default_separation_distance(),
            separation_weight: default_separation_weight(),
            alignment_weight: default_one(),
            cohesion_weight: default_one(),
            flee_radius: default_flee_radius(),
            flee_weight: default_flee_weight(),
            gate_attraction_weight: default_gate_attraction_weight(),
            boundary_weight: default_boundary_weight(),
            damping: default_sheep_damping(),
            smoothing: default_sheep_smoothing(),
            min_movement: default_sheep_min_movement(),
            retire_speed: default_retire_speed(),
            graze_speed: default_graze_speed(),
            spawn_radius: default_spawn_radius(),
            spawn_center_z: default_spawn_center_z(),
        }
    }
}

impl SheepTuning {
    pub fn flock_params(&self) -> FlockParams {
        FlockParams {
            max_speed: self.max_speed,
            max_force: self.max_force,
            separation_distance: self.separation_distance,
            separation_weight: self.separation_weight,
            alignment_weight: self.alignment_weight,
            cohesion_weight: self.cohesion_weight,
        }
    }

    pub fn motion(&self) -> MotionParams {
        MotionParams {
            max_speed: self.max_speed,
            damping: self.damping,
            smoothing: self.smoothing,
            min_movement: self.min_movement,
        }
    }
}

fn default_sheep_max_speed() -> f32 {
    0.16
}
fn default_sheep_max_force() -> f32 {
    0.008
}
fn default_perception_radius() -> f32 {
    6.0
}
fn default_separation_distance() -> f32 {
    2.0
}
fn default_separation_weight() -> f32 {
    1.5
}
fn default_one() -> f32 {
    1.0
}
fn default_flee_radius() -> f32 {
    12.0
}
fn default_flee_weight() -> f32 {
    1.5
}
fn default_gate_attraction_weight() -> f32 {
    0.5
}
fn default_boundary_weight() -> f32 {
    2.0
}
fn default_sheep_damping() -> f32 {
    0.96
}
fn default_sheep_smoothing() -> f32 {
    0.3
}
fn default_sheep_min_movement() -> f32 {
    0.001
}
fn default_retire_speed() -> f32 {
    0.12
}
fn default_graze_speed() -> f32 {
    0.03
}
fn default_spawn_radius() -> f32 {
    15.0
}
fn default_spawn_center_z() -> f32 {
    -40.0
}

/// Sheepdog motion and stamina. Rates are per second (time-scaled
/// integration).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DogTuning {
    #[serde(default = "default_dog_max_speed")]
    pub max_speed: f32,
    #[serde(default = "default_dog_sprint_speed")]
    pub sprint_speed: f32,
    /// Acceleration applied along the input direction, units/s².
    #[serde(default = "default_dog_acceleration")]
    pub acceleration: f32,
    #[serde(default = "default_dog_damping")]
    pub damping: f32,
    #[serde(default = "default_dog_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_dog_min_movement")]
    pub min_movement: f32,
    #[serde(default = "default_max_stamina")]
    pub max_stamina: f32,
    /// Stamina drained per second of sprinting.
    #[serde(default = "default_stamina_drain")]
    pub stamina_drain: f32,
    /// Stamina regained per second while moving without sprinting. Doubled
    /// at rest.
    #[serde(default = "default_stamina_regen")]
    pub stamina_regen: f32,
    #[serde(default = "default_min_stamina_to_sprint")]
    pub min_stamina_to_sprint: f32,
    /// Fraction of the remaining heading error closed per tick.
    #[serde(default = "default_rotation_smoothing")]
    pub rotation_smoothing: f32,
    /// Farthest a client-reported rest position may be from the server's
    /// before it is ignored.
    #[serde(default = "default_max_client_correction")]
    pub max_client_correction: f32,
    /// Ticks allowed to converge onto a client rest position before snapping.
    #[serde(default = "default_client_converge_ticks")]
    pub client_converge_ticks: u32,
}

impl Default for DogTuning {
    fn default() -> Self {
        Self {
            max_speed: default_dog_max_speed(),
            sprint_speed: default_dog_sprint_speed(),
            acceleration: default_dog_acceleration(),
            damping: default_dog_damping(),
            smoothing: default_dog_smoothing(),
            min_movement: default_dog_min_movement(),
            max_stamina: default_max_stamina(),
            stamina_drain: default_stamina_drain(),
            stamina_regen: default_stamina_regen(),
            min_stamina_to_sprint: default_min_stamina_to_sprint(),
            rotation_smoothing: default_rotation_smoothing(),
            max_client_correction: default_max_client_correction(),
            client_converge_ticks: default_client_converge_ticks(),
        }
    }
}

impl DogTuning {
    /// Motion parameters for the current sprint state.
    pub fn motion(&self, sprinting: bool) -> MotionParams {
        MotionParams {
            max_speed: if sprinting {
                self.sprint_speed
            } else {
                self.max_speed
            },
            damping: self.damping,
            smoothing: self.smoothing,
            min_movement: self.min_movement,
        }
    }

    pub fn stamina(&self) -> StaminaParams {
        StaminaParams {
            max_stamina: self.max_stamina,
            drain_rate: self.stamina_drain,
            regen_rate: self.stamina_regen,
            min_to_sprint: self.min_stamina_to_sprint,
        }
    }
}

fn default_dog_max_speed() -> f32 {
    12.0
}
fn default_dog_sprint_speed() -> f32 {
    20.0
}
fn default_dog_acceleration() -> f32 {
    120.0
}
fn default_dog_damping() -> f32 {
    0.92
}
fn default_dog_smoothing() -> f32 {
    0.2
}
fn default_dog_min_movement() -> f32 {
    0.01
}
fn default_max_stamina() -> f32 {
    100.0
}
fn default_stamina_drain() -> f32 {
    25.0
}
fn default_stamina_regen() -> f32 {
    12.0
}
fn default_min_stamina_to_sprint() -> f32 {
    10.0
}
fn default_rotation_smoothing() -> f32 {
    0.25
}
fn default_max_client_correction() -> f32 {
    3.0
}
fn default_client_converge_ticks() -> u32 {
    6
}
