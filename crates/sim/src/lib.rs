//! Deterministic herding simulation.
//!
//! Shared by the authoritative server and by client-side prediction:
//! - Steering forces and flocking
//! - Integration, stamina and numeric guards
//! - Field containment and gate passage
//! - Sheep retirement and round completion

pub mod behavior;
pub mod boundary;
pub mod flocking;
pub mod movement;
pub mod retirement;
pub mod spatial;
pub mod state;
pub mod tuning;
pub mod validation;
pub mod vector;
pub mod world;

use rand::SeedableRng;

pub use boundary::{Bounds, Gate};
pub use movement::{Body, FrameStep, MotionParams, StaminaParams, TimeScaled};
pub use retirement::{check_game_completion, CompletionCheck};
pub use state::{DogInput, DogMode, GameState, PlayerId, Sheep, SheepState, Sheepdog};
pub use tuning::{DogTuning, FieldLayout, SheepTuning};
pub use validation::{validate_state, Violation};
pub use vector::{quantize, quantize_vec, Steer};
pub use world::{StepReport, World};

/// Random source for everything that must replay identically from a seed.
pub type SimRng = rand_pcg::Pcg32;

pub fn seeded_rng(seed: u64) -> SimRng {
    SimRng::seed_from_u64(seed)
}
