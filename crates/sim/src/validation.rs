//! Read-only consistency checks over a [`GameState`].

use thiserror::Error;

use crate::state::{GameState, PlayerId};
use crate::vector::Steer;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error("sheep {id} has non-finite {field}")]
    NonFiniteSheep { id: u32, field: &'static str },

    #[error("sheepdog {id} has non-finite {field}")]
    NonFiniteDog { id: PlayerId, field: &'static str },

    #[error("sheepdog {id} stamina {stamina} outside [0, {max}]")]
    StaminaOutOfRange { id: PlayerId, stamina: f32, max: f32 },

    #[error("field bounds are malformed")]
    MalformedBounds,

    #[error("gate is malformed")]
    MalformedGate,

    #[error("pasture is malformed")]
    MalformedPasture,

    #[error("retired count {retired} exceeds flock size {total}")]
    RetiredCountOutOfRange { retired: usize, total: usize },
}

/// Collect every violation without touching the state.
pub fn validate_state(state: &GameState) -> Vec<Violation> {
    let mut violations = Vec::new();

    if !state.bounds.is_well_formed() {
        violations.push(Violation::MalformedBounds);
    }
    if !state.gate.is_well_formed() {
        violations.push(Violation::MalformedGate);
    }
    if !state.pasture.is_well_formed() {
        violations.push(Violation::MalformedPasture);
    }

    for sheep in &state.sheep {
        let body = &sheep.body;
        for (field, value) in [
            ("position", body.position),
            ("velocity", body.velocity),
            ("acceleration", body.acceleration),
        ] {
            if !value.is_sane() {
                violations.push(Violation::NonFiniteSheep { id: sheep.id, field });
            }
        }
    }

    for dog in state.dogs.values() {
        let body = &dog.body;
        for (field, value) in [
            ("position", body.position),
            ("velocity", body.velocity),
            ("acceleration", body.acceleration),
        ] {
            if !value.is_sane() {
                violations.push(Violation::NonFiniteDog { id: dog.id, field });
            }
        }
        if !(0.0..=dog.max_stamina).contains(&dog.stamina) {
            violations.push(Violation::StaminaOutOfRange {
                id: dog.id,
                stamina: dog.stamina,
                max: dog.max_stamina,
            });
        }
    }

    if state.sheep_retired > state.total_sheep() {
        violations.push(Violation::RetiredCountOutOfRange {
            retired: state.sheep_retired,
            total: state.total_sheep(),
        });
    }

    violations
}
