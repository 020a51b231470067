//! Per-entity tick behaviour for sheep and sheepdogs.

use glam::Vec2;

use crate::boundary::{avoidance_force, constrain, Bounds, Gate};
use crate::flocking::{flee, flock, seek, Neighbor};
use crate::movement::update_stamina;
use crate::state::{DogMode, Sheep, Sheepdog};
use crate::tuning::{DogTuning, SheepTuning};
use crate::vector::{lerp_angle, Steer};

/// Fraction of the remaining distance closed per tick while converging on a
/// client-reported rest position.
pub const CLIENT_CONVERGE_GAIN: f32 = 0.5;

/// Closer than this to the client target counts as arrived.
const CONVERGE_EPSILON: f32 = 0.01;

/// How quickly a sheep's facing follows its heading.
const SHEEP_TURN_RATE: f32 = 0.2;

/// Field geometry an active sheep reacts to.
#[derive(Debug, Clone, Copy)]
pub struct Surroundings<'a> {
    pub bounds: &'a Bounds,
    pub gate: &'a Gate,
    pub edge_margin: f32,
}

/// Whether `dog` stands on the far side of `sheep` from the gate, i.e. the
/// dog is pushing the sheep toward it.
pub fn dog_behind_sheep(dog: Vec2, sheep: Vec2, gate: Vec2) -> bool {
    let to_sheep = (sheep - dog).normalize_or_zero();
    let to_gate = (gate - dog).normalize_or_zero();
    to_sheep.dot(to_gate) < 0.0
}

/// Total steering force on an active sheep for this tick.
pub fn active_sheep_force(
    sheep: &Sheep,
    neighbors: &[Neighbor],
    dogs: &[Vec2],
    around: &Surroundings<'_>,
    tuning: &SheepTuning,
) -> Vec2 {
    let position = sheep.body.position;
    let velocity = sheep.body.velocity;
    let params = tuning.flock_params();

    let mut force = flock(position, velocity, neighbors, &params);

    let mut pressured = false;
    for &dog in dogs {
        let f = flee(position, velocity, dog, sheep.flee_radius, tuning.max_speed, tuning.max_force);
        if f != Vec2::ZERO {
            force += f * tuning.flee_weight;
        }
        if !pressured
            && dog.distance_squared(position) < sheep.flee_radius * sheep.flee_radius
            && dog_behind_sheep(dog, position, around.gate.center)
        {
            pressured = true;
        }
    }
    if pressured && tuning.gate_attraction_weight > 0.0 {
        force += seek(position, velocity, around.gate.center, tuning.max_speed, tuning.max_force)
            * tuning.gate_attraction_weight;
    }

    force
        + avoidance_force(
            position,
            around.bounds,
            around.gate,
            around.edge_margin,
            tuning.max_force * tuning.boundary_weight,
        )
}

/// Apply `force`, integrate one tick and contain an active sheep. Returns
/// `true` if the movement guard had to repair the body.
pub fn move_active_sheep(sheep: &mut Sheep, force: Vec2, around: &Surroundings<'_>, hard_margin: f32, tuning: &SheepTuning) -> bool {
    sheep.body.apply_force(force);
    sheep.body.integrate(&tuning.motion());
    constrain(&mut sheep.body, around.bounds, hard_margin, around.gate, true);
    let corrected = sheep.body.sanitize(around.bounds.center());
    turn_sheep(sheep, tuning.min_movement);
    corrected
}

/// Ease the render facing toward the direction of travel.
pub fn turn_sheep(sheep: &mut Sheep, min_movement: f32) {
    if sheep.body.speed() > min_movement {
        sheep.facing = lerp_angle(sheep.facing, sheep.body.velocity.heading(), SHEEP_TURN_RATE);
    }
}

/// One step for a sheepdog: stamina, acceleration from the held input,
/// time-scaled integration, rotation, then a hard clamp with no gate
/// exception. Dogs converging on a client position skip physics entirely.
///
/// Returns `true` if the movement guard had to repair the body.
pub fn step_sheepdog(dog: &mut Sheepdog, tuning: &DogTuning, bounds: &Bounds, hard_margin: f32, gate: &Gate, dt: f32) -> bool {
    match dog.mode {
        DogMode::InterpolatingToClient { target, ticks_left } => {
            dog.body.velocity = Vec2::ZERO;
            dog.body.acceleration = Vec2::ZERO;
            let next = dog.body.position.lerp(target, CLIENT_CONVERGE_GAIN);
            if ticks_left <= 1 || next.distance(target) < CONVERGE_EPSILON {
                dog.body.teleport(target);
                dog.mode = DogMode::Physics;
            } else {
                dog.body.teleport(next);
                dog.mode = DogMode::InterpolatingToClient {
                    target,
                    ticks_left: ticks_left - 1,
                };
            }
            let (stamina, sprinting) = update_stamina(dog.stamina, false, false, dt, &tuning.stamina());
            dog.stamina = stamina;
            dog.is_sprinting = sprinting;
        }
        DogMode::Physics => {
            let moving = dog.input.is_moving();
            let (stamina, sprinting) = update_stamina(dog.stamina, dog.input.sprint, moving, dt, &tuning.stamina());
            dog.stamina = stamina;
            dog.is_sprinting = sprinting;

            dog.body.acceleration = dog.input.direction * tuning.acceleration;
            dog.body.integrate(&tuning.motion(sprinting), dt);

            if dog.body.speed() > tuning.min_movement {
                dog.rotation = lerp_angle(dog.rotation, dog.body.velocity.heading(), tuning.rotation_smoothing);
            }
        }
    }

    constrain(&mut dog.body, bounds, hard_margin, gate, false);
    let corrected = dog.body.sanitize(bounds.center());
    if !dog.stamina.is_finite() {
        dog.stamina = 0.0;
        dog.is_sprinting = false;
        return true;
    }
    corrected
}
