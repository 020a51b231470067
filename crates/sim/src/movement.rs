//! Velocity integration, stamina and numeric guards.
//!
//! Two integration styles exist and each entity kind is locked to one of
//! them through the body's type parameter:
//!
//! - [`FrameStep`]: `position += velocity`, one step per fixed tick. Sheep.
//! - [`TimeScaled`]: `position += velocity * dt`, rates in units/second.
//!   Sheepdogs.
//!
//! Server and client call the same functions, so a given entity kind
//! produces the same trajectory on both sides.

use glam::Vec2;
use std::marker::PhantomData;

use crate::vector::Steer;

/// Per-tick integration; velocity is in units per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStep;

/// Δt-scaled integration; velocity is in units per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeScaled;

/// Limits for one velocity update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionParams {
    pub max_speed: f32,
    /// Multiplier (< 1) applied after clamping.
    pub damping: f32,
    /// Weight of the previous velocity in the final blend.
    pub smoothing: f32,
    /// Below this speed the body comes to rest instead of drifting.
    pub min_movement: f32,
}

/// Kinematic state of one entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body<S> {
    pub position: Vec2,
    pub velocity: Vec2,
    pub acceleration: Vec2,
    /// Last position that passed the finite check.
    last_good_position: Vec2,
    _style: PhantomData<S>,
}

impl<S> Body<S> {
    pub fn new(position: Vec2) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            acceleration: Vec2::ZERO,
            last_good_position: position,
            _style: PhantomData,
        }
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    /// Accumulate an external force for the next integration.
    #[inline]
    pub fn apply_force(&mut self, force: Vec2) {
        self.acceleration += force;
    }

    #[inline]
    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    /// Place the body somewhere without integrating (spawn, snap).
    pub fn teleport(&mut self, position: Vec2) {
        self.position = position;
        self.last_good_position = position;
    }

    /// Replace non-finite components with safe values.
    ///
    /// Acceleration and velocity are zeroed when corrupted; a corrupted
    /// position falls back to the last finite one, or `fallback` when even
    /// that is unusable. Returns `true` when anything was corrected.
    pub fn sanitize(&mut self, fallback: Vec2) -> bool {
        let mut corrected = false;
        if !self.acceleration.is_sane() {
            self.acceleration = Vec2::ZERO;
            corrected = true;
        }
        if !self.velocity.is_sane() {
            self.velocity = Vec2::ZERO;
            corrected = true;
        }
        if !self.position.is_sane() {
            self.position = if self.last_good_position.is_sane() {
                self.last_good_position
            } else {
                fallback
            };
            self.velocity = Vec2::ZERO;
            corrected = true;
        }
        self.last_good_position = self.position;
        corrected
    }

    /// Shared velocity update. `scale` is 1 for frame bodies and Δt for
    /// time-scaled ones. Returns `true` when the body should move.
    fn advance_velocity(&mut self, params: &MotionParams, scale: f32) -> bool {
        let previous = self.velocity;
        let mut velocity = self.velocity + self.acceleration * scale;
        velocity = velocity.limit(params.max_speed);
        velocity *= params.damping;
        velocity = previous * params.smoothing + velocity * (1.0 - params.smoothing);
        self.acceleration = Vec2::ZERO;

        if velocity.length() > params.min_movement {
            self.velocity = velocity;
            true
        } else {
            self.velocity = Vec2::ZERO;
            false
        }
    }
}

impl Body<FrameStep> {
    /// One fixed tick; the tick itself is the time unit.
    pub fn integrate(&mut self, params: &MotionParams) {
        if self.advance_velocity(params, 1.0) {
            self.position += self.velocity;
        }
    }
}

impl Body<TimeScaled> {
    /// Advance by `dt` seconds.
    pub fn integrate(&mut self, params: &MotionParams, dt: f32) {
        if self.advance_velocity(params, dt) {
            self.position += self.velocity * dt;
        }
    }
}

/// Stamina bookkeeping inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaminaParams {
    pub max_stamina: f32,
    pub drain_rate: f32,
    pub regen_rate: f32,
    pub min_to_sprint: f32,
}

/// Resolve the sprint flag and update stamina for one step.
///
/// Sprinting needs a request, movement and at least `min_to_sprint`
/// stamina. Stamina drains only while sprinting and regenerates otherwise,
/// twice as fast at rest. Returns the new `(stamina, is_sprinting)`.
pub fn update_stamina(
    stamina: f32,
    sprint_requested: bool,
    moving: bool,
    dt: f32,
    params: &StaminaParams,
) -> (f32, bool) {
    let mut sprinting = sprint_requested && moving && stamina >= params.min_to_sprint;

    let stamina = if sprinting {
        (stamina - params.drain_rate * dt).max(0.0)
    } else {
        let rate = if moving {
            params.regen_rate
        } else {
            params.regen_rate * 2.0
        };
        (stamina + rate * dt).min(params.max_stamina)
    };

    if stamina < params.min_to_sprint {
        sprinting = false;
    }
    (stamina, sprinting)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheep_params() -> MotionParams {
        MotionParams {
            max_speed: 0.16,
            damping: 0.96,
            smoothing: 0.3,
            min_movement: 0.001,
        }
    }

    fn stamina_params() -> StaminaParams {
        StaminaParams {
            max_stamina: 100.0,
            drain_rate: 25.0,
            regen_rate: 12.0,
            min_to_sprint: 10.0,
        }
    }

    #[test]
    fn test_frame_integration_ignores_dt() {
        let mut body: Body<FrameStep> = Body::new(Vec2::ZERO);
        body.apply_force(Vec2::new(0.1, 0.0));
        body.integrate(&sheep_params());

        // v = 0.1 * 0.96 * 0.7
        let expected = 0.1 * 0.96 * 0.7;
        assert!((body.velocity.x - expected).abs() < 1e-6);
        assert!((body.position.x - expected).abs() < 1e-6);
        assert_eq!(body.acceleration, Vec2::ZERO);
    }

    #[test]
    fn test_time_scaled_integration_multiplies_dt() {
        let params = MotionParams {
            max_speed: 12.0,
            damping: 1.0,
            smoothing: 0.0,
            min_movement: 0.01,
        };
        let mut body: Body<TimeScaled> = Body::new(Vec2::ZERO);
        body.apply_force(Vec2::new(60.0, 0.0));
        body.integrate(&params, 0.5);
        // v = 60 * 0.5 = 30 -> clamped to 12, position += 12 * 0.5
        assert!((body.velocity.x - 12.0).abs() < 1e-5);
        assert!((body.position.x - 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_micro_drift_is_suppressed() {
        let mut body: Body<FrameStep> = Body::new(Vec2::new(1.0, 1.0)).with_velocity(Vec2::new(0.0005, 0.0));
        body.integrate(&sheep_params());
        assert_eq!(body.position, Vec2::new(1.0, 1.0));
        assert_eq!(body.velocity, Vec2::ZERO);
    }

    #[test]
    fn test_sanitize_restores_last_good_position() {
        let mut body: Body<FrameStep> = Body::new(Vec2::new(3.0, 4.0));
        body.position = Vec2::new(f32::NAN, 0.0);
        body.velocity = Vec2::new(f32::INFINITY, 0.0);
        assert!(body.sanitize(Vec2::ZERO));
        assert_eq!(body.position, Vec2::new(3.0, 4.0));
        assert_eq!(body.velocity, Vec2::ZERO);
        assert!(!body.sanitize(Vec2::ZERO));
    }

    #[test]
    fn test_stamina_exhaustion_blocks_sprint() {
        let (stamina, sprinting) = update_stamina(5.0, true, true, 1.0 / 60.0, &stamina_params());
        assert!(!sprinting);
        assert!(stamina > 5.0);
    }

    #[test]
    fn test_stamina_drains_only_when_sprinting_and_moving() {
        let p = stamina_params();
        let (s, sprinting) = update_stamina(50.0, true, true, 1.0, &p);
        assert!(sprinting);
        assert_eq!(s, 25.0);

        let (s, sprinting) = update_stamina(50.0, true, false, 1.0, &p);
        assert!(!sprinting);
        assert_eq!(s, 74.0);

        let (s, _) = update_stamina(50.0, false, true, 1.0, &p);
        assert_eq!(s, 62.0);
    }

    #[test]
    fn test_sprint_cut_when_stamina_hits_zero() {
        let (s, sprinting) = update_stamina(12.0, true, true, 1.0, &stamina_params());
        assert_eq!(s, 0.0);
        assert!(!sprinting);
    }
}
