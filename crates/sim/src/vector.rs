//! 2D vector helpers for steering math.
//!
//! The simulation runs on the ground plane. Positions use `glam::Vec2`,
//! where `x` is world X and `y` carries world Z (the vertical axis only
//! exists in the renderer).

use glam::Vec2;
use std::f32::consts::{PI, TAU};

/// Steering-oriented operations on top of `glam::Vec2`.
pub trait Steer {
    /// Clamp the magnitude to at most `max`.
    fn limit(self, max: f32) -> Self;

    /// Rescale to length `magnitude` (zero stays zero).
    fn with_magnitude(self, magnitude: f32) -> Self;

    /// Heading angle around the vertical axis, `atan2(x, z)`.
    fn heading(self) -> f32;

    /// Both components are finite.
    fn is_sane(self) -> bool;
}

impl Steer for Vec2 {
    #[inline]
    fn limit(self, max: f32) -> Self {
        let len_sq = self.length_squared();
        if len_sq > max * max && len_sq > 0.0 {
            self * (max / len_sq.sqrt())
        } else {
            self
        }
    }

    #[inline]
    fn with_magnitude(self, magnitude: f32) -> Self {
        self.normalize_or_zero() * magnitude
    }

    #[inline]
    fn heading(self) -> f32 {
        self.x.atan2(self.y)
    }

    #[inline]
    fn is_sane(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Wrap an angle into `(-PI, PI]`.
#[inline]
pub fn wrap_angle(angle: f32) -> f32 {
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a <= -PI {
        a += TAU;
    }
    a
}

/// Interpolate between two angles along the shortest arc.
#[inline]
pub fn lerp_angle(from: f32, to: f32, t: f32) -> f32 {
    wrap_angle(from + wrap_angle(to - from) * t)
}

/// Round to two decimal places. Snapshots apply this to every position and
/// velocity, and clients must run the identical transform.
#[inline]
pub fn quantize(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

#[inline]
pub fn quantize_vec(v: Vec2) -> Vec2 {
    Vec2::new(quantize(v.x), quantize(v.y))
}
