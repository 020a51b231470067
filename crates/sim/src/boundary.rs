//! Field edges, the gate and containment.

use glam::Vec2;

use crate::movement::Body;

/// Axis-aligned rectangle on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub min_x: f32,
    pub min_z: f32,
    pub max_x: f32,
    pub max_z: f32,
}

impl Bounds {
    pub const fn new(min_x: f32, min_z: f32, max_x: f32, max_z: f32) -> Self {
        Self {
            min_x,
            min_z,
            max_x,
            max_z,
        }
    }

    #[inline]
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_z && p.y <= self.max_z
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    #[inline]
    pub fn depth(&self) -> f32 {
        self.max_z - self.min_z
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_z + self.max_z) / 2.0,
        )
    }

    /// Shrink by `margin` on every side.
    pub fn inset(&self, margin: f32) -> Self {
        Self::new(
            self.min_x + margin,
            self.min_z + margin,
            self.max_x - margin,
            self.max_z - margin,
        )
    }

    /// Finite and non-empty.
    pub fn is_well_formed(&self) -> bool {
        [self.min_x, self.min_z, self.max_x, self.max_z]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x < self.max_x
            && self.min_z < self.max_z
    }

    #[inline]
    pub fn clamp(&self, p: Vec2) -> Vec2 {
        Vec2::new(p.x.clamp(self.min_x, self.max_x), p.y.clamp(self.min_z, self.max_z))
    }
}

/// The single legal exit, on the field's max-Z edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gate {
    pub center: Vec2,
    pub width: f32,
    /// Unit vector pointing out of the field, through the gate.
    pub forward: Vec2,
    /// Rectangle in which a sheep counts as passing through.
    pub zone: Bounds,
}

impl Gate {
    /// Gate on a max-Z edge, passage zone `depth` deep centred on the gate
    /// line.
    pub fn new(center: Vec2, width: f32, depth: f32) -> Self {
        let half_w = width / 2.0;
        let half_d = depth / 2.0;
        Self {
            center,
            width,
            forward: Vec2::new(0.0, 1.0),
            zone: Bounds::new(
                center.x - half_w,
                center.y - half_d,
                center.x + half_w,
                center.y + half_d,
            ),
        }
    }

    /// Whether `x` lies within the gate opening.
    #[inline]
    pub fn spans(&self, x: f32) -> bool {
        (x - self.center.x).abs() < self.width / 2.0
    }

    pub fn is_well_formed(&self) -> bool {
        self.center.x.is_finite()
            && self.center.y.is_finite()
            && self.width.is_finite()
            && self.width > 0.0
            && self.zone.is_well_formed()
            && (self.forward.length() - 1.0).abs() < 1e-3
    }
}

#[inline]
pub fn in_passage_zone(position: Vec2, gate: &Gate) -> bool {
    gate.zone.contains(position)
}

/// A sheep passes the gate only while inside the zone and moving forward
/// through it. Drifting backward into the zone does not count.
#[inline]
pub fn detect_gate_passage(position: Vec2, velocity: Vec2, gate: &Gate) -> bool {
    in_passage_zone(position, gate) && velocity.dot(gate.forward) > 0.0
}

/// Inward push near the edges, proportional to how deep into the margin
/// the agent is. The max-Z edge is left alone across the gate opening.
pub fn avoidance_force(position: Vec2, bounds: &Bounds, gate: &Gate, margin: f32, strength: f32) -> Vec2 {
    edge_push(position, bounds, margin, !gate.spans(position.x)) * strength
}

/// Same as [`avoidance_force`] for a closed area with no opening.
pub fn containment_force(position: Vec2, area: &Bounds, margin: f32, strength: f32) -> Vec2 {
    edge_push(position, area, margin, true) * strength
}

fn edge_push(position: Vec2, bounds: &Bounds, margin: f32, include_max_z: bool) -> Vec2 {
    if margin <= 0.0 {
        return Vec2::ZERO;
    }
    let mut force = Vec2::ZERO;

    let d = position.x - bounds.min_x;
    if d < margin {
        force.x += (margin - d) / margin;
    }
    let d = bounds.max_x - position.x;
    if d < margin {
        force.x -= (margin - d) / margin;
    }
    let d = position.y - bounds.min_z;
    if d < margin {
        force.y += (margin - d) / margin;
    }
    let d = bounds.max_z - position.y;
    if include_max_z && d < margin {
        force.y -= (margin - d) / margin;
    }
    force
}

/// Hard clamp after integration.
///
/// With `allow_gate_passage` and the body inside the passage zone, only the
/// cross axis is clamped (to the gate opening) so the body can move through.
/// Clamping an axis cancels the velocity pushing out along it.
pub fn constrain<S>(body: &mut Body<S>, bounds: &Bounds, hard_margin: f32, gate: &Gate, allow_gate_passage: bool) {
    if allow_gate_passage && in_passage_zone(body.position, gate) {
        let clamped = body.position.x.clamp(gate.zone.min_x, gate.zone.max_x);
        if clamped != body.position.x {
            body.position.x = clamped;
            body.velocity.x = 0.0;
        }
        return;
    }
    clamp_into(body, &bounds.inset(hard_margin));
}

/// Clamp a body into `area`, cancelling outward velocity.
pub fn clamp_into<S>(body: &mut Body<S>, area: &Bounds) {
    let p = body.position;
    let clamped = area.clamp(p);
    if clamped.x != p.x {
        body.velocity.x = 0.0;
    }
    if clamped.y != p.y {
        body.velocity.y = 0.0;
    }
    body.position = clamped;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::FrameStep;

    fn field() -> (Bounds, Gate) {
        (
            Bounds::new(-50.0, -100.0, 50.0, 100.0),
            Gate::new(Vec2::new(0.0, 100.0), 8.0, 4.0),
        )
    }

    #[test]
    fn test_avoidance_pushes_inward() {
        let (bounds, gate) = field();
        let f = avoidance_force(Vec2::new(-49.0, 0.0), &bounds, &gate, 5.0, 1.0);
        assert!(f.x > 0.0);
        assert!((f.x - 0.8).abs() < 1e-5);

        let f = avoidance_force(Vec2::new(0.0, 0.0), &bounds, &gate, 5.0, 1.0);
        assert_eq!(f, Vec2::ZERO);
    }

    #[test]
    fn test_gate_edge_exempt_across_opening() {
        let (bounds, gate) = field();
        let at_gate = avoidance_force(Vec2::new(1.0, 98.0), &bounds, &gate, 5.0, 1.0);
        assert_eq!(at_gate.y, 0.0);

        let beside_gate = avoidance_force(Vec2::new(10.0, 98.0), &bounds, &gate, 5.0, 1.0);
        assert!(beside_gate.y < 0.0);
    }

    #[test]
    fn test_containment_has_no_opening() {
        let pasture = Bounds::new(-20.0, 102.0, 20.0, 130.0);
        let f = containment_force(Vec2::new(0.0, 129.0), &pasture, 3.0, 1.0);
        assert!(f.y < 0.0);
    }

    #[test]
    fn test_constrain_clamps_outside_zone() {
        let (bounds, gate) = field();
        let mut body: Body<FrameStep> = Body::new(Vec2::new(60.0, 101.0)).with_velocity(Vec2::new(1.0, 1.0));
        constrain(&mut body, &bounds, 0.5, &gate, true);
        assert_eq!(body.position, Vec2::new(49.5, 99.5));
        assert_eq!(body.velocity, Vec2::ZERO);
    }

    #[test]
    fn test_constrain_lets_sheep_through_gate() {
        let (bounds, gate) = field();
        let mut body: Body<FrameStep> = Body::new(Vec2::new(1.0, 101.0)).with_velocity(Vec2::new(0.0, 0.2));
        constrain(&mut body, &bounds, 0.5, &gate, true);
        assert_eq!(body.position, Vec2::new(1.0, 101.0));

        let mut dog: Body<FrameStep> = Body::new(Vec2::new(1.0, 101.0));
        constrain(&mut dog, &bounds, 0.5, &gate, false);
        assert_eq!(dog.position.y, 99.5);
    }

    #[test]
    fn test_passage_requires_forward_motion() {
        let (_, gate) = field();
        assert!(detect_gate_passage(Vec2::new(0.0, 99.0), Vec2::new(0.0, 0.1), &gate));
        assert!(!detect_gate_passage(Vec2::new(0.0, 99.0), Vec2::new(0.0, -0.1), &gate));
        assert!(!detect_gate_passage(Vec2::new(6.0, 99.0), Vec2::new(0.0, 0.1), &gate));
    }
}
