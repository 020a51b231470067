//! Reynolds-style steering forces.
//!
//! All functions are pure: they take one agent's position and velocity plus
//! neighbours already filtered to the perception radius, and return a force.

use glam::Vec2;

use crate::vector::Steer;

/// Steering limits and rule weights for one agent type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlockParams {
    pub max_speed: f32,
    pub max_force: f32,
    pub separation_distance: f32,
    pub separation_weight: f32,
    pub alignment_weight: f32,
    pub cohesion_weight: f32,
}

/// Position and velocity of a neighbouring agent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: Vec2,
    pub velocity: Vec2,
}

/// Push away from neighbours closer than `separation_distance`, closer ones
/// harder.
pub fn separation(position: Vec2, velocity: Vec2, neighbors: &[Neighbor], params: &FlockParams) -> Vec2 {
    let mut sum = Vec2::ZERO;
    let mut count = 0u32;

    for other in neighbors {
        let offset = position - other.position;
        let distance = offset.length();
        if distance > 0.0 && distance < params.separation_distance {
            sum += offset.normalize_or_zero() / distance;
            count += 1;
        }
    }

    if count == 0 {
        return Vec2::ZERO;
    }

    let desired = (sum / count as f32).with_magnitude(params.max_speed);
    if desired == Vec2::ZERO {
        return Vec2::ZERO;
    }
    (desired - velocity).limit(params.max_force)
}

/// Steer toward the average heading of the neighbours.
pub fn alignment(velocity: Vec2, neighbors: &[Neighbor], params: &FlockParams) -> Vec2 {
    if neighbors.is_empty() {
        return Vec2::ZERO;
    }

    let sum: Vec2 = neighbors.iter().map(|n| n.velocity).sum();
    let desired = (sum / neighbors.len() as f32).with_magnitude(params.max_speed);
    if desired == Vec2::ZERO {
        return Vec2::ZERO;
    }
    (desired - velocity).limit(params.max_force)
}

/// Steer toward the centroid of the neighbours.
pub fn cohesion(position: Vec2, velocity: Vec2, neighbors: &[Neighbor], params: &FlockParams) -> Vec2 {
    if neighbors.is_empty() {
        return Vec2::ZERO;
    }

    let sum: Vec2 = neighbors.iter().map(|n| n.position).sum();
    let centroid = sum / neighbors.len() as f32;
    seek(position, velocity, centroid, params.max_speed, params.max_force)
}

/// Classic seek: full speed toward `target`, limited to `max_force`.
pub fn seek(position: Vec2, velocity: Vec2, target: Vec2, max_speed: f32, max_force: f32) -> Vec2 {
    let desired = (target - position).with_magnitude(max_speed);
    (desired - velocity).limit(max_force)
}

/// Run from `threat` if it is within `radius`. The force limit is twice the
/// normal one so the reaction reads as urgent.
pub fn flee(
    position: Vec2,
    velocity: Vec2,
    threat: Vec2,
    radius: f32,
    max_speed: f32,
    max_force: f32,
) -> Vec2 {
    let away = position - threat;
    if away.length_squared() >= radius * radius {
        return Vec2::ZERO;
    }
    let desired = away.with_magnitude(max_speed);
    (desired - velocity).limit(max_force * 2.0)
}

/// Weighted sum of separation, alignment and cohesion.
pub fn flock(position: Vec2, velocity: Vec2, neighbors: &[Neighbor], params: &FlockParams) -> Vec2 {
    if neighbors.is_empty() {
        return Vec2::ZERO;
    }
    separation(position, velocity, neighbors, params) * params.separation_weight
        + alignment(velocity, neighbors, params) * params.alignment_weight
        + cohesion(position, velocity, neighbors, params) * params.cohesion_weight
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> FlockParams {
        FlockParams {
            max_speed: 1.0,
            max_force: 0.1,
            separation_distance: 2.0,
            separation_weight: 1.5,
            alignment_weight: 1.0,
            cohesion_weight: 1.0,
        }
    }

    fn at(x: f32, z: f32) -> Neighbor {
        Neighbor {
            position: Vec2::new(x, z),
            velocity: Vec2::ZERO,
        }
    }

    #[test]
    fn test_no_neighbors_is_zero() {
        let p = params();
        assert_eq!(flock(Vec2::ZERO, Vec2::ZERO, &[], &p), Vec2::ZERO);
        assert_eq!(alignment(Vec2::ZERO, &[], &p), Vec2::ZERO);
        assert_eq!(cohesion(Vec2::ZERO, Vec2::ZERO, &[], &p), Vec2::ZERO);
        assert_eq!(separation(Vec2::ZERO, Vec2::ZERO, &[], &p), Vec2::ZERO);
    }

    #[test]
    fn test_separation_pushes_away() {
        let force = separation(Vec2::ZERO, Vec2::ZERO, &[at(1.0, 0.0)], &params());
        assert!(force.x < 0.0);
        assert!(force.length() <= 0.1 + 1e-6);
    }

    #[test]
    fn test_separation_ignores_distant_and_coincident() {
        let p = params();
        assert_eq!(separation(Vec2::ZERO, Vec2::ZERO, &[at(5.0, 0.0)], &p), Vec2::ZERO);
        assert_eq!(separation(Vec2::ZERO, Vec2::ZERO, &[at(0.0, 0.0)], &p), Vec2::ZERO);
    }

    #[test]
    fn test_single_neighbor_alignment_follows_its_heading() {
        let n = Neighbor {
            position: Vec2::new(3.0, 0.0),
            velocity: Vec2::new(0.0, 0.5),
        };
        let force = alignment(Vec2::ZERO, &[n], &params());
        assert!(force.y > 0.0);
        assert!(force.x.abs() < 1e-6);
    }

    #[test]
    fn test_cohesion_moves_toward_centroid() {
        let force = cohesion(Vec2::ZERO, Vec2::ZERO, &[at(4.0, 0.0), at(4.0, 4.0)], &params());
        assert!(force.x > 0.0 && force.y > 0.0);
    }

    #[test]
    fn test_flee_only_inside_radius_with_double_force() {
        let far = flee(Vec2::ZERO, Vec2::ZERO, Vec2::new(20.0, 0.0), 10.0, 1.0, 0.1);
        assert_eq!(far, Vec2::ZERO);

        let near = flee(Vec2::ZERO, Vec2::ZERO, Vec2::new(3.0, 0.0), 10.0, 1.0, 0.1);
        assert!(near.x < 0.0);
        assert!((near.length() - 0.2).abs() < 1e-6);
    }
}
