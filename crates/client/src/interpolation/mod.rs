// Snapshot interpolation for everything the client doesn't predict.
use glam::Vec2;
use protocol::{DogSnapshot, SheepSnapshot, Snapshot};
use sim::vector::lerp_angle;
use sim::PlayerId;

use crate::utils;

/// Interpolated position and heading of one entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec2,
    pub rotation: f32,
}

#[derive(Debug, Clone)]
struct Received {
    snapshot: Snapshot,
    at_ms: f64,
}

/// Keeps the two most recent snapshots and blends between them.
#[derive(Debug, Clone)]
pub struct InterpolationBuffer {
    previous: Option<Received>,
    latest: Option<Received>,
    expected_interval_ms: f64,
}

impl InterpolationBuffer {
    pub fn new(expected_interval_ms: f64) -> Self {
        Self {
            previous: None,
            latest: None,
            expected_interval_ms: expected_interval_ms.max(1.0),
        }
    }

    pub fn set_expected_interval(&mut self, interval_ms: f64) {
        self.expected_interval_ms = interval_ms.max(1.0);
    }

    pub fn clear(&mut self) {
        self.previous = None;
        self.latest = None;
    }

    /// Store a snapshot received at `now_ms`. Snapshots that are not newer
    /// than the latest one are ignored.
    pub fn push(&mut self, snapshot: Snapshot, now_ms: f64) -> bool {
        if let Some(latest) = &self.latest {
            if snapshot.tick <= latest.snapshot.tick {
                return false;
            }
        }
        self.previous = self.latest.take();
        self.latest = Some(Received {
            snapshot,
            at_ms: now_ms,
        });
        true
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.latest.as_ref().map(|r| &r.snapshot)
    }

    /// Blend factor from the previous snapshot to the latest one.
    pub fn alpha(&self, now_ms: f64) -> f32 {
        match (&self.previous, &self.latest) {
            (Some(_), Some(latest)) => {
                let t = (now_ms - latest.at_ms) / self.expected_interval_ms;
                utils::clamp(t as f32, 0.0, 1.0)
            }
            _ => 1.0,
        }
    }

    /// Every sheep in the latest snapshot, blended from where it was in the
    /// previous one.
    pub fn sheep(&self, now_ms: f64) -> Vec<(SheepSnapshot, Pose)> {
        let Some(latest) = &self.latest else {
            return Vec::new();
        };
        let alpha = self.alpha(now_ms);
        let previous = self.previous.as_ref().map(|r| &r.snapshot.sheep[..]).unwrap_or(&[]);

        latest
            .snapshot
            .sheep
            .iter()
            .enumerate()
            .map(|(i, to)| {
                let from = match previous.get(i) {
                    Some(s) if s.id == to.id => Some(s),
                    _ => previous.iter().find(|s| s.id == to.id),
                };
                let pose = blend(from.map(|s| (s.position, s.facing)), (to.position, to.facing), alpha);
                (*to, pose)
            })
            .collect()
    }

    /// Every dog except `skip`, blended the same way.
    pub fn dogs(&self, now_ms: f64, skip: Option<PlayerId>) -> Vec<(DogSnapshot, Pose)> {
        let Some(latest) = &self.latest else {
            return Vec::new();
        };
        let alpha = self.alpha(now_ms);

        latest
            .snapshot
            .dogs
            .iter()
            .filter(|d| Some(d.player_id) != skip)
            .map(|to| {
                let from = self
                    .previous
                    .as_ref()
                    .and_then(|r| r.snapshot.dog(to.player_id))
                    .map(|d| (d.position, d.rotation));
                (*to, blend(from, (to.position, to.rotation), alpha))
            })
            .collect()
    }
}

fn blend(from: Option<(Vec2, f32)>, to: (Vec2, f32), alpha: f32) -> Pose {
    match from {
        Some((position, rotation)) => Pose {
            position: position.lerp(to.0, alpha),
            rotation: lerp_angle(rotation, to.1, alpha),
        },
        None => Pose {
            position: to.0,
            rotation: to.1,
        },
    }
}
