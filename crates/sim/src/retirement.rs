//! Gate passage, the walk to the pasture and round completion.

use glam::Vec2;
use rand::Rng;

use crate::boundary::{clamp_into, containment_force, Bounds, Gate};
use crate::flocking::seek;
use crate::state::{GameState, Sheep, SheepState};
use crate::tuning::SheepTuning;
use crate::SimRng;

/// A retiring sheep this close to its target starts grazing.
pub const GRAZE_DISTANCE: f32 = 2.0;

/// Margin kept between retirement targets and the pasture fence.
const TARGET_MARGIN: f32 = 3.0;

/// Random spot in the pasture, away from the fence.
pub fn pick_retirement_target(pasture: &Bounds, rng: &mut SimRng) -> Vec2 {
    let area = pasture.inset(TARGET_MARGIN);
    if !area.is_well_formed() {
        return pasture.center();
    }
    Vec2::new(
        rng.random_range(area.min_x..area.max_x),
        rng.random_range(area.min_z..area.max_z),
    )
}

/// Active → Retiring. The passage flag is sticky for the rest of the match.
pub fn begin_retirement(sheep: &mut Sheep, target: Vec2) {
    sheep.has_passed_gate = true;
    sheep.is_retiring = true;
    sheep.state = SheepState::Retiring;
    sheep.retirement_target = Some(target);
}

/// One tick of the walk to the retirement target.
///
/// Inside the field side of the gate the sheep is held to the gate corridor;
/// past it, to the pasture. Returns `true` on the tick it starts grazing.
pub fn update_retiring(sheep: &mut Sheep, gate: &Gate, pasture: &Bounds, tuning: &SheepTuning) -> bool {
    let Some(target) = sheep.retirement_target else {
        sheep.state = SheepState::Grazing;
        sheep.is_retiring = false;
        return true;
    };

    let force = seek(
        sheep.body.position,
        sheep.body.velocity,
        target,
        tuning.retire_speed,
        tuning.max_force * 2.0,
    );
    sheep.body.apply_force(force);

    let mut motion = tuning.motion();
    motion.max_speed = tuning.retire_speed;
    sheep.body.integrate(&motion);

    if sheep.body.position.y < pasture.min_z {
        let corridor = Bounds::new(gate.zone.min_x, gate.zone.min_z, gate.zone.max_x, pasture.min_z);
        clamp_into(&mut sheep.body, &corridor);
    } else {
        clamp_into(&mut sheep.body, pasture);
    }

    if sheep.body.position.distance(target) < GRAZE_DISTANCE {
        sheep.state = SheepState::Grazing;
        sheep.is_retiring = false;
        sheep.retirement_target = None;
        return true;
    }
    false
}

/// One tick of grazing: a gentle push off the fence and heavy damping.
pub fn update_grazing(sheep: &mut Sheep, pasture: &Bounds, tuning: &SheepTuning) {
    let force = containment_force(sheep.body.position, pasture, TARGET_MARGIN, tuning.max_force);
    sheep.body.apply_force(force);

    let mut motion = tuning.motion();
    motion.max_speed = tuning.graze_speed;
    motion.damping *= 0.9;
    sheep.body.integrate(&motion);
    clamp_into(&mut sheep.body, pasture);
}

/// Sheep that have passed the gate, whatever their current state.
pub fn count_retired(sheep: &[Sheep]) -> usize {
    sheep.iter().filter(|s| s.has_passed_gate).count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionCheck {
    pub is_complete: bool,
    pub sheep_retired: usize,
    pub total_sheep: usize,
}

/// Complete when a running round has every sheep through the gate. An empty
/// flock never completes.
pub fn check_game_completion(state: &GameState) -> CompletionCheck {
    let total_sheep = state.total_sheep();
    let sheep_retired = count_retired(&state.sheep);
    CompletionCheck {
        is_complete: state.game_active && total_sheep > 0 && sheep_retired == total_sheep,
        sheep_retired,
        total_sheep,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seeded_rng;
    use crate::tuning::FieldLayout;

    fn state_with(count: usize) -> GameState {
        let mut state = GameState::new(&FieldLayout::default());
        for id in 0..count {
            state.sheep.push(Sheep::new(id as u32, Vec2::new(id as f32, 0.0), 12.0));
        }
        state
    }

    #[test]
    fn test_all_passed_completes() {
        let mut state = state_with(3);
        state.game_active = true;
        for sheep in &mut state.sheep {
            sheep.has_passed_gate = true;
        }
        let check = check_game_completion(&state);
        assert!(check.is_complete);
        assert_eq!(check.sheep_retired, 3);
        assert_eq!(check.total_sheep, 3);
    }

    #[test]
    fn test_incomplete_or_inactive_does_not_complete() {
        let mut state = state_with(3);
        state.game_active = true;
        state.sheep[0].has_passed_gate = true;
        assert!(!check_game_completion(&state).is_complete);

        for sheep in &mut state.sheep {
            sheep.has_passed_gate = true;
        }
        state.game_active = false;
        assert!(!check_game_completion(&state).is_complete);
    }

    #[test]
    fn test_empty_flock_never_completes() {
        let mut state = state_with(0);
        state.game_active = true;
        assert!(!check_game_completion(&state).is_complete);
    }

    #[test]
    fn test_retiring_sheep_settles_near_target() {
        let layout = FieldLayout::default();
        let gate = layout.gate();
        let pasture = layout.pasture();
        let tuning = SheepTuning::default();

        let mut sheep = Sheep::new(0, Vec2::new(0.0, 100.0), 12.0);
        sheep.body.velocity = Vec2::new(0.0, 0.1);
        begin_retirement(&mut sheep, Vec2::new(0.0, 110.0));

        let mut settled = false;
        for _ in 0..2_000 {
            if update_retiring(&mut sheep, &gate, &pasture, &tuning) {
                settled = true;
                break;
            }
        }
        assert!(settled);
        assert_eq!(sheep.state, SheepState::Grazing);
        assert!(sheep.retirement_target.is_none());
        assert!(sheep.has_passed_gate);
    }

    #[test]
    fn test_target_lies_inside_pasture() {
        let pasture = FieldLayout::default().pasture();
        let mut rng = seeded_rng(3);
        for _ in 0..100 {
            let target = pick_retirement_target(&pasture, &mut rng);
            assert!(pasture.inset(TARGET_MARGIN).contains(target));
        }
    }

    #[test]
    fn test_grazing_stays_in_pasture() {
        let pasture = FieldLayout::default().pasture();
        let tuning = SheepTuning::default();
        let mut sheep = Sheep::new(0, Vec2::new(19.9, 129.9), 12.0);
        sheep.state = SheepState::Grazing;
        sheep.body.velocity = Vec2::new(0.5, 0.5);
        for _ in 0..100 {
            update_grazing(&mut sheep, &pasture, &tuning);
            assert!(pasture.contains(sheep.body.position));
        }
    }
}
