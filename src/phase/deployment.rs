//! Deployment phase.
//!
//! Players alternate placing one unit at a time inside their own zone.
//! The active player may end deployment early; units not yet placed stay
//! in reserve.

use tracing::debug;

use crate::board::{
    Action, ChangeSet, ExecutionResult, GameState, ModelPlacement, Phase, Player, Point, UnitId, UnitStatus,
};
use crate::dice::DiceRoller;
use crate::error::StateError;

use super::spatial;
use super::validation::{Checks, ValidationResult};
use super::{actor, check_end_phase, process_end_phase, wrong_phase, PhaseRules, RulesContext};

/// Anchor points tried inside a zone, as fractions of its bounding box.
const ANCHORS: [(f64, f64); 6] = [(0.5, 0.5), (0.25, 0.5), (0.75, 0.5), (0.5, 0.25), (0.5, 0.75), (0.15, 0.15)];

pub struct DeploymentPhase;

fn undeployed_remaining(state: &GameState, player: Player) -> bool {
    state
        .units_of(player)
        .any(|u| u.status == UnitStatus::Undeployed && u.models.iter().any(|m| m.alive))
}

impl DeploymentPhase {
    fn validate_deploy(
        &self,
        state: &GameState,
        ctx: &RulesContext,
        unit_id: &UnitId,
        placements: &[ModelPlacement],
    ) -> ValidationResult {
        let unit = match actor(state, unit_id) {
            Ok(u) => u,
            Err(v) => return v,
        };
        let mut checks = Checks::new();
        checks.require(unit.owner == state.active_player, || {
            format!(
                "unit '{}' belongs to {}, but {} is deploying",
                unit.id, unit.owner, state.active_player
            )
        });
        checks.require(unit.status == UnitStatus::Undeployed, || {
            format!("unit '{}' is {} and cannot be deployed again", unit.id, unit.status)
        });
        checks.require(!state.ledger.ended, || "deployment has already ended".to_string());
        if !checks.passed() {
            return checks.finish();
        }

        let Some(zone) = state.board.zone_for(unit.owner) else {
            return ValidationResult::rejected(format!("{} has no deployment zone", unit.owner));
        };
        let Some(placed) = spatial::resolve_placements(unit, placements, &mut checks) else {
            return checks.finish();
        };
        for p in &placed {
            let pos = p.footprint.position;
            checks.require(ctx.geometry.point_in_polygon(pos, &zone.polygon), || {
                format!(
                    "model '{}' at ({:.1}, {:.1}) is outside {}'s deployment zone",
                    p.model, pos.x, pos.y, unit.owner
                )
            });
        }
        spatial::check_positions(state, ctx, unit, &placed, &mut checks);
        checks.finish()
    }
}

impl PhaseRules for DeploymentPhase {
    fn phase(&self) -> Phase {
        Phase::Deployment
    }

    fn validate_action(&self, state: &GameState, action: &Action, ctx: &RulesContext) -> ValidationResult {
        match action {
            Action::DeployUnit { unit_id, placements } => self.validate_deploy(state, ctx, unit_id, placements),
            Action::EndPhase { player } => {
                let mut checks = Checks::new();
                check_end_phase(state, *player, &mut checks);
                checks.finish()
            }
            other => wrong_phase(state.phase, other),
        }
    }

    fn process_action(
        &self,
        state: &GameState,
        action: &Action,
        _ctx: &RulesContext,
        _dice: &mut dyn DiceRoller,
    ) -> Result<ExecutionResult, StateError> {
        match action {
            Action::DeployUnit { unit_id, placements } => {
                let owner = state
                    .unit(unit_id)
                    .map(|u| u.owner)
                    .ok_or_else(|| StateError::UnknownUnit(unit_id.to_string()))?;
                let mut set = ChangeSet::new(state);
                for p in placements {
                    set.move_model(unit_id, &p.model_id, p.position(), p.rotation)?;
                }
                set.set_status(unit_id, UnitStatus::Deployed)?;
                let next = if undeployed_remaining(set.state(), owner.opponent()) {
                    owner.opponent()
                } else {
                    owner
                };
                set.set_active_player(next)?;
                debug!(unit = %unit_id, %owner, "deployed");
                set.note(format!("{owner} deployed unit '{unit_id}'"));
                Ok(set.finish())
            }
            Action::EndPhase { player } => process_end_phase(state, *player),
            _ => Ok(ExecutionResult::default()),
        }
    }

    fn candidate_actions(&self, state: &GameState, player: Player, ctx: &RulesContext) -> Vec<Action> {
        if player != state.active_player {
            return Vec::new();
        }
        let Some(zone) = state.board.zone_for(player) else {
            return Vec::new();
        };
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in &zone.polygon {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        if !min_x.is_finite() || !max_x.is_finite() {
            return Vec::new();
        }

        let mut actions = Vec::new();
        for unit in state.units_of(player).filter(|u| u.status == UnitStatus::Undeployed) {
            for (fx, fy) in ANCHORS {
                let anchor = Point::new(min_x + (max_x - min_x) * fx, min_y + (max_y - min_y) * fy);
                actions.push(Action::DeployUnit {
                    unit_id: unit.id.clone(),
                    placements: spatial::formation(ctx, unit, anchor),
                });
            }
        }
        actions
    }

    fn should_complete_phase(&self, state: &GameState, ctx: &RulesContext) -> bool {
        if state.ledger.ended {
            return true;
        }
        if !undeployed_remaining(state, Player::One) && !undeployed_remaining(state, Player::Two) {
            return true;
        }
        !self.has_remaining_actions(state, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BaseShape, Board, DeploymentZone, PlanarGeometry, Unit, UnitProfile};
    use crate::config::RulesConfig;
    use crate::dice::ScriptedDice;
    use crate::phase::RejectionKind;

    fn profile() -> UnitProfile {
        UnitProfile {
            movement: 6.0,
            toughness: 4,
            save: 3,
            wounds: 2,
            leadership: 6,
            objective_control: 2,
            ranged: vec![],
            melee: vec![],
        }
    }

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Point> {
        vec![Point::new(x0, y0), Point::new(x1, y0), Point::new(x1, y1), Point::new(x0, y1)]
    }

    fn state() -> GameState {
        let mut board = Board::new(2400.0, 1760.0);
        board.deployment_zones = vec![
            DeploymentZone { player: Player::One, polygon: rect(0.0, 0.0, 2400.0, 480.0) },
            DeploymentZone { player: Player::Two, polygon: rect(0.0, 1280.0, 2400.0, 1760.0) },
        ];
        let mut state = GameState::new(board);
        state.add_unit(Unit::new("a", "Alpha", Player::One, profile(), BaseShape::infantry(), 3));
        state.add_unit(Unit::new("b", "Bravo", Player::Two, profile(), BaseShape::infantry(), 3));
        state
    }

    fn deploy(at: Point) -> Action {
        let geometry = PlanarGeometry::new(40.0);
        let config = RulesConfig::default();
        let ctx = RulesContext::new(&geometry, &config);
        let s = state();
        let unit = s.unit(&UnitId::from("a")).unwrap();
        Action::DeployUnit { unit_id: unit.id.clone(), placements: spatial::formation(&ctx, unit, at) }
    }

    #[test]
    fn deploy_inside_zone_then_opponent_deploys() {
        let geometry = PlanarGeometry::new(40.0);
        let config = RulesConfig::default();
        let ctx = RulesContext::new(&geometry, &config);
        let s = state();
        let action = deploy(Point::new(400.0, 200.0));
        assert!(DeploymentPhase.validate_action(&s, &action, &ctx).valid);
        let result = DeploymentPhase
            .process_action(&s, &action, &ctx, &mut ScriptedDice::default())
            .unwrap();
        let mut next = s.clone();
        next.apply_all(&result.changes).unwrap();
        assert_eq!(next.unit(&UnitId::from("a")).unwrap().status, UnitStatus::Deployed);
        assert_eq!(next.active_player, Player::Two);
    }

    #[test]
    fn deploy_outside_zone_is_rejected() {
        let geometry = PlanarGeometry::new(40.0);
        let config = RulesConfig::default();
        let ctx = RulesContext::new(&geometry, &config);
        let v = DeploymentPhase.validate_action(&state(), &deploy(Point::new(400.0, 900.0)), &ctx);
        assert!(!v.valid);
        assert!(v.reasons.iter().any(|r| r.contains("outside")));
    }

    #[test]
    fn redeploying_names_the_status() {
        let geometry = PlanarGeometry::new(40.0);
        let config = RulesConfig::default();
        let ctx = RulesContext::new(&geometry, &config);
        let mut s = state();
        s.units.get_mut(&UnitId::from("a")).unwrap().status = UnitStatus::Deployed;
        let v = DeploymentPhase.validate_action(&s, &deploy(Point::new(400.0, 200.0)), &ctx);
        assert_eq!(v.kind, Some(RejectionKind::ValidationRejected));
        assert!(v.reasons[0].contains("DEPLOYED"));
    }

    #[test]
    fn opponent_cannot_deploy_out_of_turn() {
        let geometry = PlanarGeometry::new(40.0);
        let config = RulesConfig::default();
        let ctx = RulesContext::new(&geometry, &config);
        let s = state();
        let action = Action::DeployUnit {
            unit_id: UnitId::from("b"),
            placements: vec![
                ModelPlacement::new("b-m1".into(), Point::new(400.0, 1500.0), 0.0),
                ModelPlacement::new("b-m2".into(), Point::new(470.0, 1500.0), 0.0),
                ModelPlacement::new("b-m3".into(), Point::new(540.0, 1500.0), 0.0),
            ],
        };
        assert!(!DeploymentPhase.validate_action(&s, &action, &ctx).valid);
    }

    #[test]
    fn candidates_are_legal_for_active_player_only() {
        let geometry = PlanarGeometry::new(40.0);
        let config = RulesConfig::default();
        let ctx = RulesContext::new(&geometry, &config);
        let s = state();
        let candidates = DeploymentPhase.candidate_actions(&s, Player::One, &ctx);
        assert!(!candidates.is_empty());
        assert!(candidates.iter().all(|a| DeploymentPhase.validate_action(&s, a, &ctx).valid));
        assert!(DeploymentPhase.candidate_actions(&s, Player::Two, &ctx).is_empty());
        assert!(!DeploymentPhase.should_complete_phase(&s, &ctx));
    }
}
