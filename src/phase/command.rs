//! Command phase.
//!
//! Entering the phase clears the active player's unit flags and grants
//! command points to both players. Units below half strength must then
//! take a battle-shock test: 2D6 against leadership.

use tracing::debug;

use crate::board::{
    Action, Activation, ChangeSet, ExecutionResult, GameState, Phase, Player, Unit, UnitFlag, UnitId, ALL_PLAYERS,
};
use crate::dice::DiceRoller;
use crate::error::StateError;

use super::validation::{Checks, ValidationResult};
use super::{actor, check_end_phase, check_owned_active, process_end_phase, wrong_phase, PhaseRules, RulesContext};

pub struct CommandPhase;

/// True if `unit` still owes a battle-shock test this phase.
fn test_pending(state: &GameState, unit: &Unit) -> bool {
    unit.owner == state.active_player
        && unit.is_active()
        && unit.is_below_half_strength()
        && *state.activation(&unit.id) == Activation::Idle
}

pub fn pending_tests(state: &GameState) -> Vec<UnitId> {
    state
        .units
        .values()
        .filter(|u| test_pending(state, u))
        .map(|u| u.id.clone())
        .collect()
}

impl PhaseRules for CommandPhase {
    fn phase(&self) -> Phase {
        Phase::Command
    }

    fn on_enter(&self, state: &GameState, ctx: &RulesContext, set: &mut ChangeSet) -> Result<(), StateError> {
        let player = state.active_player;
        for unit in state.units_of(player) {
            for flag in unit.flags.raised() {
                set.set_flag(&unit.id, flag, false)?;
            }
        }
        for p in ALL_PLAYERS {
            set.add_command_points(p, ctx.config.command_points_per_turn)?;
        }
        debug!(%player, round = state.battle_round, "command phase flags cleared");
        Ok(())
    }

    fn validate_action(&self, state: &GameState, action: &Action, _ctx: &RulesContext) -> ValidationResult {
        match action {
            Action::BattleShockTest { unit_id } => {
                let unit = match actor(state, unit_id) {
                    Ok(u) => u,
                    Err(v) => return v,
                };
                let mut checks = Checks::new();
                check_owned_active(unit, state.active_player, &mut checks);
                checks.require(unit.is_below_half_strength(), || {
                    format!("unit '{unit_id}' is not below half strength")
                });
                checks.require(*state.activation(unit_id) == Activation::Idle, || {
                    format!("unit '{unit_id}' has already taken its battle-shock test")
                });
                checks.finish()
            }
            Action::EndPhase { player } => {
                let mut checks = Checks::new();
                check_end_phase(state, *player, &mut checks);
                let pending = pending_tests(state);
                checks.require(pending.is_empty(), || {
                    let names: Vec<String> = pending.iter().map(|u| format!("'{u}'")).collect();
                    format!("battle-shock tests are still pending for {}", names.join(", "))
                });
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
        dice: &mut dyn DiceRoller,
    ) -> Result<ExecutionResult, StateError> {
        match action {
            Action::BattleShockTest { unit_id } => {
                let leadership = state
                    .unit(unit_id)
                    .map(|u| u.profile.leadership)
                    .ok_or_else(|| StateError::UnknownUnit(unit_id.to_string()))?;
                let mut set = ChangeSet::new(state);
                let roll = dice.roll_2d6();
                set.record_dice(&roll);
                let total = roll[0] + roll[1];
                if total >= leadership {
                    set.note(format!("unit '{unit_id}' passed battle-shock ({total} vs {leadership})"));
                } else {
                    set.set_flag(unit_id, UnitFlag::BattleShocked, true)?;
                    set.note(format!("unit '{unit_id}' is battle-shocked ({total} vs {leadership})"));
                }
                set.set_activation(unit_id, Activation::Tested)?;
                Ok(set.finish())
            }
            Action::EndPhase { player } => process_end_phase(state, *player),
            _ => Ok(ExecutionResult::default()),
        }
    }

    fn candidate_actions(&self, state: &GameState, player: Player, _ctx: &RulesContext) -> Vec<Action> {
        if player != state.active_player {
            return Vec::new();
        }
        pending_tests(state)
            .into_iter()
            .map(|unit_id| Action::BattleShockTest { unit_id })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BaseShape, Board, PlanarGeometry, UnitProfile, UnitStatus};
    use crate::config::RulesConfig;
    use crate::dice::ScriptedDice;

    fn state() -> GameState {
        let profile = UnitProfile {
            movement: 6.0,
            toughness: 4,
            save: 3,
            wounds: 1,
            leadership: 7,
            objective_control: 2,
            ranged: vec![],
            melee: vec![],
        };
        let mut state = GameState::new(Board::new(1000.0, 1000.0));
        state.phase = Phase::Command;
        for (id, owner) in [("a", Player::One), ("b", Player::Two)] {
            let mut unit = Unit::new(id, id, owner, profile.clone(), BaseShape::infantry(), 4);
            unit.status = UnitStatus::Deployed;
            unit.flags.has_charged = true;
            unit.flags.fell_back = true;
            unit.flags.battle_shocked = true;
            for (i, m) in unit.models.iter_mut().enumerate() {
                let y = if owner == Player::One { 100.0 } else { 800.0 };
                m.position = crate::board::Point::new(100.0 + 60.0 * i as f64, y);
            }
            state.add_unit(unit);
        }
        state
    }

    fn enter(state: &GameState) -> GameState {
        let geometry = PlanarGeometry::new(40.0);
        let config = RulesConfig::default();
        let ctx = RulesContext::new(&geometry, &config);
        let mut set = ChangeSet::new(state);
        CommandPhase.on_enter(state, &ctx, &mut set).unwrap();
        let mut next = state.clone();
        next.apply_all(&set.finish().changes).unwrap();
        next
    }

    #[test]
    fn entering_clears_active_flags_only_and_grants_points() {
        let next = enter(&state());
        let a = next.unit(&UnitId::from("a")).unwrap();
        assert!(crate::board::ALL_FLAGS.iter().all(|f| !a.flags.get(*f)));
        let b = next.unit(&UnitId::from("b")).unwrap();
        assert!(b.flags.has_charged);
        assert_eq!(next.command_points, [1, 1]);
    }

    #[test]
    fn below_half_strength_must_test_before_ending() {
        let geometry = PlanarGeometry::new(40.0);
        let config = RulesConfig::default();
        let ctx = RulesContext::new(&geometry, &config);
        let mut s = enter(&state());
        let a = UnitId::from("a");
        for m in s.units.get_mut(&a).unwrap().models.iter_mut().take(3) {
            m.alive = false;
            m.wounds = 0;
        }
        let end = Action::EndPhase { player: Player::One };
        let v = CommandPhase.validate_action(&s, &end, &ctx);
        assert!(!v.valid);
        assert!(v.reasons[0].contains("pending"));
        assert_eq!(
            CommandPhase.candidate_actions(&s, Player::One, &ctx),
            vec![Action::BattleShockTest { unit_id: a.clone() }]
        );

        // 2 + 3 = 5 < leadership 7: fails.
        let test = Action::BattleShockTest { unit_id: a.clone() };
        let result = CommandPhase
            .process_action(&s, &test, &ctx, &mut ScriptedDice::new([2, 3]))
            .unwrap();
        assert_eq!(result.dice, vec![2, 3]);
        s.apply_all(&result.changes).unwrap();
        assert!(s.unit(&a).unwrap().flags.battle_shocked);
        assert!(CommandPhase.validate_action(&s, &end, &ctx).valid);
        assert!(CommandPhase.should_complete_phase(&s, &ctx));
    }

    #[test]
    fn passing_test_leaves_unit_steady() {
        let geometry = PlanarGeometry::new(40.0);
        let config = RulesConfig::default();
        let ctx = RulesContext::new(&geometry, &config);
        let mut s = enter(&state());
        let a = UnitId::from("a");
        for m in s.units.get_mut(&a).unwrap().models.iter_mut().take(3) {
            m.alive = false;
            m.wounds = 0;
        }
        let test = Action::BattleShockTest { unit_id: a.clone() };
        let result = CommandPhase
            .process_action(&s, &test, &ctx, &mut ScriptedDice::new([4, 3]))
            .unwrap();
        s.apply_all(&result.changes).unwrap();
        assert!(!s.unit(&a).unwrap().flags.battle_shocked);
        assert!(!CommandPhase.validate_action(&s, &test, &ctx).valid);
    }

    #[test]
    fn full_strength_unit_cannot_test() {
        let geometry = PlanarGeometry::new(40.0);
        let config = RulesConfig::default();
        let ctx = RulesContext::new(&geometry, &config);
        let s = enter(&state());
        let test = Action::BattleShockTest { unit_id: UnitId::from("a") };
        assert!(!CommandPhase.validate_action(&s, &test, &ctx).valid);
        assert!(CommandPhase.should_complete_phase(&s, &ctx));
    }
}
