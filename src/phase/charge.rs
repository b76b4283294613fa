//! Charge phase.
//!
//! A unit moves through `ELIGIBLE -> DECLARED -> ROLLED_SUCCESS | ROLLED_FAIL
//! -> MOVED | SKIPPED`. The reacting player may fire overwatch at any unit
//! that has declared a charge and not yet rolled.
//!
//! Required charge distance is the smallest edge-to-edge gap between the
//! charger and a declared target. A 2D6 roll at least that large makes the
//! target reachable; the charge move must then end within engagement range
//! of a reachable target and of no other enemy.

use tracing::debug;

use crate::board::{
    Action, Activation, ChangeSet, ChargeState, ExecutionResult, GameState, ModelPlacement, Phase, Player, Unit,
    UnitFlag, UnitId,
};
use crate::dice::DiceRoller;
use crate::error::StateError;

use super::shooting::{check_ranged_target, describe, fire};
use super::spatial;
use super::validation::{Checks, ValidationResult};
use super::{actor, check_end_phase, check_owned_active, process_end_phase, wrong_phase, PhaseRules, RulesContext};

pub struct ChargePhase;

fn charge_state(state: &GameState, unit: &UnitId) -> Option<ChargeState> {
    state.activation(unit).charge_state()
}

/// Flags that forbid declaring a charge.
fn check_charge_flags(unit: &Unit, checks: &mut Checks) {
    let id = &unit.id;
    checks.require(!unit.flags.has_charged, || format!("unit '{id}' has already charged this turn"));
    checks.require(!unit.flags.cannot_charge, || {
        format!("unit '{id}' advanced or fell back and cannot charge this turn")
    });
    checks.require(!unit.flags.fell_back, || format!("unit '{id}' fell back this turn"));
}

/// Required distance to `target` in inches, if the straight path to its
/// nearest model is clear of impassable terrain.
fn charge_distance(state: &GameState, ctx: &RulesContext, unit: &Unit, target: &Unit) -> Option<f64> {
    let (from, to, gap) = spatial::closest_pair(ctx, unit, target)?;
    spatial::path_clear(state, ctx, from, to).then(|| ctx.inches(gap))
}

impl ChargePhase {
    fn validate_declare(&self, state: &GameState, ctx: &RulesContext, unit_id: &UnitId, target_ids: &[UnitId]) -> ValidationResult {
        let unit = match actor(state, unit_id) {
            Ok(u) => u,
            Err(v) => return v,
        };
        let mut checks = Checks::new();
        checks.require(!target_ids.is_empty(), || "DECLARE_CHARGE needs at least one target".to_string());
        check_owned_active(unit, state.active_player, &mut checks);
        checks.require(!state.ledger.ended, || "the charge phase has ended".to_string());
        checks.require(charge_state(state, unit_id) == Some(ChargeState::Eligible), || {
            format!("unit '{unit_id}' has already acted this phase")
        });
        check_charge_flags(unit, &mut checks);
        checks.require(!unit.is_active() || !spatial::is_engaged(state, ctx, unit), || {
            format!("unit '{unit_id}' is already within engagement range")
        });
        if !checks.passed() {
            return checks.finish();
        }

        let max = ctx.config.max_charge_distance;
        let mut any_in_range = false;
        for (i, target_id) in target_ids.iter().enumerate() {
            if target_ids[..i].contains(target_id) {
                checks.fail(format!("target '{target_id}' is declared twice"));
                continue;
            }
            let target = match actor(state, target_id) {
                Ok(t) => t,
                Err(v) => return v,
            };
            checks.require(target.owner != unit.owner, || format!("target '{target_id}' is not an enemy unit"));
            checks.require(target.is_active(), || format!("target '{target_id}' is {}", target.status));
            if target.owner == unit.owner || !target.is_active() {
                continue;
            }
            if charge_distance(state, ctx, unit, target).is_some_and(|d| d <= max + spatial::EPSILON) {
                any_in_range = true;
            }
        }
        checks.require(any_in_range, || {
            format!("no declared target is within {max}\" of unit '{unit_id}' along a clear path")
        });
        checks.finish()
    }

    fn validate_overwatch(&self, state: &GameState, ctx: &RulesContext, unit_id: &UnitId, target_id: &UnitId) -> ValidationResult {
        let unit = match actor(state, unit_id) {
            Ok(u) => u,
            Err(v) => return v,
        };
        let target = match actor(state, target_id) {
            Ok(u) => u,
            Err(v) => return v,
        };
        let reacting = state.active_player.opponent();
        let cost = ctx.config.overwatch_cost;
        let mut checks = Checks::new();
        check_owned_active(unit, reacting, &mut checks);
        checks.require(!state.ledger.ended, || "the charge phase has ended".to_string());
        checks.require(!unit.flags.battle_shocked, || format!("unit '{unit_id}' is battle-shocked"));
        checks.require(!unit.flags.fired_overwatch, || {
            format!("unit '{unit_id}' has already fired overwatch this turn")
        });
        checks.require(state.command_points(reacting) >= cost, || {
            format!(
                "overwatch costs {cost} CP and {reacting} has {}",
                state.command_points(reacting)
            )
        });
        checks.require(charge_state(state, target_id) == Some(ChargeState::Declared), || {
            format!("unit '{target_id}' has not declared a charge that can be answered")
        });
        if !checks.passed() {
            return checks.finish();
        }
        checks.require(!spatial::is_engaged(state, ctx, unit), || {
            format!("unit '{unit_id}' is within engagement range")
        });
        check_ranged_target(state, ctx, unit, target, &mut checks);
        checks.finish()
    }

    fn validate_step(&self, state: &GameState, unit_id: &UnitId, allowed: &[ChargeState], what: &str) -> ValidationResult {
        let unit = match actor(state, unit_id) {
            Ok(u) => u,
            Err(v) => return v,
        };
        let mut checks = Checks::new();
        check_owned_active(unit, state.active_player, &mut checks);
        checks.require(!state.ledger.ended, || "the charge phase has ended".to_string());
        let current = charge_state(state, unit_id);
        checks.require(current.is_some_and(|c| allowed.contains(&c)), || match current {
            Some(c) => format!("unit '{unit_id}' cannot {what} while {c:?}"),
            None => format!("unit '{unit_id}' cannot {what} now"),
        });
        checks.finish()
    }

    fn validate_move(&self, state: &GameState, ctx: &RulesContext, unit_id: &UnitId, placements: &[ModelPlacement]) -> ValidationResult {
        let verdict = self.validate_step(state, unit_id, &[ChargeState::RolledSuccess], "make a charge move");
        if !verdict.valid {
            return verdict;
        }
        let (Ok(unit), Activation::ChargeRolled { targets, total, reachable }) =
            (actor(state, unit_id), state.activation(unit_id))
        else {
            return ValidationResult::rejected(format!("unit '{unit_id}' has not rolled a successful charge"));
        };

        let mut checks = Checks::new();
        let Some(placed) = spatial::resolve_placements(unit, placements, &mut checks) else {
            return checks.finish();
        };
        spatial::check_distance(ctx, &placed, f64::from(*total), &mut checks);
        spatial::check_paths(state, ctx, &placed, &mut checks);
        spatial::check_positions(state, ctx, unit, &placed, &mut checks);

        let reached = reachable
            .iter()
            .filter_map(|id| state.unit(id))
            .filter(|t| t.is_active())
            .any(|t| spatial::placed_engaged_with(ctx, &placed, t));
        checks.require(reached, || {
            format!(
                "unit '{unit_id}' must end within {}\" of a reachable target",
                ctx.config.engagement_range
            )
        });
        for enemy in spatial::enemies(state, unit.owner).filter(|e| !targets.contains(&e.id)) {
            checks.require(!spatial::placed_engaged_with(ctx, &placed, enemy), || {
                format!("unit '{unit_id}' would end within engagement range of undeclared unit '{}'", enemy.id)
            });
        }
        checks.finish()
    }

    fn process_roll(&self, state: &GameState, ctx: &RulesContext, unit_id: &UnitId, dice: &mut dyn DiceRoller) -> Result<ExecutionResult, StateError> {
        let unit = state.unit(unit_id).ok_or_else(|| StateError::UnknownUnit(unit_id.to_string()))?;
        let Activation::ChargeDeclared { targets } = state.activation(unit_id) else {
            return Ok(ExecutionResult::default());
        };
        let mut set = ChangeSet::new(state);
        let roll = dice.roll_2d6();
        set.record_dice(&roll);
        let total = roll[0] + roll[1];

        let mut reachable = Vec::new();
        for target in targets.iter().filter_map(|id| state.unit(id)).filter(|t| t.is_active()) {
            let Some(needed) = charge_distance(state, ctx, unit, target) else {
                continue;
            };
            if needed <= f64::from(total) + spatial::EPSILON {
                reachable.push(target.id.clone());
            }
            set.note(format!("'{}' needs {needed:.2}\"", target.id));
        }

        set.set_flag(unit_id, UnitFlag::ChargeAttempted, true)?;
        if reachable.is_empty() {
            set.set_activation(unit_id, Activation::ChargeFailed { total })?;
            set.note(format!("unit '{unit_id}' failed its charge with {total}"));
        } else {
            set.set_activation(
                unit_id,
                Activation::ChargeRolled { targets: targets.clone(), total, reachable },
            )?;
            set.note(format!("unit '{unit_id}' rolled {total} to charge"));
        }
        debug!(unit = %unit_id, total, "charge roll");
        Ok(set.finish())
    }
}

impl PhaseRules for ChargePhase {
    fn phase(&self) -> Phase {
        Phase::Charge
    }

    fn validate_action(&self, state: &GameState, action: &Action, ctx: &RulesContext) -> ValidationResult {
        match action {
            Action::DeclareCharge { unit_id, target_ids } => self.validate_declare(state, ctx, unit_id, target_ids),
            Action::Overwatch { unit_id, target_id } => self.validate_overwatch(state, ctx, unit_id, target_id),
            Action::RollCharge { unit_id } => {
                self.validate_step(state, unit_id, &[ChargeState::Declared], "roll to charge")
            }
            Action::ChargeMove { unit_id, placements } => self.validate_move(state, ctx, unit_id, placements),
            Action::SkipCharge { unit_id } => self.validate_step(
                state,
                unit_id,
                &[ChargeState::Eligible, ChargeState::RolledSuccess, ChargeState::RolledFail],
                "skip its charge",
            ),
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
        ctx: &RulesContext,
        dice: &mut dyn DiceRoller,
    ) -> Result<ExecutionResult, StateError> {
        let mut set = ChangeSet::new(state);
        match action {
            Action::DeclareCharge { unit_id, target_ids } => {
                set.set_activation(unit_id, Activation::ChargeDeclared { targets: target_ids.clone() })?;
                let names: Vec<String> = target_ids.iter().map(|t| format!("'{t}'")).collect();
                set.note(format!("unit '{unit_id}' declares a charge against {}", names.join(", ")));
            }
            Action::Overwatch { unit_id, target_id } => {
                let shooter = state.unit(unit_id).ok_or_else(|| StateError::UnknownUnit(unit_id.to_string()))?;
                let target = state.unit(target_id).ok_or_else(|| StateError::UnknownUnit(target_id.to_string()))?;
                let cp = state.command_points(shooter.owner);
                set.set_command_points(shooter.owner, cp.saturating_sub(ctx.config.overwatch_cost))?;
                set.set_flag(unit_id, UnitFlag::FiredOverwatch, true)?;
                let summary = fire(&mut set, dice, ctx, shooter, target, Some(ctx.config.overwatch_hit_roll))?;
                set.note(describe(unit_id, target_id, "fired overwatch at", &summary));
            }
            Action::RollCharge { unit_id } => return self.process_roll(state, ctx, unit_id, dice),
            Action::ChargeMove { unit_id, placements } => {
                for p in placements {
                    set.move_model(unit_id, &p.model_id, p.position(), p.rotation)?;
                }
                set.set_flag(unit_id, UnitFlag::HasCharged, true)?;
                set.set_activation(unit_id, Activation::Charged)?;
            }
            Action::SkipCharge { unit_id } => {
                set.set_activation(unit_id, Activation::ChargeSkipped)?;
            }
            Action::EndPhase { player } => return process_end_phase(state, *player),
            _ => {}
        }
        Ok(set.finish())
    }

    fn candidate_actions(&self, state: &GameState, player: Player, ctx: &RulesContext) -> Vec<Action> {
        let mut actions = Vec::new();
        if player != state.active_player {
            let declared: Vec<&Unit> = state
                .active_units_of(state.active_player)
                .filter(|u| charge_state(state, &u.id) == Some(ChargeState::Declared))
                .collect();
            for unit in state.active_units_of(player).filter(|u| !u.profile.ranged.is_empty()) {
                for target in &declared {
                    actions.push(Action::Overwatch { unit_id: unit.id.clone(), target_id: target.id.clone() });
                }
            }
            return actions;
        }

        let max = ctx.config.max_charge_distance;
        let stop = ctx.px(ctx.config.engagement_range) / 2.0;
        for unit in state.active_units_of(player) {
            let id = unit.id.clone();
            match state.activation(&id) {
                Activation::Idle => {
                    let in_range: Vec<UnitId> = spatial::enemies(state, player)
                        .filter(|e| charge_distance(state, ctx, unit, e).is_some_and(|d| d <= max))
                        .map(|e| e.id.clone())
                        .collect();
                    if in_range.is_empty() {
                        continue;
                    }
                    for target in &in_range {
                        actions.push(Action::DeclareCharge { unit_id: id.clone(), target_ids: vec![target.clone()] });
                    }
                    if in_range.len() > 1 {
                        actions.push(Action::DeclareCharge { unit_id: id.clone(), target_ids: in_range });
                    }
                    actions.push(Action::SkipCharge { unit_id: id });
                }
                Activation::ChargeDeclared { .. } => actions.push(Action::RollCharge { unit_id: id }),
                Activation::ChargeRolled { total, reachable, .. } => {
                    let reach = ctx.px(f64::from(*total));
                    for target in reachable.iter().filter_map(|t| state.unit(t)) {
                        if let Some(placements) = spatial::approach(ctx, unit, target, reach, stop) {
                            actions.push(Action::ChargeMove { unit_id: id.clone(), placements });
                        }
                    }
                    if let Some(placements) = spatial::close_individually(state, ctx, unit, reach, stop) {
                        actions.push(Action::ChargeMove { unit_id: id.clone(), placements });
                    }
                    actions.push(Action::SkipCharge { unit_id: id });
                }
                Activation::ChargeFailed { .. } => actions.push(Action::SkipCharge { unit_id: id }),
                _ => {}
            }
        }
        actions
    }
}
