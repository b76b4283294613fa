//! Shooting phase.

use crate::board::{Action, Activation, ChangeSet, ExecutionResult, GameState, Phase, Player, Unit, UnitFlag, UnitId};
use crate::dice::DiceRoller;
use crate::error::StateError;

use super::combat::{resolve_attacks, AttackPool, AttackSummary};
use super::spatial;
use super::validation::{Checks, ValidationResult};
use super::{actor, check_end_phase, check_owned_active, process_end_phase, wrong_phase, PhaseRules, RulesContext};

pub struct ShootingPhase;

/// Range and visibility checks for ranged attacks by `shooter` on `target`.
/// Used by shooting and overwatch.
pub(crate) fn check_ranged_target(
    state: &GameState,
    ctx: &RulesContext,
    shooter: &Unit,
    target: &Unit,
    checks: &mut Checks,
) {
    checks.require(target.owner != shooter.owner, || {
        format!("unit '{}' cannot target friendly unit '{}'", shooter.id, target.id)
    });
    checks.require(target.is_active(), || format!("target '{}' is {}", target.id, target.status));
    if !checks.passed() {
        return;
    }
    let reach = shooter
        .profile
        .ranged
        .iter()
        .map(|w| w.range_inches)
        .fold(0.0_f64, f64::max);
    checks.require(!shooter.profile.ranged.is_empty(), || {
        format!("unit '{}' has no ranged weapons", shooter.id)
    });
    let gap = spatial::unit_gap(ctx, shooter, target);
    checks.require(spatial::within(ctx, gap, reach), || {
        format!(
            "target '{}' is {:.1}\" away, beyond the {reach}\" range of unit '{}'",
            target.id,
            ctx.inches(gap),
            shooter.id
        )
    });
    checks.require(spatial::has_line_of_sight(state, ctx, shooter, target), || {
        format!("unit '{}' cannot see target '{}'", shooter.id, target.id)
    });
}

/// Resolves every ranged weapon of `shooter` against `target`. Only models
/// within a weapon's range fire it.
pub(crate) fn fire(
    set: &mut ChangeSet,
    dice: &mut dyn DiceRoller,
    ctx: &RulesContext,
    shooter: &Unit,
    target: &Unit,
    hit_on: Option<u8>,
) -> Result<AttackSummary, StateError> {
    let pools: Vec<AttackPool<'_>> = shooter
        .profile
        .ranged
        .iter()
        .map(|weapon| AttackPool {
            weapon,
            attacks: weapon
                .attacks
                .saturating_mul(spatial::models_within(ctx, shooter, target, weapon.range_inches) as u32),
        })
        .collect();
    resolve_attacks(set, dice, &pools, &target.id, hit_on)
}

pub(crate) fn describe(attacker: &UnitId, target: &UnitId, verb: &str, s: &AttackSummary) -> String {
    format!(
        "unit '{attacker}' {verb} '{target}': {} attacks, {} hits, {} wounds, {} unsaved, {} slain",
        s.attacks, s.hits, s.wounds, s.unsaved, s.slain
    )
}

impl ShootingPhase {
    fn validate_shoot(&self, state: &GameState, ctx: &RulesContext, unit_id: &UnitId, target_id: &UnitId) -> ValidationResult {
        let unit = match actor(state, unit_id) {
            Ok(u) => u,
            Err(v) => return v,
        };
        let target = match actor(state, target_id) {
            Ok(u) => u,
            Err(v) => return v,
        };
        let mut checks = Checks::new();
        check_owned_active(unit, state.active_player, &mut checks);
        checks.require(!state.ledger.ended, || "the shooting phase has ended".to_string());
        checks.require(*state.activation(unit_id) == Activation::Idle, || {
            format!("unit '{unit_id}' has already shot this phase")
        });
        checks.require(!unit.flags.advanced, || format!("unit '{unit_id}' advanced this turn"));
        checks.require(!unit.flags.fell_back, || format!("unit '{unit_id}' fell back this turn"));
        if !checks.passed() {
            return checks.finish();
        }
        checks.require(!spatial::is_engaged(state, ctx, unit), || {
            format!("unit '{unit_id}' is within engagement range")
        });
        check_ranged_target(state, ctx, unit, target, &mut checks);
        if checks.passed() {
            for friend in state.active_units_of(unit.owner) {
                checks.require(!spatial::engaged_with(ctx, friend, target), || {
                    format!("target '{target_id}' is engaged with friendly unit '{}'", friend.id)
                });
            }
        }
        checks.finish()
    }
}

impl PhaseRules for ShootingPhase {
    fn phase(&self) -> Phase {
        Phase::Shooting
    }

    fn validate_action(&self, state: &GameState, action: &Action, ctx: &RulesContext) -> ValidationResult {
        match action {
            Action::Shoot { unit_id, target_id } => self.validate_shoot(state, ctx, unit_id, target_id),
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
        match action {
            Action::Shoot { unit_id, target_id } => {
                let shooter = state.unit(unit_id).ok_or_else(|| StateError::UnknownUnit(unit_id.to_string()))?;
                let target = state.unit(target_id).ok_or_else(|| StateError::UnknownUnit(target_id.to_string()))?;
                let mut set = ChangeSet::new(state);
                let summary = fire(&mut set, dice, ctx, shooter, target, None)?;
                set.set_flag(unit_id, UnitFlag::HasShot, true)?;
                set.set_activation(unit_id, Activation::Shot)?;
                set.note(describe(unit_id, target_id, "shot", &summary));
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
        let mut actions = Vec::new();
        for unit in state.active_units_of(player).filter(|u| !u.profile.ranged.is_empty()) {
            for target in spatial::enemies(state, player) {
                actions.push(Action::Shoot { unit_id: unit.id.clone(), target_id: target.id.clone() });
            }
        }
        actions
    }
}
