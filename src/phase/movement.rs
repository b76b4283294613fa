//! Movement phase.
//!
//! Each unit of the active player moves, advances, falls back or remains
//! stationary. Advancing rolls a D6 first; the unit then moves up to its
//! movement characteristic plus the roll.

use crate::board::{
    Action, Activation, ChangeSet, ExecutionResult, GameState, ModelPlacement, Phase, Player, Unit, UnitFlag,
    UnitId,
};
use crate::dice::DiceRoller;
use crate::error::StateError;

use super::spatial::{self, Placed};
use super::validation::{Checks, ValidationResult};
use super::{actor, check_end_phase, check_owned_active, process_end_phase, wrong_phase, PhaseRules, RulesContext};

/// Extra clearance kept from engagement range by proposed moves, in inches.
const APPROACH_MARGIN: f64 = 1.0;

pub struct MovementPhase;

/// Maximum move in inches for a unit in its current activation, or `None`
/// if it cannot make a normal move.
fn move_allowance(state: &GameState, unit: &Unit) -> Option<f64> {
    match state.activation(&unit.id) {
        Activation::Idle => Some(unit.profile.movement),
        Activation::Advancing { bonus } => Some(unit.profile.movement + f64::from(*bonus)),
        _ => None,
    }
}

fn nearest_enemy<'s>(state: &'s GameState, ctx: &RulesContext, unit: &Unit) -> Option<&'s Unit> {
    spatial::enemies(state, unit.owner)
        .map(|e| (e, spatial::unit_gap(ctx, unit, e)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(e, _)| e)
}

impl MovementPhase {
    fn begin(&self, state: &GameState, unit_id: &UnitId) -> Result<(Checks, Unit), ValidationResult> {
        let unit = actor(state, unit_id)?;
        let mut checks = Checks::new();
        check_owned_active(unit, state.active_player, &mut checks);
        checks.require(!state.ledger.ended, || "the movement phase has ended".to_string());
        Ok((checks, unit.clone()))
    }

    /// Destination checks shared by every kind of move.
    fn check_destination(
        &self,
        state: &GameState,
        ctx: &RulesContext,
        unit: &Unit,
        placements: &[ModelPlacement],
        max_inches: f64,
        checks: &mut Checks,
    ) -> Option<Vec<Placed>> {
        let placed = spatial::resolve_placements(unit, placements, checks)?;
        spatial::check_distance(ctx, &placed, max_inches, checks);
        spatial::check_paths(state, ctx, &placed, checks);
        spatial::check_positions(state, ctx, unit, &placed, checks);
        for enemy in spatial::enemies(state, unit.owner) {
            checks.require(!spatial::placed_engaged_with(ctx, &placed, enemy), || {
                format!("unit '{}' would end within engagement range of '{}'", unit.id, enemy.id)
            });
        }
        Some(placed)
    }

    fn validate_move(&self, state: &GameState, ctx: &RulesContext, unit_id: &UnitId, placements: &[ModelPlacement]) -> ValidationResult {
        let (mut checks, unit) = match self.begin(state, unit_id) {
            Ok(v) => v,
            Err(v) => return v,
        };
        let Some(allowance) = move_allowance(state, &unit) else {
            checks.fail(format!("unit '{unit_id}' has already acted this phase"));
            return checks.finish();
        };
        checks.require(!spatial::is_engaged(state, ctx, &unit), || {
            format!("unit '{unit_id}' is within engagement range and must fall back or remain stationary")
        });
        if checks.passed() {
            self.check_destination(state, ctx, &unit, placements, allowance, &mut checks);
        }
        checks.finish()
    }

    fn validate_fall_back(
        &self,
        state: &GameState,
        ctx: &RulesContext,
        unit_id: &UnitId,
        placements: &[ModelPlacement],
    ) -> ValidationResult {
        let (mut checks, unit) = match self.begin(state, unit_id) {
            Ok(v) => v,
            Err(v) => return v,
        };
        checks.require(*state.activation(unit_id) == Activation::Idle, || {
            format!("unit '{unit_id}' has already acted this phase")
        });
        checks.require(spatial::is_engaged(state, ctx, &unit), || {
            format!("unit '{unit_id}' is not within engagement range and cannot fall back")
        });
        if checks.passed() {
            self.check_destination(state, ctx, &unit, placements, unit.profile.movement, &mut checks);
        }
        checks.finish()
    }

    fn validate_simple(&self, state: &GameState, ctx: &RulesContext, unit_id: &UnitId, advancing: bool) -> ValidationResult {
        let (mut checks, unit) = match self.begin(state, unit_id) {
            Ok(v) => v,
            Err(v) => return v,
        };
        checks.require(*state.activation(unit_id) == Activation::Idle, || {
            format!("unit '{unit_id}' has already acted this phase")
        });
        if advancing {
            checks.require(!spatial::is_engaged(state, ctx, &unit), || {
                format!("unit '{unit_id}' is within engagement range and cannot advance")
            });
        }
        checks.finish()
    }

    fn relocate(set: &mut ChangeSet, unit_id: &UnitId, placements: &[ModelPlacement]) -> Result<(), StateError> {
        for p in placements {
            set.move_model(unit_id, &p.model_id, p.position(), p.rotation)?;
        }
        Ok(())
    }
}

impl PhaseRules for MovementPhase {
    fn phase(&self) -> Phase {
        Phase::Movement
    }

    fn validate_action(&self, state: &GameState, action: &Action, ctx: &RulesContext) -> ValidationResult {
        match action {
            Action::Move { unit_id, placements } => self.validate_move(state, ctx, unit_id, placements),
            Action::FallBack { unit_id, placements } => self.validate_fall_back(state, ctx, unit_id, placements),
            Action::Advance { unit_id } => self.validate_simple(state, ctx, unit_id, true),
            Action::RemainStationary { unit_id } => self.validate_simple(state, ctx, unit_id, false),
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
        dice: &mut dyn DiceRoller,
    ) -> Result<ExecutionResult, StateError> {
        let mut set = ChangeSet::new(state);
        match action {
            Action::Move { unit_id, placements } => {
                let next = match state.activation(unit_id) {
                    Activation::Advancing { .. } => Activation::Advanced,
                    _ => Activation::Moved,
                };
                Self::relocate(&mut set, unit_id, placements)?;
                set.set_activation(unit_id, next)?;
            }
            Action::Advance { unit_id } => {
                let bonus = dice.roll_d6();
                set.record_dice(&[bonus]);
                set.set_flag(unit_id, UnitFlag::Advanced, true)?;
                set.set_flag(unit_id, UnitFlag::CannotCharge, true)?;
                set.set_activation(unit_id, Activation::Advancing { bonus })?;
                set.note(format!("unit '{unit_id}' advances {bonus}\""));
            }
            Action::FallBack { unit_id, placements } => {
                Self::relocate(&mut set, unit_id, placements)?;
                set.set_flag(unit_id, UnitFlag::FellBack, true)?;
                set.set_flag(unit_id, UnitFlag::CannotCharge, true)?;
                set.set_activation(unit_id, Activation::FellBack)?;
            }
            Action::RemainStationary { unit_id } => {
                set.set_activation(unit_id, Activation::Stationary)?;
            }
            Action::EndPhase { player } => return process_end_phase(state, *player),
            _ => {}
        }
        Ok(set.finish())
    }

    fn candidate_actions(&self, state: &GameState, player: Player, ctx: &RulesContext) -> Vec<Action> {
        if player != state.active_player {
            return Vec::new();
        }
        let mut actions = Vec::new();
        for unit in state.active_units_of(player) {
            let id = unit.id.clone();
            let Some(allowance) = move_allowance(state, unit) else {
                continue;
            };
            let reach = ctx.px(allowance);
            let engaged = spatial::is_engaged(state, ctx, unit);
            let idle = *state.activation(&id) == Activation::Idle;

            if idle {
                actions.push(Action::RemainStationary { unit_id: id.clone() });
            }
            if engaged {
                if let Some(placements) = spatial::engaged_enemies(state, ctx, unit)
                    .first()
                    .and_then(|threat| spatial::withdraw(ctx, unit, threat, reach))
                {
                    actions.push(Action::FallBack { unit_id: id, placements });
                }
                continue;
            }
            if idle {
                actions.push(Action::Advance { unit_id: id.clone() });
            } else {
                actions.push(Action::Move { unit_id: id.clone(), placements: spatial::stay(unit) });
            }
            let stop = ctx.px(ctx.config.engagement_range + APPROACH_MARGIN);
            if let Some(placements) = nearest_enemy(state, ctx, unit).and_then(|e| spatial::approach(ctx, unit, e, reach, stop)) {
                actions.push(Action::Move { unit_id: id.clone(), placements });
            }
            let centre = unit.centroid();
            let objective = state
                .board
                .objectives
                .iter()
                .min_by(|a, b| a.position.distance(centre).total_cmp(&b.position.distance(centre)));
            if let Some(placements) = objective.and_then(|o| spatial::advance_towards(unit, o.position, reach)) {
                actions.push(Action::Move { unit_id: id, placements });
            }
        }
        actions
    }
}
