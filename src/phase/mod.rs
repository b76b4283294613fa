//! Phase rules and the phase controller.
//!
//! Each phase implements `PhaseRules`: a pure validator, an executor that
//! returns a change-list, an enumerator of candidate actions, and a
//! completion predicate. Rules are looked up through a table indexed by
//! `Phase` rather than by dynamic registration.

pub mod charge;
pub mod combat;
pub mod command;
pub mod controller;
pub mod deployment;
pub mod fight;
pub mod movement;
pub mod scoring;
pub mod sequence;
pub mod shooting;
pub mod spatial;
pub mod validation;

use crate::board::{
    Action, ChangeSet, ExecutionResult, GameState, GeometryService, Phase, Player, Unit, UnitId,
    ALL_PLAYERS,
};
use crate::config::RulesConfig;
use crate::dice::DiceRoller;
use crate::error::StateError;

pub use controller::{replay, LogEntry, PhaseController, Services, SubmitOutcome};
pub use validation::{Checks, RejectionKind, ValidationResult};

/// Collaborators the rules read from while validating and executing.
#[derive(Clone, Copy)]
pub struct RulesContext<'a> {
    pub geometry: &'a dyn GeometryService,
    pub config: &'a RulesConfig,
}

impl<'a> RulesContext<'a> {
    pub fn new(geometry: &'a dyn GeometryService, config: &'a RulesConfig) -> Self {
        RulesContext { geometry, config }
    }

    /// Inches to board units.
    pub fn px(&self, inches: f64) -> f64 {
        self.config.px(inches)
    }

    /// Board units to inches.
    pub fn inches(&self, px: f64) -> f64 {
        self.config.inches(px)
    }
}

/// The rules of one phase.
pub trait PhaseRules: Send + Sync {
    fn phase(&self) -> Phase;

    /// Records the changes made when the phase begins.
    fn on_enter(&self, _state: &GameState, _ctx: &RulesContext, _set: &mut ChangeSet) -> Result<(), StateError> {
        Ok(())
    }

    /// Checks an action against the state. Never mutates anything.
    fn validate_action(&self, state: &GameState, action: &Action, ctx: &RulesContext) -> ValidationResult;

    /// Executes an action that has already passed validation.
    fn process_action(
        &self,
        state: &GameState,
        action: &Action,
        ctx: &RulesContext,
        dice: &mut dyn DiceRoller,
    ) -> Result<ExecutionResult, StateError>;

    /// Unit actions worth proposing for `player`. May include illegal ones;
    /// callers filter through `validate_action`.
    fn candidate_actions(&self, state: &GameState, player: Player, ctx: &RulesContext) -> Vec<Action>;

    /// True once the phase was ended explicitly or no unit of either player
    /// has a legal action left.
    fn should_complete_phase(&self, state: &GameState, ctx: &RulesContext) -> bool {
        state.ledger.ended || !self.has_remaining_actions(state, ctx)
    }

    fn has_remaining_actions(&self, state: &GameState, ctx: &RulesContext) -> bool {
        ALL_PLAYERS.into_iter().any(|player| {
            self.candidate_actions(state, player, ctx)
                .iter()
                .any(|action| self.validate_action(state, action, ctx).valid)
        })
    }

    /// Records the changes made when the phase ends.
    fn on_exit(&self, _state: &GameState, _ctx: &RulesContext, _set: &mut ChangeSet) -> Result<(), StateError> {
        Ok(())
    }
}

static DEPLOYMENT: deployment::DeploymentPhase = deployment::DeploymentPhase;
static COMMAND: command::CommandPhase = command::CommandPhase;
static MOVEMENT: movement::MovementPhase = movement::MovementPhase;
static SHOOTING: shooting::ShootingPhase = shooting::ShootingPhase;
static CHARGE: charge::ChargePhase = charge::ChargePhase;
static FIGHT: fight::FightPhase = fight::FightPhase;
static SCORING: scoring::ScoringPhase = scoring::ScoringPhase;

/// Rules indexed by `Phase::index`.
static PHASE_TABLE: [&dyn PhaseRules; 7] = [
    &DEPLOYMENT, &COMMAND, &MOVEMENT, &SHOOTING, &CHARGE, &FIGHT, &SCORING,
];

/// The rules governing `phase`.
pub fn rules_for(phase: Phase) -> &'static dyn PhaseRules {
    PHASE_TABLE[phase.index()]
}

/// Full validation of an action in the current phase.
///
/// Boundary checks (battle over, unknown ids, malformed coordinates) run
/// first; the phase's own rules only see well-formed actions.
pub fn validate(state: &GameState, action: &Action, ctx: &RulesContext) -> ValidationResult {
    if state.battle_over {
        return ValidationResult::rejected("the battle is over");
    }
    if let Some(id) = action.actor() {
        let Some(unit) = state.unit(id) else {
            return ValidationResult::not_found(format!("unknown unit '{id}'"));
        };
        if let Some(placements) = action.placements() {
            for p in placements {
                if !p.x.is_finite() || !p.y.is_finite() || !p.rotation.is_finite() {
                    return ValidationResult::malformed(format!(
                        "placement for model '{}' has a non-numeric coordinate",
                        p.model_id
                    ));
                }
                if unit.model(&p.model_id).is_none() {
                    return ValidationResult::not_found(format!(
                        "unit '{id}' has no model '{}'",
                        p.model_id
                    ));
                }
            }
        }
    }
    let referenced: &[UnitId] = match action {
        Action::Shoot { target_id, .. } | Action::Overwatch { target_id, .. } | Action::Fight { target_id, .. } => {
            std::slice::from_ref(target_id)
        }
        Action::DeclareCharge { target_ids, .. } => target_ids,
        _ => &[],
    };
    if let Some(missing) = referenced.iter().find(|t| state.unit(t).is_none()) {
        return ValidationResult::not_found(format!("unknown target unit '{missing}'"));
    }
    rules_for(state.phase).validate_action(state, action, ctx)
}

/// Legal actions for `player`, in a stable order. An explicit end of phase
/// is listed last when it is legal.
pub fn available_actions(state: &GameState, player: Player, ctx: &RulesContext) -> Vec<Action> {
    if state.battle_over {
        return Vec::new();
    }
    let rules = rules_for(state.phase);
    let mut actions: Vec<Action> = rules
        .candidate_actions(state, player, ctx)
        .into_iter()
        .filter(|a| validate(state, a, ctx).valid)
        .collect();
    let end = Action::EndPhase { player };
    if validate(state, &end, ctx).valid {
        actions.push(end);
    }
    actions
}

/// Looks up the acting unit, mapping an unknown id to a verdict.
pub(crate) fn actor<'s>(state: &'s GameState, id: &UnitId) -> Result<&'s Unit, ValidationResult> {
    state
        .unit(id)
        .ok_or_else(|| ValidationResult::not_found(format!("unknown unit '{id}'")))
}

/// Verdict for an action kind the current phase does not handle.
pub(crate) fn wrong_phase(phase: Phase, action: &Action) -> ValidationResult {
    ValidationResult::rejected(format!("{} is not allowed in the {phase} phase", action.kind()))
}

/// Shared checks for ending a phase: only the active player may do it.
pub(crate) fn check_end_phase(state: &GameState, player: Player, checks: &mut Checks) {
    checks.require(player == state.active_player, || {
        format!("only {} may end the {} phase", state.active_player, state.phase)
    });
    checks.require(!state.ledger.ended, || format!("the {} phase has already ended", state.phase));
}

/// Executes an explicit end of phase.
pub(crate) fn process_end_phase(state: &GameState, player: Player) -> Result<ExecutionResult, StateError> {
    let mut set = ChangeSet::new(state);
    set.end_phase()?;
    set.note(format!("{player} ended the {} phase", state.phase));
    Ok(set.finish())
}

/// Checks that the acting unit belongs to `player` and is on the table.
pub(crate) fn check_owned_active(unit: &Unit, player: Player, checks: &mut Checks) {
    checks.require(unit.owner == player, || format!("unit '{}' does not belong to {player}", unit.id));
    checks.require(unit.is_active(), || {
        format!("unit '{}' is {} and cannot act", unit.id, unit.status)
    });
}
