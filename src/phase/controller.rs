//! The phase controller.
//!
//! Owns the game state for the length of a battle and drives one phase at
//! a time: it captures the entry snapshot, runs submitted actions through
//! validation and execution, fires the mission's scoring hooks, and moves
//! on whenever the current phase reports completion.
//!
//! Every mutation goes through a change-list that is also appended to the
//! log, so `replay` can rebuild the final state from the initial one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::board::{
    Action, ChangeSet, ExecutionResult, GameState, GeometryService, Phase, PlanarGeometry, Player, StateChange,
    ALL_PLAYERS,
};
use crate::config::RulesConfig;
use crate::dice::DiceRoller;
use crate::error::{EngineError, StateError};
use crate::mission::{MissionScoringEngine, ScoringHook, TakeAndHold, VictoryPointAward};

use super::sequence::{advance_state, next_phase, Transition};
use super::validation::ValidationResult;
use super::{available_actions, rules_for, validate, RulesContext};

/// Collaborators handed to the controller.
#[derive(Clone)]
pub struct Services {
    pub geometry: Arc<dyn GeometryService>,
    pub mission: Arc<dyn MissionScoringEngine>,
    pub config: RulesConfig,
}

impl Services {
    /// Planar geometry at the configured scale and the take-and-hold mission.
    pub fn new(config: RulesConfig) -> Self {
        Services {
            geometry: Arc::new(PlanarGeometry::new(config.px_per_inch)),
            mission: Arc::new(TakeAndHold::default()),
            config,
        }
    }

    pub fn with_mission(mut self, mission: Arc<dyn MissionScoringEngine>) -> Self {
        self.mission = mission;
        self
    }

    pub fn context(&self) -> RulesContext<'_> {
        RulesContext::new(self.geometry.as_ref(), &self.config)
    }
}

impl Default for Services {
    fn default() -> Self {
        Services::new(RulesConfig::default())
    }
}

/// One entry of the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEntry {
    PhaseEntered {
        battle_round: u32,
        active_player: Player,
        phase: Phase,
        changes: Vec<StateChange>,
    },
    ActionApplied {
        action: Action,
        changes: Vec<StateChange>,
        dice: Vec<u8>,
    },
    PhaseExited {
        phase: Phase,
        changes: Vec<StateChange>,
    },
    ScoringHookFired {
        hook: ScoringHook,
        player: Player,
        awards: Vec<VictoryPointAward>,
        changes: Vec<StateChange>,
    },
    BattleEnded {
        winner: Option<Player>,
    },
}

/// Verdict and, for accepted actions, the execution result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub validation: ValidationResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionResult>,
}

pub struct PhaseController {
    state: GameState,
    snapshot: GameState,
    initial: GameState,
    services: Services,
    dice: Box<dyn DiceRoller>,
    log: Vec<LogEntry>,
}

impl PhaseController {
    fn new(state: GameState, services: Services, dice: Box<dyn DiceRoller>) -> Result<Self, EngineError> {
        state.check_invariants()?;
        Ok(PhaseController {
            snapshot: state.clone(),
            initial: state.clone(),
            state,
            services,
            dice,
            log: Vec::new(),
        })
    }

    /// Begins a battle from `state`, entering its current phase.
    pub fn start(state: GameState, services: Services, dice: Box<dyn DiceRoller>) -> Result<Self, EngineError> {
        let mut controller = Self::new(state.clone(), services, dice)?;
        controller.enter_phase(state)?;
        Ok(controller)
    }

    /// Picks up a battle stored part-way through a phase. Entry effects of
    /// the current phase are not run again.
    pub fn resume(state: GameState, services: Services, dice: Box<dyn DiceRoller>) -> Result<Self, EngineError> {
        let mut controller = Self::new(state, services, dice)?;
        controller.settle()?;
        Ok(controller)
    }

    /// Enters the phase recorded in `state`: the ledger is reset, entry
    /// effects are applied, and the result becomes the phase snapshot. The
    /// log restarts from `state`.
    pub fn enter_phase(&mut self, state: GameState) -> Result<(), EngineError> {
        state.check_invariants()?;
        let here = Transition {
            phase: state.phase,
            active_player: state.active_player,
            battle_round: state.battle_round,
        };
        self.initial = state.clone();
        self.state = state;
        self.log.clear();
        self.enter(here)?;
        self.settle()
    }

    fn enter(&mut self, next: Transition) -> Result<(), EngineError> {
        let mut state = self.state.clone();
        advance_state(&mut state, &next);
        let changes = {
            let ctx = self.services.context();
            let mut set = ChangeSet::new(&state);
            rules_for(next.phase).on_enter(&state, &ctx, &mut set)?;
            set.finish().changes
        };
        state.apply_all(&changes)?;
        state.check_invariants()?;

        info!(
            round = next.battle_round,
            player = %next.active_player,
            phase = %next.phase,
            "phase entered"
        );
        self.snapshot = state.clone();
        self.state = state;
        self.log.push(LogEntry::PhaseEntered {
            battle_round: next.battle_round,
            active_player: next.active_player,
            phase: next.phase,
            changes,
        });
        Ok(())
    }

    /// Validates `action` and, if it is legal, executes and applies it.
    /// A rejected action changes nothing.
    pub fn submit(&mut self, action: Action) -> Result<SubmitOutcome, EngineError> {
        let ctx = self.services.context();
        let validation = validate(&self.state, &action, &ctx);
        if !validation.valid {
            debug!(kind = %action.kind(), reasons = ?validation.reasons, "action rejected");
            return Ok(SubmitOutcome { validation, execution: None });
        }

        let execution = rules_for(self.state.phase).process_action(&self.state, &action, &ctx, self.dice.as_mut())?;
        let mut next = self.state.clone();
        next.apply_all(&execution.changes)?;
        self.state = next;

        info!(
            kind = %action.kind(),
            changes = execution.changes.len(),
            dice = ?execution.dice,
            "action applied"
        );
        let active = self.state.active_player;
        self.log.push(LogEntry::ActionApplied {
            action,
            changes: execution.changes.clone(),
            dice: execution.dice.clone(),
        });
        self.fire_hook(ScoringHook::WhileActive, active)?;
        self.settle()?;
        Ok(SubmitOutcome { validation, execution: Some(execution) })
    }

    /// Finalises the current phase: exit effects, then the scoring hooks
    /// tied to the end of this phase. Failures are logged and skipped.
    pub fn exit_phase(&mut self) {
        let phase = self.state.phase;
        let player = self.state.active_player;
        if let Err(err) = self.run_exit(phase) {
            warn!(%phase, error = %err, "phase exit effects skipped");
        }

        let mut hooks = Vec::new();
        match phase {
            Phase::Command => hooks.push((ScoringHook::CommandPhaseEnd, player)),
            Phase::Scoring => {
                hooks.push((ScoringHook::EndOfYourTurn, player));
                hooks.extend(ALL_PLAYERS.into_iter().map(|p| (ScoringHook::EndOfEitherTurn, p)));
            }
            _ => {}
        }
        for (hook, p) in hooks {
            if let Err(err) = self.fire_hook(hook, p) {
                warn!(%hook, player = %p, error = %err, "scoring hook skipped");
            }
        }
        debug!(%phase, "phase exited");
    }

    fn run_exit(&mut self, phase: Phase) -> Result<(), StateError> {
        let changes = {
            let ctx = self.services.context();
            let mut set = ChangeSet::new(&self.state);
            rules_for(phase).on_exit(&self.state, &ctx, &mut set)?;
            set.finish().changes
        };
        if changes.is_empty() {
            return Ok(());
        }
        let mut next = self.state.clone();
        next.apply_all(&changes)?;
        self.state = next;
        self.log.push(LogEntry::PhaseExited { phase, changes });
        Ok(())
    }

    fn fire_hook(&mut self, hook: ScoringHook, player: Player) -> Result<(), StateError> {
        let awards = {
            let ctx = self.services.context();
            self.services.mission.score(hook, &self.state, &ctx, player)
        };
        if awards.is_empty() {
            return Ok(());
        }
        let mut set = ChangeSet::new(&self.state);
        for award in &awards {
            set.add_victory_points(award.player, award.points)?;
            info!(%hook, player = %award.player, points = award.points, reason = %award.reason, "victory points");
        }
        let changes = set.finish().changes;
        let mut next = self.state.clone();
        next.apply_all(&changes)?;
        self.state = next;
        self.log.push(LogEntry::ScoringHookFired { hook, player, awards, changes });
        Ok(())
    }

    /// Advances through every phase that reports completion.
    fn settle(&mut self) -> Result<(), EngineError> {
        while !self.state.battle_over && self.is_phase_complete() {
            self.exit_phase();
            match next_phase(&self.state, &self.services.config) {
                Some(next) => self.enter(next)?,
                None => {
                    self.state.battle_over = true;
                    let winner = self.state.leader();
                    info!(
                        round = self.state.battle_round,
                        vp_one = self.state.victory_points(Player::One),
                        vp_two = self.state.victory_points(Player::Two),
                        ?winner,
                        "battle ended"
                    );
                    self.log.push(LogEntry::BattleEnded { winner });
                }
            }
        }
        Ok(())
    }

    pub fn get_available_actions(&self, player: Player) -> Vec<Action> {
        available_actions(&self.state, player, &self.services.context())
    }

    pub fn current_phase(&self) -> Phase {
        self.state.phase
    }

    pub fn is_phase_complete(&self) -> bool {
        let ctx = self.services.context();
        rules_for(self.state.phase).should_complete_phase(&self.state, &ctx)
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// The state as it was when the current phase was entered.
    pub fn snapshot(&self) -> &GameState {
        &self.snapshot
    }

    pub fn initial(&self) -> &GameState {
        &self.initial
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn is_battle_over(&self) -> bool {
        self.state.battle_over
    }

    /// The player ahead on victory points once the battle is over.
    pub fn winner(&self) -> Option<Player> {
        if self.state.battle_over {
            self.state.leader()
        } else {
            None
        }
    }
}

/// Rebuilds the state reached by `log` from `initial`, auditing every
/// change against the value it expects to replace.
pub fn replay(initial: &GameState, log: &[LogEntry]) -> Result<GameState, StateError> {
    let mut state = initial.clone();
    for entry in log {
        match entry {
            LogEntry::PhaseEntered { battle_round, active_player, phase, changes } => {
                let next = Transition {
                    phase: *phase,
                    active_player: *active_player,
                    battle_round: *battle_round,
                };
                advance_state(&mut state, &next);
                state.apply_all(changes)?;
            }
            LogEntry::ActionApplied { changes, .. }
            | LogEntry::PhaseExited { changes, .. }
            | LogEntry::ScoringHookFired { changes, .. } => state.apply_all(changes)?,
            LogEntry::BattleEnded { .. } => state.battle_over = true,
        }
    }
    state.check_invariants()?;
    Ok(state)
}
