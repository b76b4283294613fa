//! Field-level state changes and the change-set builder used by executors.
//!
//! Executors never mutate the live state. They record every mutation as a
//! `StateChange` carrying both the old and the new value, so the list can be
//! audited, logged, and replayed on top of the state it was produced from.

use serde::{Deserialize, Serialize};

use super::geometry::Point;
use super::state::{Activation, GameState};
use super::unit::{ModelId, Player, UnitFlag, UnitId, UnitStatus};
use crate::error::StateError;

/// A single field mutation with its before and after values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateChange {
    Status {
        unit: UnitId,
        before: UnitStatus,
        after: UnitStatus,
    },
    Flag {
        unit: UnitId,
        flag: UnitFlag,
        before: bool,
        after: bool,
    },
    ModelPosition {
        unit: UnitId,
        model: ModelId,
        before: Point,
        after: Point,
        #[serde(default)]
        before_rotation: f64,
        #[serde(default)]
        after_rotation: f64,
    },
    ModelWounds {
        unit: UnitId,
        model: ModelId,
        before: u32,
        after: u32,
    },
    ModelAlive {
        unit: UnitId,
        model: ModelId,
        before: bool,
        after: bool,
    },
    UnitActivation {
        unit: UnitId,
        before: Activation,
        after: Activation,
    },
    FightSelector {
        before: Option<Player>,
        after: Option<Player>,
    },
    PhaseEnded {
        before: bool,
        after: bool,
    },
    ActivePlayer {
        before: Player,
        after: Player,
    },
    CommandPoints {
        player: Player,
        before: u32,
        after: u32,
    },
    VictoryPoints {
        player: Player,
        before: u32,
        after: u32,
    },
}

impl StateChange {
    /// True if the change leaves the field as it was.
    pub fn is_noop(&self) -> bool {
        match self {
            StateChange::Status { before, after, .. } => before == after,
            StateChange::Flag { before, after, .. } | StateChange::ModelAlive { before, after, .. } => {
                before == after
            }
            StateChange::ModelPosition { before, after, before_rotation, after_rotation, .. } => {
                before == after && before_rotation == after_rotation
            }
            StateChange::ModelWounds { before, after, .. }
            | StateChange::CommandPoints { before, after, .. }
            | StateChange::VictoryPoints { before, after, .. } => before == after,
            StateChange::UnitActivation { before, after, .. } => before == after,
            StateChange::FightSelector { before, after } => before == after,
            StateChange::PhaseEnded { before, after } => before == after,
            StateChange::ActivePlayer { before, after } => before == after,
        }
    }
}

/// The outcome of executing one action.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub changes: Vec<StateChange>,
    /// Every die rolled while executing, in order.
    #[serde(default)]
    pub dice: Vec<u8>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Records changes against a scratch copy of the state.
///
/// Each setter reads the current value from the scratch state, records a
/// change if the value differs, and applies it to the scratch copy so later
/// reads in the same executor see it.
pub struct ChangeSet {
    scratch: GameState,
    changes: Vec<StateChange>,
    dice: Vec<u8>,
    notes: Vec<String>,
}

impl ChangeSet {
    pub fn new(state: &GameState) -> Self {
        ChangeSet {
            scratch: state.clone(),
            changes: Vec::new(),
            dice: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// The state with every recorded change applied.
    pub fn state(&self) -> &GameState {
        &self.scratch
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    fn push(&mut self, change: StateChange) -> Result<(), StateError> {
        if change.is_noop() {
            return Ok(());
        }
        self.scratch.apply(&change)?;
        self.changes.push(change);
        Ok(())
    }

    fn unit_ref(&self, unit: &UnitId) -> Result<&super::unit::Unit, StateError> {
        self.scratch
            .unit(unit)
            .ok_or_else(|| StateError::UnknownUnit(unit.to_string()))
    }

    fn model_ref(&self, unit: &UnitId, model: &ModelId) -> Result<&super::unit::Model, StateError> {
        self.unit_ref(unit)?
            .model(model)
            .ok_or_else(|| StateError::UnknownModel {
                unit: unit.to_string(),
                model: model.to_string(),
            })
    }

    pub fn set_status(&mut self, unit: &UnitId, status: UnitStatus) -> Result<(), StateError> {
        let before = self.unit_ref(unit)?.status;
        self.push(StateChange::Status { unit: unit.clone(), before, after: status })
    }

    pub fn set_flag(&mut self, unit: &UnitId, flag: UnitFlag, value: bool) -> Result<(), StateError> {
        let before = self.unit_ref(unit)?.flags.get(flag);
        self.push(StateChange::Flag { unit: unit.clone(), flag, before, after: value })
    }

    pub fn move_model(
        &mut self,
        unit: &UnitId,
        model: &ModelId,
        position: Point,
        rotation: f64,
    ) -> Result<(), StateError> {
        let m = self.model_ref(unit, model)?;
        let (before, before_rotation) = (m.position, m.rotation);
        self.push(StateChange::ModelPosition {
            unit: unit.clone(),
            model: model.clone(),
            before,
            after: position,
            before_rotation,
            after_rotation: rotation,
        })
    }

    pub fn set_wounds(&mut self, unit: &UnitId, model: &ModelId, wounds: u32) -> Result<(), StateError> {
        let before = self.model_ref(unit, model)?.wounds;
        self.push(StateChange::ModelWounds {
            unit: unit.clone(),
            model: model.clone(),
            before,
            after: wounds,
        })
    }

    pub fn set_alive(&mut self, unit: &UnitId, model: &ModelId, alive: bool) -> Result<(), StateError> {
        let before = self.model_ref(unit, model)?.alive;
        self.push(StateChange::ModelAlive {
            unit: unit.clone(),
            model: model.clone(),
            before,
            after: alive,
        })
    }

    pub fn set_activation(&mut self, unit: &UnitId, activation: Activation) -> Result<(), StateError> {
        self.unit_ref(unit)?;
        let before = self.scratch.activation(unit).clone();
        self.push(StateChange::UnitActivation { unit: unit.clone(), before, after: activation })
    }

    pub fn set_fight_selector(&mut self, selector: Option<Player>) -> Result<(), StateError> {
        let before = self.scratch.ledger.fight_selector;
        self.push(StateChange::FightSelector { before, after: selector })
    }

    pub fn end_phase(&mut self) -> Result<(), StateError> {
        let before = self.scratch.ledger.ended;
        self.push(StateChange::PhaseEnded { before, after: true })
    }

    pub fn set_active_player(&mut self, player: Player) -> Result<(), StateError> {
        let before = self.scratch.active_player;
        self.push(StateChange::ActivePlayer { before, after: player })
    }

    pub fn set_command_points(&mut self, player: Player, points: u32) -> Result<(), StateError> {
        let before = self.scratch.command_points(player);
        self.push(StateChange::CommandPoints { player, before, after: points })
    }

    pub fn add_command_points(&mut self, player: Player, points: u32) -> Result<(), StateError> {
        let current = self.scratch.command_points(player);
        self.set_command_points(player, current.saturating_add(points))
    }

    pub fn add_victory_points(&mut self, player: Player, points: u32) -> Result<(), StateError> {
        let before = self.scratch.victory_points(player);
        self.push(StateChange::VictoryPoints {
            player,
            before,
            after: before.saturating_add(points),
        })
    }

    pub fn record_dice(&mut self, dice: &[u8]) {
        self.dice.extend_from_slice(dice);
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Finishes the set and returns a successful result.
    pub fn finish(self) -> ExecutionResult {
        ExecutionResult {
            success: true,
            changes: self.changes,
            dice: self.dice,
            notes: self.notes,
        }
    }
}
