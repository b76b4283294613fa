//! Game state representation.
//!
//! Holds the canonical, serializable snapshot of a battle: round, phase and
//! active player, every unit keyed by id, the board, per-player command and
//! victory points, and the ledger of what each unit has done in the current
//! phase. The state is only ever mutated by applying change-lists.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::change::StateChange;
use super::geometry::Point;
use super::unit::{Player, Unit, UnitId, UnitStatus, MAX_WEAPON_ATTACKS};
use crate::error::StateError;

/// A phase of a player turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Deployment,
    Command,
    Movement,
    Shooting,
    Charge,
    Fight,
    Scoring,
}

pub const ALL_PHASES: [Phase; 7] = [
    Phase::Deployment,
    Phase::Command,
    Phase::Movement,
    Phase::Shooting,
    Phase::Charge,
    Phase::Fight,
    Phase::Scoring,
];

impl Phase {
    pub const fn name(self) -> &'static str {
        match self {
            Phase::Deployment => "deployment",
            Phase::Command => "command",
            Phase::Movement => "movement",
            Phase::Shooting => "shooting",
            Phase::Charge => "charge",
            Phase::Fight => "fight",
            Phase::Scoring => "scoring",
        }
    }

    pub fn from_name(name: &str) -> Option<Phase> {
        ALL_PHASES.into_iter().find(|p| p.name() == name)
    }

    /// Position of the phase in the phase table.
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentZone {
    pub player: Player,
    pub polygon: Vec<Point>,
}

/// A terrain piece. Impassable terrain blocks movement paths and end
/// positions; obscuring terrain blocks line of sight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainFeature {
    pub id: String,
    pub footprint: Vec<Point>,
    #[serde(default)]
    pub impassable: bool,
    #[serde(default)]
    pub obscuring: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub id: String,
    pub position: Point,
}

/// Board dimensions (board units) and static features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub deployment_zones: Vec<DeploymentZone>,
    #[serde(default)]
    pub terrain: Vec<TerrainFeature>,
    #[serde(default)]
    pub objectives: Vec<Objective>,
}

impl Board {
    pub fn new(width: f64, height: f64) -> Self {
        Board {
            width,
            height,
            deployment_zones: Vec::new(),
            terrain: Vec::new(),
            objectives: Vec::new(),
        }
    }

    pub fn zone_for(&self, player: Player) -> Option<&DeploymentZone> {
        self.deployment_zones.iter().find(|z| z.player == player)
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= 0.0 && point.y >= 0.0 && point.x <= self.width && point.y <= self.height
    }

    pub fn impassable(&self) -> impl Iterator<Item = &TerrainFeature> + '_ {
        self.terrain.iter().filter(|t| t.impassable)
    }

    pub fn obscuring(&self) -> impl Iterator<Item = &TerrainFeature> + '_ {
        self.terrain.iter().filter(|t| t.obscuring)
    }
}

/// Battle-wide flags read by scoring rules.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalFlags {
    /// Objective picked by the opponent for the tempting-target secondary.
    pub tempting_target: Option<String>,
}

/// What a unit has done so far in the current phase.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Idle,
    Tested,
    Advancing {
        bonus: u8,
    },
    Moved,
    Advanced,
    FellBack,
    Stationary,
    Shot,
    ChargeDeclared {
        targets: Vec<UnitId>,
    },
    ChargeRolled {
        targets: Vec<UnitId>,
        total: u8,
        reachable: Vec<UnitId>,
    },
    ChargeFailed {
        total: u8,
    },
    Charged,
    ChargeSkipped,
    PiledIn,
    Fought,
    Consolidated,
}

/// A unit's position in the charge sub-protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChargeState {
    Eligible,
    Declared,
    RolledSuccess,
    RolledFail,
    Moved,
    Skipped,
}

impl ChargeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ChargeState::Moved | ChargeState::Skipped)
    }
}

impl Activation {
    /// Maps the activation onto the charge state machine, if it belongs to it.
    pub fn charge_state(&self) -> Option<ChargeState> {
        match self {
            Activation::Idle => Some(ChargeState::Eligible),
            Activation::ChargeDeclared { .. } => Some(ChargeState::Declared),
            Activation::ChargeRolled { .. } => Some(ChargeState::RolledSuccess),
            Activation::ChargeFailed { .. } => Some(ChargeState::RolledFail),
            Activation::Charged => Some(ChargeState::Moved),
            Activation::ChargeSkipped => Some(ChargeState::Skipped),
            _ => None,
        }
    }
}

/// Phase-local bookkeeping, reset whenever a phase is entered.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseLedger {
    pub activations: BTreeMap<UnitId, Activation>,
    /// Set by an explicit end-of-phase action.
    pub ended: bool,
    /// Player choosing the next unit to fight once chargers are done.
    pub fight_selector: Option<Player>,
}

const IDLE: Activation = Activation::Idle;

/// Complete battle state at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub battle_round: u32,
    pub active_player: Player,
    pub phase: Phase,
    pub units: BTreeMap<UnitId, Unit>,
    pub board: Board,
    #[serde(default)]
    pub flags: GlobalFlags,
    #[serde(default)]
    pub command_points: [u32; 2],
    #[serde(default)]
    pub victory_points: [u32; 2],
    #[serde(default)]
    pub ledger: PhaseLedger,
    #[serde(default)]
    pub battle_over: bool,
}

impl GameState {
    /// Creates a battle at the start of deployment with no units.
    pub fn new(board: Board) -> Self {
        GameState {
            battle_round: 1,
            active_player: Player::One,
            phase: Phase::Deployment,
            units: BTreeMap::new(),
            board,
            flags: GlobalFlags::default(),
            command_points: [0; 2],
            victory_points: [0; 2],
            ledger: PhaseLedger::default(),
            battle_over: false,
        }
    }

    pub fn add_unit(&mut self, unit: Unit) {
        self.units.insert(unit.id.clone(), unit);
    }

    pub fn unit(&self, id: &UnitId) -> Option<&Unit> {
        self.units.get(id)
    }

    pub fn units_of(&self, player: Player) -> impl Iterator<Item = &Unit> + '_ {
        self.units.values().filter(move |u| u.owner == player)
    }

    /// Deployed units of `player` with at least one living model.
    pub fn active_units_of(&self, player: Player) -> impl Iterator<Item = &Unit> + '_ {
        self.units_of(player).filter(|u| u.is_active())
    }

    pub fn activation(&self, id: &UnitId) -> &Activation {
        self.ledger.activations.get(id).unwrap_or(&IDLE)
    }

    pub fn command_points(&self, player: Player) -> u32 {
        self.command_points[player.index()]
    }

    pub fn victory_points(&self, player: Player) -> u32 {
        self.victory_points[player.index()]
    }

    /// The player ahead on victory points, or `None` on a tie.
    pub fn leader(&self) -> Option<Player> {
        let (one, two) = (self.victory_points[0], self.victory_points[1]);
        match one.cmp(&two) {
            std::cmp::Ordering::Greater => Some(Player::One),
            std::cmp::Ordering::Less => Some(Player::Two),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Applies a change after checking its `before` value against the state.
    pub fn apply(&mut self, change: &StateChange) -> Result<(), StateError> {
        self.audit(change)?;
        self.apply_unchecked(change)
    }

    /// Applies every change in order, stopping at the first failure.
    pub fn apply_all(&mut self, changes: &[StateChange]) -> Result<(), StateError> {
        for change in changes {
            self.apply(change)?;
        }
        Ok(())
    }

    fn unit_mut(&mut self, id: &UnitId) -> Result<&mut Unit, StateError> {
        self.units
            .get_mut(id)
            .ok_or_else(|| StateError::UnknownUnit(id.to_string()))
    }

    fn model_ref(&self, unit: &UnitId, model: &super::unit::ModelId) -> Result<&super::unit::Model, StateError> {
        let u = self.unit(unit).ok_or_else(|| StateError::UnknownUnit(unit.to_string()))?;
        u.model(model).ok_or_else(|| StateError::UnknownModel {
            unit: unit.to_string(),
            model: model.to_string(),
        })
    }

    /// Checks that the change's `before` value matches the current state.
    fn audit(&self, change: &StateChange) -> Result<(), StateError> {
        fn stale(field: String, expected: impl fmt::Debug, found: impl fmt::Debug) -> StateError {
            StateError::StaleChange {
                field,
                expected: format!("{expected:?}"),
                found: format!("{found:?}"),
            }
        }

        match change {
            StateChange::Status { unit, before, after } => {
                let u = self.unit(unit).ok_or_else(|| StateError::UnknownUnit(unit.to_string()))?;
                if u.status != *before {
                    return Err(stale(format!("{unit}.status"), before, u.status));
                }
                if !before.can_become(*after) {
                    return Err(StateError::StatusRegression {
                        unit: unit.to_string(),
                        from: before.to_string(),
                        to: after.to_string(),
                    });
                }
            }
            StateChange::Flag { unit, flag, before, .. } => {
                let u = self.unit(unit).ok_or_else(|| StateError::UnknownUnit(unit.to_string()))?;
                if u.flags.get(*flag) != *before {
                    return Err(stale(format!("{unit}.{}", flag.name()), before, u.flags.get(*flag)));
                }
            }
            StateChange::ModelPosition { unit, model, before, before_rotation, .. } => {
                let m = self.model_ref(unit, model)?;
                if m.position != *before || m.rotation != *before_rotation {
                    return Err(stale(format!("{model}.position"), (before, before_rotation), (m.position, m.rotation)));
                }
            }
            StateChange::ModelWounds { unit, model, before, .. } => {
                let m = self.model_ref(unit, model)?;
                if m.wounds != *before {
                    return Err(stale(format!("{model}.wounds"), before, m.wounds));
                }
            }
            StateChange::ModelAlive { unit, model, before, .. } => {
                let m = self.model_ref(unit, model)?;
                if m.alive != *before {
                    return Err(stale(format!("{model}.alive"), before, m.alive));
                }
            }
            StateChange::UnitActivation { unit, before, .. } => {
                if self.unit(unit).is_none() {
                    return Err(StateError::UnknownUnit(unit.to_string()));
                }
                let found = self.activation(unit);
                if found != before {
                    return Err(stale(format!("{unit}.activation"), before, found));
                }
            }
            StateChange::FightSelector { before, .. } => {
                if self.ledger.fight_selector != *before {
                    return Err(stale("fight_selector".to_string(), before, self.ledger.fight_selector));
                }
            }
            StateChange::PhaseEnded { before, .. } => {
                if self.ledger.ended != *before {
                    return Err(stale("phase_ended".to_string(), before, self.ledger.ended));
                }
            }
            StateChange::ActivePlayer { before, .. } => {
                if self.active_player != *before {
                    return Err(stale("active_player".to_string(), before, self.active_player));
                }
            }
            StateChange::CommandPoints { player, before, .. } => {
                if self.command_points(*player) != *before {
                    return Err(stale(format!("{player} command points"), before, self.command_points(*player)));
                }
            }
            StateChange::VictoryPoints { player, before, .. } => {
                if self.victory_points(*player) != *before {
                    return Err(stale(format!("{player} victory points"), before, self.victory_points(*player)));
                }
            }
        }
        Ok(())
    }

    /// Applies a change without auditing its `before` value.
    pub(crate) fn apply_unchecked(&mut self, change: &StateChange) -> Result<(), StateError> {
        match change {
            StateChange::Status { unit, after, .. } => {
                self.unit_mut(unit)?.status = *after;
            }
            StateChange::Flag { unit, flag, after, .. } => {
                self.unit_mut(unit)?.flags.set(*flag, *after);
            }
            StateChange::ModelPosition { unit, model, after, after_rotation, .. } => {
                let u = self.unit_mut(unit)?;
                let unit_name = u.id.to_string();
                let m = u.model_mut(model).ok_or_else(|| StateError::UnknownModel {
                    unit: unit_name,
                    model: model.to_string(),
                })?;
                m.position = *after;
                m.rotation = *after_rotation;
            }
            StateChange::ModelWounds { unit, model, after, .. } => {
                let u = self.unit_mut(unit)?;
                let unit_name = u.id.to_string();
                let m = u.model_mut(model).ok_or_else(|| StateError::UnknownModel {
                    unit: unit_name,
                    model: model.to_string(),
                })?;
                m.wounds = *after;
            }
            StateChange::ModelAlive { unit, model, after, .. } => {
                let u = self.unit_mut(unit)?;
                let unit_name = u.id.to_string();
                let m = u.model_mut(model).ok_or_else(|| StateError::UnknownModel {
                    unit: unit_name,
                    model: model.to_string(),
                })?;
                m.alive = *after;
            }
            StateChange::UnitActivation { unit, after, .. } => {
                self.ledger.activations.insert(unit.clone(), after.clone());
            }
            StateChange::FightSelector { after, .. } => {
                self.ledger.fight_selector = *after;
            }
            StateChange::PhaseEnded { after, .. } => {
                self.ledger.ended = *after;
            }
            StateChange::ActivePlayer { after, .. } => {
                self.active_player = *after;
            }
            StateChange::CommandPoints { player, after, .. } => {
                self.command_points[player.index()] = *after;
            }
            StateChange::VictoryPoints { player, after, .. } => {
                self.victory_points[player.index()] = *after;
            }
        }
        Ok(())
    }

    /// Verifies the invariants every stored state must satisfy.
    pub fn check_invariants(&self) -> Result<(), StateError> {
        if self.battle_round == 0 {
            return Err(StateError::InvalidRound);
        }
        let b = &self.board;
        if !(b.width.is_finite() && b.height.is_finite() && b.width > 0.0 && b.height > 0.0) {
            return Err(StateError::InvalidBoard);
        }

        for (key, unit) in &self.units {
            if key != &unit.id {
                return Err(StateError::IdMismatch {
                    key: key.to_string(),
                    actual: unit.id.to_string(),
                });
            }

            let profile = &unit.profile;
            let oversized = profile.ranged.iter().chain(&profile.melee).find(|w| w.attacks > MAX_WEAPON_ATTACKS);
            if let Some(weapon) = oversized {
                return Err(StateError::AttacksExceeded {
                    unit: unit.id.to_string(),
                    weapon: weapon.name.clone(),
                    attacks: weapon.attacks,
                    max: MAX_WEAPON_ATTACKS,
                });
            }

            let mut seen = HashSet::new();
            for model in &unit.models {
                let names = || (unit.id.to_string(), model.id.to_string());
                if !seen.insert(&model.id) {
                    let (unit, model) = names();
                    return Err(StateError::DuplicateModel { unit, model });
                }
                if model.wounds > unit.profile.wounds {
                    let (unit_name, model_name) = names();
                    return Err(StateError::WoundsExceeded {
                        unit: unit_name,
                        model: model_name,
                        wounds: model.wounds,
                        max: unit.profile.wounds,
                    });
                }
                if model.alive && model.wounds == 0 {
                    let (unit, model) = names();
                    return Err(StateError::AliveWithoutWounds { unit, model });
                }
                if !model.position.is_finite() || !model.rotation.is_finite() {
                    let (unit, model) = names();
                    return Err(StateError::NonFinitePosition { unit, model });
                }
                if unit.status == UnitStatus::Deployed && model.alive && !b.contains(model.position) {
                    let (unit, model) = names();
                    return Err(StateError::OffBoard { unit, model });
                }
            }

            let any_alive = unit.models.iter().any(|m| m.alive);
            match unit.status {
                UnitStatus::Destroyed if any_alive => {
                    return Err(StateError::DestroyedWithLivingModels(unit.id.to_string()));
                }
                UnitStatus::Deployed if !any_alive => {
                    return Err(StateError::DeployedWithoutModels(unit.id.to_string()));
                }
                _ => {}
            }
        }
        Ok(())
    }
}
