//! Board representation and game-state types.
//!
//! Contains the core data structures for base geometry, units and models,
//! actions, the battle state, and the change-lists that mutate it.

pub mod action;
pub mod change;
pub mod geometry;
pub mod state;
pub mod unit;

pub use action::{Action, ActionKind, ModelPlacement, ALL_ACTION_KINDS};
pub use change::{ChangeSet, ExecutionResult, StateChange};
pub use geometry::{BaseShape, Footprint, GeometryService, PlanarGeometry, Point, MM_PER_INCH};
pub use state::{
    Activation, Board, ChargeState, DeploymentZone, GameState, GlobalFlags, Objective, Phase,
    PhaseLedger, TerrainFeature, ALL_PHASES,
};
pub use unit::{
    Model, ModelId, Player, Unit, UnitFlag, UnitFlags, UnitId, UnitProfile, UnitStatus,
    WeaponProfile, ALL_FLAGS, ALL_PLAYERS, MAX_WEAPON_ATTACKS,
};
