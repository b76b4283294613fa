//! Error types for the engine.
//!
//! Rule violations are not errors: they come back as data inside a
//! `ValidationResult`. The types here cover the boundary (unknown ids,
//! undecodable payloads, I/O) and state corruption, the only fatal class.

use thiserror::Error;

use crate::config::ConfigError;

/// An invariant violated by a stored or restored game state.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StateError {
    #[error("battle round must be at least 1")]
    InvalidRound,

    #[error("board dimensions must be positive and finite")]
    InvalidBoard,

    #[error("unit '{actual}' is stored under key '{key}'")]
    IdMismatch { key: String, actual: String },

    #[error("unit '{unit}' has duplicate model id '{model}'")]
    DuplicateModel { unit: String, model: String },

    #[error("model '{model}' of unit '{unit}' has {wounds} wounds, profile allows {max}")]
    WoundsExceeded {
        unit: String,
        model: String,
        wounds: u32,
        max: u32,
    },

    #[error("model '{model}' of unit '{unit}' is alive with zero wounds")]
    AliveWithoutWounds { unit: String, model: String },

    #[error("weapon '{weapon}' of unit '{unit}' has {attacks} attacks, at most {max} allowed")]
    AttacksExceeded {
        unit: String,
        weapon: String,
        attacks: u32,
        max: u32,
    },

    #[error("unit '{0}' is destroyed but still has living models")]
    DestroyedWithLivingModels(String),

    #[error("unit '{0}' is deployed but has no living models")]
    DeployedWithoutModels(String),

    #[error("model '{model}' of unit '{unit}' has a non-finite position")]
    NonFinitePosition { unit: String, model: String },

    #[error("model '{model}' of unit '{unit}' is deployed off the board")]
    OffBoard { unit: String, model: String },

    #[error("unknown unit '{0}'")]
    UnknownUnit(String),

    #[error("unknown model '{model}' in unit '{unit}'")]
    UnknownModel { unit: String, model: String },

    #[error("stale change to {field}: expected {expected}, found {found}")]
    StaleChange {
        field: String,
        expected: String,
        found: String,
    },

    #[error("status of unit '{unit}' cannot go from {from} to {to}")]
    StatusRegression { unit: String, from: String, to: String },

    #[error("replaying {entries} log entries does not reproduce the live state")]
    ReplayDiverged { entries: usize },
}

/// Errors surfaced by the engine to its callers.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("state corrupt: {0}")]
    StateCorrupt(#[from] StateError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// True for errors that must end the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::StateCorrupt(_) | EngineError::Io(_))
    }
}
