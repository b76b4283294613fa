//! Skirmish rules engine library.
//!
//! Exposes the battle state, the phase rules and controller, mission
//! scoring, dice, the protocol codecs and the built-in scenarios for use by
//! integration tests and the binary entry points.

pub mod board;
pub mod config;
pub mod dice;
pub mod engine;
pub mod error;
pub mod mission;
pub mod phase;
pub mod protocol;
pub mod scenario;
pub mod selfplay;
