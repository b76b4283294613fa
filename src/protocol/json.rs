//! JSON encoding of game states and actions.
//!
//! States round-trip losslessly. Decoding a state re-runs the invariant
//! check, so a stored battle that has been tampered with or truncated is
//! reported as corrupt instead of being played on.
//!
//! Actions are tagged by `kind`:
//!
//! ```text
//! {"kind":"DECLARE_CHARGE","unit_id":"a","target_ids":["b"]}
//! ```

use serde_json::Value;

use crate::board::{Action, ActionKind, GameState};
use crate::error::EngineError;

pub fn encode_state(state: &GameState) -> Result<String, EngineError> {
    serde_json::to_string(state).map_err(|e| EngineError::MalformedPayload(e.to_string()))
}

pub fn encode_state_pretty(state: &GameState) -> Result<String, EngineError> {
    serde_json::to_string_pretty(state).map_err(|e| EngineError::MalformedPayload(e.to_string()))
}

/// Decodes and checks a state.
pub fn decode_state(text: &str) -> Result<GameState, EngineError> {
    let state: GameState =
        serde_json::from_str(text).map_err(|e| EngineError::MalformedPayload(format!("game state: {e}")))?;
    state.check_invariants()?;
    Ok(state)
}

pub fn encode_action(action: &Action) -> Result<String, EngineError> {
    serde_json::to_string(action).map_err(|e| EngineError::MalformedPayload(e.to_string()))
}

/// Decodes an action. An unknown `kind` is a missing reference; anything
/// else that does not fit the action's shape is a malformed payload.
pub fn decode_action(text: &str) -> Result<Action, EngineError> {
    let value: Value = serde_json::from_str(text).map_err(|e| EngineError::MalformedPayload(e.to_string()))?;
    let kind = match value.get("kind") {
        Some(Value::String(kind)) => kind.clone(),
        Some(_) => return Err(EngineError::MalformedPayload("'kind' must be a string".to_string())),
        None => return Err(EngineError::MalformedPayload("missing field 'kind'".to_string())),
    };
    if ActionKind::from_name(&kind).is_none() {
        return Err(EngineError::NotFound(format!("unknown action kind '{kind}'")));
    }
    serde_json::from_value(value).map_err(|e| EngineError::MalformedPayload(format!("{kind}: {e}")))
}
