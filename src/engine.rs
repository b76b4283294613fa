//! Session state management.
//!
//! Holds the rules options, the dice seed, the starting position and the
//! running battle, and answers protocol commands on an output stream.
//! Rule violations are answered as `rejected` lines; only a corrupt state
//! or a broken output stream ends the session.

use std::fs;
use std::io::Write;
use std::sync::Arc;

use tracing::{info, warn};

use crate::board::{Action, GameState, Player};
use crate::config::{ConfigError, RulesConfig, OPTION_NAMES};
use crate::dice::{DiceRoller, SeededDice};
use crate::error::EngineError;
use crate::mission::{mission_by_name, MissionScoringEngine, TakeAndHold};
use crate::phase::{PhaseController, Services, SubmitOutcome, ValidationResult};
use crate::protocol::{decode_action, decode_state, encode_action, encode_state};
use crate::scenario;

const DEFAULT_MISSION: &str = "take_and_hold";

/// Holds the mutable state of the session between commands.
pub struct Engine {
    config: RulesConfig,
    mission: String,
    seed: Option<u64>,
    position: Option<GameState>,
    battle: Option<PhaseController>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Creates a session with default rules and no battle.
    pub fn new() -> Self {
        Engine {
            config: RulesConfig::default(),
            mission: DEFAULT_MISSION.to_string(),
            seed: None,
            position: None,
            battle: None,
        }
    }

    /// Creates a session with the given rules.
    pub fn with_config(config: RulesConfig) -> Self {
        Engine { config, ..Self::new() }
    }

    pub fn config(&self) -> &RulesConfig {
        &self.config
    }

    pub fn battle(&self) -> Option<&PhaseController> {
        self.battle.as_ref()
    }

    fn services(&self) -> Services {
        let mission: Arc<dyn MissionScoringEngine> = match mission_by_name(&self.mission) {
            Some(mission) => mission,
            None => Arc::new(TakeAndHold::default()),
        };
        Services::new(self.config.clone()).with_mission(mission)
    }

    fn dice(&self) -> Box<dyn DiceRoller> {
        match self.seed {
            Some(seed) => Box::new(SeededDice::new(seed)),
            None => Box::new(SeededDice::from_entropy()),
        }
    }

    fn controller(&mut self) -> Result<&mut PhaseController, EngineError> {
        self.battle
            .as_mut()
            .ok_or_else(|| EngineError::NotFound("battle in progress; send newgame, scenario or position".to_string()))
    }

    /// Sets a rules option. A missing value restores the default. New
    /// values apply to battles started afterwards.
    pub fn set_option(&mut self, name: &str, value: Option<&str>) -> Result<(), EngineError> {
        if name == "Mission" {
            let value = value.unwrap_or(DEFAULT_MISSION);
            if mission_by_name(value).is_none() {
                return Err(EngineError::NotFound(format!("mission '{value}'")));
            }
            self.mission = value.to_string();
            return Ok(());
        }
        let value = match value {
            Some(v) => v.to_string(),
            None => RulesConfig::default()
                .option_value(name)
                .ok_or_else(|| ConfigError::UnknownOption(name.to_string()))?,
        };
        self.config.set_option(name, &value)?;
        info!(option = name, value = %value, "option set");
        Ok(())
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = Some(seed);
    }

    /// Starts a battle from the current position, or from the built-in
    /// skirmish if no position has been set.
    pub fn new_game(&mut self) -> Result<(), EngineError> {
        let state = self.position.clone().unwrap_or_else(scenario::skirmish);
        let controller = PhaseController::start(state, self.services(), self.dice())?;
        info!(phase = %controller.current_phase(), "battle started");
        self.battle = Some(controller);
        Ok(())
    }

    /// Loads a built-in scenario and starts it.
    pub fn load_scenario(&mut self, name: &str) -> Result<(), EngineError> {
        let state = scenario::by_name(name).ok_or_else(|| EngineError::NotFound(format!("scenario '{name}'")))?;
        self.position = Some(state);
        self.new_game()
    }

    /// Resumes a battle from a JSON-encoded state. The current phase is
    /// picked up where the state left it.
    pub fn set_position(&mut self, json: &str) -> Result<(), EngineError> {
        let state = decode_state(json)?;
        let controller = PhaseController::resume(state.clone(), self.services(), self.dice())?;
        self.position = Some(state);
        self.battle = Some(controller);
        Ok(())
    }

    /// Resumes a battle stored in a file.
    pub fn load(&mut self, path: &str) -> Result<(), EngineError> {
        let text = fs::read_to_string(path).map_err(|e| EngineError::NotFound(format!("cannot read {path}: {e}")))?;
        self.set_position(&text)
    }

    /// Handles the handshake: writes id, options and `hellook`.
    pub fn handle_hello<W: Write>(&self, out: &mut W) -> Result<(), EngineError> {
        writeln!(out, "id name skirmish")?;
        writeln!(out, "id version {}", env!("CARGO_PKG_VERSION"))?;
        for name in OPTION_NAMES {
            let default = self.config.option_value(name).unwrap_or_default();
            writeln!(out, "option name {name} type string default {default}")?;
        }
        writeln!(out, "option name Mission type string default {}", self.mission)?;
        writeln!(out, "hellook")?;
        out.flush()?;
        Ok(())
    }

    pub fn handle_isready<W: Write>(&self, out: &mut W) -> Result<(), EngineError> {
        writeln!(out, "readyok")?;
        out.flush()?;
        Ok(())
    }

    /// Handles `submit <json>`. Payload errors are reported as rejections,
    /// the same way rule violations are.
    pub fn handle_submit<W: Write>(&mut self, json: &str, out: &mut W) -> Result<(), EngineError> {
        let outcome = match decode_action(json) {
            Ok(action) => self.controller()?.submit(action)?,
            Err(EngineError::NotFound(reason)) => rejection(ValidationResult::not_found(reason)),
            Err(EngineError::MalformedPayload(reason)) => rejection(ValidationResult::malformed(reason)),
            Err(other) => return Err(other),
        };
        write_outcome(out, &outcome)?;
        if outcome.validation.valid {
            self.handle_phase(out)?;
        }
        out.flush()?;
        Ok(())
    }

    /// Lists legal actions for `player`, or for the active player.
    pub fn handle_actions<W: Write>(&mut self, player: Option<Player>, out: &mut W) -> Result<(), EngineError> {
        let controller = self.controller()?;
        let player = player.unwrap_or(controller.state().active_player);
        let actions: Vec<Action> = if controller.is_battle_over() {
            Vec::new()
        } else {
            controller.get_available_actions(player)
        };
        for action in &actions {
            writeln!(out, "action {}", encode_action(action)?)?;
        }
        writeln!(out, "actionsok {}", actions.len())?;
        out.flush()?;
        Ok(())
    }

    /// Writes the phase line, and the result once the battle is over.
    pub fn handle_phase<W: Write>(&mut self, out: &mut W) -> Result<(), EngineError> {
        let controller = self.controller()?;
        let state = controller.state();
        writeln!(
            out,
            "phase {} round {} player {} complete {}",
            state.phase,
            state.battle_round,
            state.active_player.number(),
            controller.is_phase_complete()
        )?;
        if controller.is_battle_over() {
            let winner = match controller.winner() {
                Some(p) => p.number().to_string(),
                None => "draw".to_string(),
            };
            writeln!(
                out,
                "battleover winner {} vp {} {}",
                winner,
                state.victory_points(Player::One),
                state.victory_points(Player::Two)
            )?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn handle_state<W: Write>(&mut self, out: &mut W) -> Result<(), EngineError> {
        let json = encode_state(self.controller()?.state())?;
        writeln!(out, "state {json}")?;
        out.flush()?;
        Ok(())
    }

    /// Writes the audit log as one JSON entry per line.
    pub fn handle_log<W: Write>(&mut self, out: &mut W) -> Result<(), EngineError> {
        let controller = self.controller()?;
        for entry in controller.log() {
            let json = serde_json::to_string(entry).map_err(|e| EngineError::MalformedPayload(e.to_string()))?;
            writeln!(out, "log {json}")?;
        }
        writeln!(out, "logok {}", controller.log().len())?;
        out.flush()?;
        Ok(())
    }

    /// Reports a non-fatal error to the client.
    pub fn handle_error<W: Write>(&self, err: &EngineError, out: &mut W) -> Result<(), EngineError> {
        warn!(error = %err, "command failed");
        writeln!(out, "error {err}")?;
        out.flush()?;
        Ok(())
    }
}

fn rejection(validation: ValidationResult) -> SubmitOutcome {
    SubmitOutcome { validation, execution: None }
}

fn write_outcome<W: Write>(out: &mut W, outcome: &SubmitOutcome) -> Result<(), EngineError> {
    if let Some(execution) = outcome.execution.as_ref().filter(|_| outcome.validation.valid) {
        let json = serde_json::to_string(execution).map_err(|e| EngineError::MalformedPayload(e.to_string()))?;
        writeln!(out, "accepted {json}")?;
        return Ok(());
    }
    let kind = outcome.validation.kind.map(|k| k.name()).unwrap_or("VALIDATION_REJECTED");
    writeln!(out, "rejected {kind}")?;
    for reason in &outcome.validation.reasons {
        writeln!(out, "reason {reason}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(f: impl FnOnce(&mut Vec<u8>) -> Result<(), EngineError>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn handle_hello_lists_options() {
        let engine = Engine::new();
        let text = output(|out| engine.handle_hello(out));
        assert!(text.starts_with("id name skirmish\n"));
        assert!(text.contains("option name EngagementRange type string default 1\n"));
        assert!(text.contains("option name Mission type string default take_and_hold\n"));
        assert!(text.ends_with("hellook\n"));
    }

    #[test]
    fn set_option_updates_and_resets() {
        let mut engine = Engine::new();
        engine.set_option("MaxBattleRounds", Some("3")).unwrap();
        assert_eq!(engine.config().max_battle_rounds, 3);
        engine.set_option("MaxBattleRounds", None).unwrap();
        assert_eq!(engine.config().max_battle_rounds, 5);
        assert!(engine.set_option("Fog", Some("1")).is_err());
        assert!(engine.set_option("Mission", Some("capture")).is_err());
        engine.set_option("Mission", Some("none")).unwrap();
    }

    #[test]
    fn commands_without_battle_are_not_fatal() {
        let mut engine = Engine::new();
        let err = engine.handle_phase(&mut Vec::new()).unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn new_game_starts_in_deployment() {
        let mut engine = Engine::new();
        engine.set_seed(1);
        engine.new_game().unwrap();
        let text = output(|out| engine.handle_phase(out));
        assert_eq!(text, "phase deployment round 1 player 1 complete false\n");
        let actions = output(|out| engine.handle_actions(None, out));
        assert!(actions.lines().any(|l| l.starts_with("action {\"kind\":\"DEPLOY_UNIT\"")));
    }

    #[test]
    fn submit_reports_rejections() {
        let mut engine = Engine::new();
        engine.load_scenario("charge_duel").unwrap();

        let text = output(|out| engine.handle_submit(r#"{"kind":"TELEPORT","unit_id":"a"}"#, out));
        assert_eq!(text, "rejected NOT_FOUND\nreason unknown action kind 'TELEPORT'\n");

        let text = output(|out| engine.handle_submit("{", out));
        assert!(text.starts_with("rejected MALFORMED_PAYLOAD\n"));

        let text = output(|out| engine.handle_submit(r#"{"kind":"ROLL_CHARGE","unit_id":"a"}"#, out));
        assert!(text.starts_with("rejected VALIDATION_REJECTED\nreason "));
    }

    #[test]
    fn submit_accepts_declaration() {
        let mut engine = Engine::new();
        engine.set_seed(3);
        engine.load_scenario("charge_duel").unwrap();
        let text = output(|out| {
            engine.handle_submit(r#"{"kind":"DECLARE_CHARGE","unit_id":"a","target_ids":["b"]}"#, out)
        });
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("accepted {"));
        assert_eq!(lines.next().unwrap(), "phase charge round 1 player 1 complete false");
    }

    #[test]
    fn position_round_trips_through_state() {
        let mut engine = Engine::new();
        engine.load_scenario("skirmish").unwrap();
        let text = output(|out| engine.handle_state(out));
        let json = text.trim_end().strip_prefix("state ").unwrap().to_string();

        let mut other = Engine::new();
        other.set_position(&json).unwrap();
        assert_eq!(other.battle().unwrap().state(), engine.battle().unwrap().state());
    }

    #[test]
    fn corrupt_position_is_fatal() {
        let mut state = scenario::skirmish();
        state.battle_round = 0;
        let json = serde_json::to_string(&state).unwrap();
        let err = Engine::new().set_position(&json).unwrap_err();
        assert!(err.is_fatal());
        assert!(!Engine::new().set_position("{").unwrap_err().is_fatal());
    }

    #[test]
    fn missing_file_is_not_fatal() {
        let err = Engine::new().load("/nonexistent/battle.json").unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
