//! Scoring phase. Units take no actions here; mission hooks fire on exit.

use crate::board::{Action, ExecutionResult, GameState, Phase, Player};
use crate::dice::DiceRoller;
use crate::error::StateError;

use super::validation::{Checks, ValidationResult};
use super::{check_end_phase, process_end_phase, wrong_phase, PhaseRules, RulesContext};

pub struct ScoringPhase;

impl PhaseRules for ScoringPhase {
    fn phase(&self) -> Phase {
        Phase::Scoring
    }

    fn validate_action(&self, state: &GameState, action: &Action, _ctx: &RulesContext) -> ValidationResult {
        match action {
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
        _dice: &mut dyn DiceRoller,
    ) -> Result<ExecutionResult, StateError> {
        match action {
            Action::EndPhase { player } => process_end_phase(state, *player),
            _ => Ok(ExecutionResult::default()),
        }
    }

    fn candidate_actions(&self, _state: &GameState, _player: Player, _ctx: &RulesContext) -> Vec<Action> {
        Vec::new()
    }

    fn should_complete_phase(&self, _state: &GameState, _ctx: &RulesContext) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Board, PlanarGeometry};
    use crate::config::RulesConfig;

    #[test]
    fn completes_immediately_and_rejects_unit_actions() {
        let geometry = PlanarGeometry::new(40.0);
        let config = RulesConfig::default();
        let ctx = RulesContext::new(&geometry, &config);
        let mut state = GameState::new(Board::new(100.0, 100.0));
        state.phase = Phase::Scoring;
        assert!(ScoringPhase.should_complete_phase(&state, &ctx));
        let shoot = Action::Advance { unit_id: "a".into() };
        let v = ScoringPhase.validate_action(&state, &shoot, &ctx);
        assert!(v.reasons[0].contains("not allowed in the scoring phase"));
    }
}
