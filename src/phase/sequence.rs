//! Phase sequencing.
//!
//! Determines the phase that follows the current one and moves the state
//! onto it.
//!
//! Flow:
//! - Deployment -> Command (player one, round 1)
//! - Command -> Movement -> Shooting -> Charge -> Fight -> Scoring
//! - Scoring (player one) -> Command (player two, same round)
//! - Scoring (player two) -> Command (player one, next round), or the end
//!   of the battle after the last round

use serde::{Deserialize, Serialize};

use crate::board::{GameState, Phase, PhaseLedger, Player, UnitStatus, ALL_PLAYERS};
use crate::config::RulesConfig;

/// Where the battle goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub phase: Phase,
    pub active_player: Player,
    pub battle_round: u32,
}

/// Computes the phase after the current one, or `None` if the battle ends.
pub fn next_phase(state: &GameState, config: &RulesConfig) -> Option<Transition> {
    let round = state.battle_round;
    let active = state.active_player;
    let within_turn = |phase| Transition { phase, active_player: active, battle_round: round };
    let next = match state.phase {
        Phase::Deployment => Transition {
            phase: Phase::Command,
            active_player: Player::One,
            battle_round: 1,
        },
        Phase::Command => within_turn(Phase::Movement),
        Phase::Movement => within_turn(Phase::Shooting),
        Phase::Shooting => within_turn(Phase::Charge),
        Phase::Charge => within_turn(Phase::Fight),
        Phase::Fight => within_turn(Phase::Scoring),
        Phase::Scoring => return after_scoring(state, config),
    };
    Some(next)
}

fn after_scoring(state: &GameState, config: &RulesConfig) -> Option<Transition> {
    if tabled(state).is_some() {
        return None;
    }
    match state.active_player {
        Player::One => Some(Transition {
            phase: Phase::Command,
            active_player: Player::Two,
            battle_round: state.battle_round,
        }),
        Player::Two if state.battle_round >= config.max_battle_rounds => None,
        Player::Two => Some(Transition {
            phase: Phase::Command,
            active_player: Player::One,
            battle_round: state.battle_round + 1,
        }),
    }
}

/// A player with no unit left on the table or in reserve.
pub fn tabled(state: &GameState) -> Option<Player> {
    ALL_PLAYERS.into_iter().find(|&p| {
        !state
            .units_of(p)
            .any(|u| u.status != UnitStatus::Destroyed && u.models.iter().any(|m| m.alive))
    })
}

/// Moves the state onto `next` with a fresh phase ledger.
pub fn advance_state(state: &mut GameState, next: &Transition) {
    state.phase = next.phase;
    state.active_player = next.active_player;
    state.battle_round = next.battle_round;
    state.ledger = PhaseLedger::default();
}
