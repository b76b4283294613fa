//! Mission scoring.
//!
//! A mission awards victory points when the controller fires one of the
//! scoring hooks. Objective control is decided here so every mission
//! counts it the same way.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::board::{GameState, Objective, Player};
use crate::phase::RulesContext;

/// Points in the turn at which missions score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringHook {
    CommandPhaseEnd,
    EndOfYourTurn,
    EndOfEitherTurn,
    WhileActive,
}

impl ScoringHook {
    pub const fn name(self) -> &'static str {
        match self {
            ScoringHook::CommandPhaseEnd => "command_phase_end",
            ScoringHook::EndOfYourTurn => "end_of_your_turn",
            ScoringHook::EndOfEitherTurn => "end_of_either_turn",
            ScoringHook::WhileActive => "while_active",
        }
    }
}

impl fmt::Display for ScoringHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VictoryPointAward {
    pub player: Player,
    pub points: u32,
    pub reason: String,
}

/// Scores a mission. Implementations must not mutate anything; the
/// controller turns awards into victory point changes.
pub trait MissionScoringEngine: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, hook: ScoringHook, state: &GameState, ctx: &RulesContext, player: Player) -> Vec<VictoryPointAward>;
}

/// Total objective control `player` has on `objective`. Battle-shocked
/// units count for nothing.
pub fn objective_control(state: &GameState, ctx: &RulesContext, objective: &Objective, player: Player) -> u32 {
    let range = ctx.px(ctx.config.objective_range);
    state
        .active_units_of(player)
        .filter(|u| !u.flags.battle_shocked)
        .map(|u| {
            let in_range = u
                .alive_models()
                .filter(|m| ctx.geometry.distance_to_point(&m.footprint(), objective.position) <= range)
                .count() as u32;
            in_range * u.profile.objective_control
        })
        .sum()
}

/// The player with strictly more objective control on `objective`.
pub fn objective_controller(state: &GameState, ctx: &RulesContext, objective: &Objective) -> Option<Player> {
    let one = objective_control(state, ctx, objective, Player::One);
    let two = objective_control(state, ctx, objective, Player::Two);
    match one.cmp(&two) {
        std::cmp::Ordering::Greater => Some(Player::One),
        std::cmp::Ordering::Less => Some(Player::Two),
        std::cmp::Ordering::Equal => None,
    }
}

pub fn controlled_objectives<'s>(state: &'s GameState, ctx: &RulesContext, player: Player) -> Vec<&'s Objective> {
    state
        .board
        .objectives
        .iter()
        .filter(|o| objective_controller(state, ctx, o) == Some(player))
        .collect()
}

/// Primary: hold objectives at the end of your command phase.
/// Secondary: hold the tempting target at the end of your turn.
#[derive(Debug, Clone)]
pub struct TakeAndHold {
    pub points_per_objective: u32,
    pub primary_cap: u32,
    pub first_scoring_round: u32,
    pub tempting_target_points: u32,
}

impl Default for TakeAndHold {
    fn default() -> Self {
        TakeAndHold {
            points_per_objective: 5,
            primary_cap: 15,
            first_scoring_round: 2,
            tempting_target_points: 5,
        }
    }
}

impl MissionScoringEngine for TakeAndHold {
    fn name(&self) -> &str {
        "take_and_hold"
    }

    fn score(&self, hook: ScoringHook, state: &GameState, ctx: &RulesContext, player: Player) -> Vec<VictoryPointAward> {
        match hook {
            ScoringHook::CommandPhaseEnd if state.battle_round >= self.first_scoring_round => {
                let held = controlled_objectives(state, ctx, player);
                let points = (held.len() as u32 * self.points_per_objective).min(self.primary_cap);
                if points == 0 {
                    return Vec::new();
                }
                let names: Vec<&str> = held.iter().map(|o| o.id.as_str()).collect();
                vec![VictoryPointAward {
                    player,
                    points,
                    reason: format!("holds {}", names.join(", ")),
                }]
            }
            ScoringHook::EndOfYourTurn => {
                let Some(target) = state.flags.tempting_target.as_deref() else {
                    return Vec::new();
                };
                let held = state
                    .board
                    .objectives
                    .iter()
                    .find(|o| o.id == target)
                    .is_some_and(|o| objective_controller(state, ctx, o) == Some(player));
                if held {
                    vec![VictoryPointAward {
                        player,
                        points: self.tempting_target_points,
                        reason: format!("took the tempting target {target}"),
                    }]
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }
}

/// Awards nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMission;

impl MissionScoringEngine for NoMission {
    fn name(&self) -> &str {
        "none"
    }

    fn score(&self, _hook: ScoringHook, _state: &GameState, _ctx: &RulesContext, _player: Player) -> Vec<VictoryPointAward> {
        Vec::new()
    }
}

/// Looks a mission up by the name it reports.
pub fn mission_by_name(name: &str) -> Option<Arc<dyn MissionScoringEngine>> {
    match name {
        "take_and_hold" => Some(Arc::new(TakeAndHold::default())),
        "none" => Some(Arc::new(NoMission)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BaseShape, Board, PlanarGeometry, Point, Unit, UnitId, UnitProfile, UnitStatus};
    use crate::config::RulesConfig;

    fn unit(id: &str, owner: Player, count: usize, at: Point) -> Unit {
        let profile = UnitProfile {
            movement: 6.0,
            toughness: 4,
            save: 3,
            wounds: 1,
            leadership: 6,
            objective_control: 2,
            ranged: vec![],
            melee: vec![],
        };
        let mut unit = Unit::new(id, id, owner, profile, BaseShape::infantry(), count);
        unit.status = UnitStatus::Deployed;
        for (i, m) in unit.models.iter_mut().enumerate() {
            m.position = at.offset(60.0 * i as f64, 0.0);
        }
        unit
    }

    fn state() -> GameState {
        let mut board = Board::new(2400.0, 1760.0);
        board.objectives = vec![
            Objective { id: "north".to_string(), position: Point::new(500.0, 500.0) },
            Objective { id: "south".to_string(), position: Point::new(500.0, 1200.0) },
        ];
        let mut state = GameState::new(board);
        state.battle_round = 2;
        state.add_unit(unit("a", Player::One, 2, Point::new(500.0, 520.0)));
        state.add_unit(unit("b", Player::Two, 1, Point::new(480.0, 1200.0)));
        state
    }

    #[test]
    fn greater_control_holds_the_objective() {
        let geometry = PlanarGeometry::new(40.0);
        let config = RulesConfig::default();
        let ctx = RulesContext::new(&geometry, &config);
        let mut s = state();
        let north = s.board.objectives[0].clone();
        assert_eq!(objective_controller(&s, &ctx, &north), Some(Player::One));

        s.add_unit(unit("c", Player::Two, 2, Point::new(470.0, 440.0)));
        assert_eq!(objective_controller(&s, &ctx, &north), None);

        s.units.get_mut(&UnitId::from("c")).unwrap().flags.battle_shocked = true;
        assert_eq!(objective_controller(&s, &ctx, &north), Some(Player::One));
    }

    #[test]
    fn take_and_hold_scores_from_round_two() {
        let geometry = PlanarGeometry::new(40.0);
        let config = RulesConfig::default();
        let ctx = RulesContext::new(&geometry, &config);
        let mission = TakeAndHold::default();
        let mut s = state();
        let awards = mission.score(ScoringHook::CommandPhaseEnd, &s, &ctx, Player::One);
        assert_eq!(awards.len(), 1);
        assert_eq!(awards[0].points, 5);

        s.battle_round = 1;
        assert!(mission.score(ScoringHook::CommandPhaseEnd, &s, &ctx, Player::One).is_empty());
        assert!(mission.score(ScoringHook::EndOfEitherTurn, &s, &ctx, Player::One).is_empty());
    }

    #[test]
    fn tempting_target_pays_its_holder() {
        let geometry = PlanarGeometry::new(40.0);
        let config = RulesConfig::default();
        let ctx = RulesContext::new(&geometry, &config);
        let mission = TakeAndHold::default();
        let mut s = state();
        s.flags.tempting_target = Some("south".to_string());
        assert!(mission.score(ScoringHook::EndOfYourTurn, &s, &ctx, Player::One).is_empty());
        let awards = mission.score(ScoringHook::EndOfYourTurn, &s, &ctx, Player::Two);
        assert_eq!(awards[0].points, 5);
    }

    #[test]
    fn missions_are_found_by_name() {
        assert_eq!(mission_by_name("take_and_hold").unwrap().name(), "take_and_hold");
        assert!(mission_by_name("none").is_some());
        assert!(mission_by_name("purge").is_none());
    }
}
