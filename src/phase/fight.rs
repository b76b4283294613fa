//! Fight phase.
//!
//! Units of the active player that charged this turn fight first. After
//! that the players alternate, starting with the non-active player; a
//! player with no eligible unit passes the selection to the other. A unit
//! that piles in must fight before anyone else acts.

use tracing::debug;

use crate::board::{
    Action, Activation, ChangeSet, ExecutionResult, GameState, ModelPlacement, Phase, Player, Unit, UnitFlag,
    UnitId,
};
use crate::dice::DiceRoller;
use crate::error::StateError;

use super::combat::{resolve_attacks, AttackPool};
use super::shooting::describe;
use super::spatial;
use super::validation::{Checks, ValidationResult};
use super::{actor, check_end_phase, process_end_phase, wrong_phase, PhaseRules, RulesContext};

pub struct FightPhase;

/// True if `unit` is engaged and has yet to fight this phase.
fn eligible(state: &GameState, ctx: &RulesContext, unit: &Unit) -> bool {
    unit.is_active()
        && !unit.profile.melee.is_empty()
        && matches!(state.activation(&unit.id), Activation::Idle | Activation::PiledIn)
        && spatial::is_engaged(state, ctx, unit)
}

fn eligible_of<'s>(state: &'s GameState, ctx: &RulesContext, player: Player) -> Vec<&'s Unit> {
    state
        .active_units_of(player)
        .filter(|u| eligible(state, ctx, u))
        .collect()
}

/// Units allowed to pile in or fight right now.
pub fn selectable<'s>(state: &'s GameState, ctx: &RulesContext) -> Vec<&'s Unit> {
    let piled: Vec<&Unit> = state
        .units
        .values()
        .filter(|u| *state.activation(&u.id) == Activation::PiledIn && eligible(state, ctx, u))
        .collect();
    if !piled.is_empty() {
        return piled;
    }

    let first: Vec<&Unit> = eligible_of(state, ctx, state.active_player)
        .into_iter()
        .filter(|u| u.flags.has_charged)
        .collect();
    if !first.is_empty() {
        return first;
    }

    let selector = state.ledger.fight_selector.unwrap_or(state.active_player.opponent());
    let units = eligible_of(state, ctx, selector);
    if units.is_empty() {
        eligible_of(state, ctx, selector.opponent())
    } else {
        units
    }
}

fn check_selectable(state: &GameState, ctx: &RulesContext, unit: &Unit, checks: &mut Checks) {
    checks.require(unit.is_active(), || format!("unit '{}' is {} and cannot act", unit.id, unit.status));
    checks.require(!state.ledger.ended, || "the fight phase has ended".to_string());
    checks.require(!unit.profile.melee.is_empty(), || format!("unit '{}' has no melee weapons", unit.id));
    if !checks.passed() {
        return;
    }
    checks.require(spatial::is_engaged(state, ctx, unit), || {
        format!("unit '{}' is not within engagement range of an enemy", unit.id)
    });
    if !checks.passed() {
        return;
    }
    let choices = selectable(state, ctx);
    checks.require(choices.iter().any(|u| u.id == unit.id), || {
        let names: Vec<String> = choices.iter().map(|u| format!("'{}'", u.id)).collect();
        format!("unit '{}' cannot fight yet; next to fight: {}", unit.id, names.join(", "))
    });
}

impl FightPhase {
    fn validate_pile_in(&self, state: &GameState, ctx: &RulesContext, unit_id: &UnitId, placements: &[ModelPlacement]) -> ValidationResult {
        let unit = match actor(state, unit_id) {
            Ok(u) => u,
            Err(v) => return v,
        };
        let mut checks = Checks::new();
        checks.require(*state.activation(unit_id) == Activation::Idle, || {
            format!("unit '{unit_id}' has already piled in or fought")
        });
        check_selectable(state, ctx, unit, &mut checks);
        if !checks.passed() {
            return checks.finish();
        }
        let Some(placed) = spatial::resolve_placements(unit, placements, &mut checks) else {
            return checks.finish();
        };
        spatial::check_distance(ctx, &placed, ctx.config.pile_in_distance, &mut checks);
        spatial::check_paths(state, ctx, &placed, &mut checks);
        spatial::check_closing(state, ctx, unit, &placed, &mut checks);
        spatial::check_positions(state, ctx, unit, &placed, &mut checks);
        let still_engaged = spatial::enemies(state, unit.owner).any(|e| spatial::placed_engaged_with(ctx, &placed, e));
        checks.require(still_engaged, || format!("unit '{unit_id}' would leave engagement range"));
        checks.finish()
    }

    fn validate_fight(&self, state: &GameState, ctx: &RulesContext, unit_id: &UnitId, target_id: &UnitId) -> ValidationResult {
        let unit = match actor(state, unit_id) {
            Ok(u) => u,
            Err(v) => return v,
        };
        let target = match actor(state, target_id) {
            Ok(u) => u,
            Err(v) => return v,
        };
        let mut checks = Checks::new();
        checks.require(
            matches!(state.activation(unit_id), Activation::Idle | Activation::PiledIn),
            || format!("unit '{unit_id}' has already fought this phase"),
        );
        check_selectable(state, ctx, unit, &mut checks);
        if !checks.passed() {
            return checks.finish();
        }
        checks.require(target.owner != unit.owner, || format!("target '{target_id}' is not an enemy unit"));
        checks.require(target.is_active(), || format!("target '{target_id}' is {}", target.status));
        checks.require(spatial::engaged_with(ctx, unit, target), || {
            format!("target '{target_id}' is not within engagement range of unit '{unit_id}'")
        });
        checks.finish()
    }

    fn validate_consolidate(&self, state: &GameState, ctx: &RulesContext, unit_id: &UnitId, placements: &[ModelPlacement]) -> ValidationResult {
        let unit = match actor(state, unit_id) {
            Ok(u) => u,
            Err(v) => return v,
        };
        let mut checks = Checks::new();
        checks.require(unit.is_active(), || format!("unit '{unit_id}' is {} and cannot act", unit.status));
        checks.require(!state.ledger.ended, || "the fight phase has ended".to_string());
        checks.require(*state.activation(unit_id) == Activation::Fought, || {
            format!("unit '{unit_id}' can only consolidate right after fighting")
        });
        if !checks.passed() {
            return checks.finish();
        }
        let Some(placed) = spatial::resolve_placements(unit, placements, &mut checks) else {
            return checks.finish();
        };
        spatial::check_distance(ctx, &placed, ctx.config.consolidate_distance, &mut checks);
        spatial::check_paths(state, ctx, &placed, &mut checks);
        spatial::check_closing(state, ctx, unit, &placed, &mut checks);
        spatial::check_positions(state, ctx, unit, &placed, &mut checks);
        checks.finish()
    }

    fn process_fight(
        &self,
        state: &GameState,
        ctx: &RulesContext,
        unit_id: &UnitId,
        target_id: &UnitId,
        dice: &mut dyn DiceRoller,
    ) -> Result<ExecutionResult, StateError> {
        let unit = state.unit(unit_id).ok_or_else(|| StateError::UnknownUnit(unit_id.to_string()))?;
        let target = state.unit(target_id).ok_or_else(|| StateError::UnknownUnit(target_id.to_string()))?;
        let strikers = spatial::models_within(ctx, unit, target, ctx.config.engagement_range) as u32;
        let pools: Vec<AttackPool<'_>> = unit
            .profile
            .melee
            .iter()
            .map(|weapon| AttackPool { weapon, attacks: weapon.attacks.saturating_mul(strikers) })
            .collect();

        let mut set = ChangeSet::new(state);
        let summary = resolve_attacks(&mut set, dice, &pools, target_id, None)?;
        set.set_flag(unit_id, UnitFlag::HasFought, true)?;
        set.set_activation(unit_id, Activation::Fought)?;
        set.set_fight_selector(Some(unit.owner.opponent()))?;
        set.note(describe(unit_id, target_id, "fought", &summary));
        debug!(unit = %unit_id, target = %target_id, slain = summary.slain, "fight resolved");
        Ok(set.finish())
    }
}

impl PhaseRules for FightPhase {
    fn phase(&self) -> Phase {
        Phase::Fight
    }

    fn validate_action(&self, state: &GameState, action: &Action, ctx: &RulesContext) -> ValidationResult {
        match action {
            Action::PileIn { unit_id, placements } => self.validate_pile_in(state, ctx, unit_id, placements),
            Action::Fight { unit_id, target_id } => self.validate_fight(state, ctx, unit_id, target_id),
            Action::Consolidate { unit_id, placements } => {
                self.validate_consolidate(state, ctx, unit_id, placements)
            }
            Action::EndPhase { player } => {
                let mut checks = Checks::new();
                check_end_phase(state, *player, &mut checks);
                let waiting = selectable(state, ctx);
                checks.require(waiting.is_empty(), || {
                    let names: Vec<String> = waiting.iter().map(|u| format!("'{}'", u.id)).collect();
                    format!("engaged units have yet to fight: {}", names.join(", "))
                });
                checks.finish()
            }
            other => wrong_phase(state.phase, other),
        }
    }

    fn process_action(
        &self,
        state: &GameState,
        action: &Action,
        ctx: &RulesContext,
        dice: &mut dyn DiceRoller,
    ) -> Result<ExecutionResult, StateError> {
        match action {
            Action::Fight { unit_id, target_id } => self.process_fight(state, ctx, unit_id, target_id, dice),
            Action::PileIn { unit_id, placements } | Action::Consolidate { unit_id, placements } => {
                let mut set = ChangeSet::new(state);
                for p in placements {
                    set.move_model(unit_id, &p.model_id, p.position(), p.rotation)?;
                }
                let next = if matches!(action, Action::PileIn { .. }) {
                    Activation::PiledIn
                } else {
                    Activation::Consolidated
                };
                set.set_activation(unit_id, next)?;
                Ok(set.finish())
            }
            Action::EndPhase { player } => process_end_phase(state, *player),
            _ => Ok(ExecutionResult::default()),
        }
    }

    fn candidate_actions(&self, state: &GameState, player: Player, ctx: &RulesContext) -> Vec<Action> {
        let mut actions = Vec::new();
        let stop = ctx.px(ctx.config.engagement_range) / 2.0;
        for unit in selectable(state, ctx).into_iter().filter(|u| u.owner == player) {
            if *state.activation(&unit.id) == Activation::Idle {
                if let Some(placements) =
                    spatial::close_individually(state, ctx, unit, ctx.px(ctx.config.pile_in_distance), stop)
                {
                    actions.push(Action::PileIn { unit_id: unit.id.clone(), placements });
                }
            }
            for target in spatial::engaged_enemies(state, ctx, unit) {
                actions.push(Action::Fight { unit_id: unit.id.clone(), target_id: target.id.clone() });
            }
        }
        for unit in state
            .active_units_of(player)
            .filter(|u| *state.activation(&u.id) == Activation::Fought)
        {
            let reach = ctx.px(ctx.config.consolidate_distance);
            let placements =
                spatial::close_individually(state, ctx, unit, reach, stop).unwrap_or_else(|| spatial::stay(unit));
            actions.push(Action::Consolidate { unit_id: unit.id.clone(), placements });
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BaseShape, Board, PlanarGeometry, Point, UnitProfile, UnitStatus, WeaponProfile};
    use crate::config::RulesConfig;
    use crate::dice::ScriptedDice;

    fn unit(id: &str, owner: Player, at: Point) -> Unit {
        let profile = UnitProfile {
            movement: 6.0,
            toughness: 4,
            save: 6,
            wounds: 1,
            leadership: 7,
            objective_control: 2,
            ranged: vec![],
            melee: vec![WeaponProfile {
                name: "blade".to_string(),
                range_inches: 0.0,
                attacks: 1,
                skill: 3,
                strength: 4,
                armour_penetration: 0,
                damage: 1,
            }],
        };
        let mut unit = Unit::new(id, id, owner, profile, BaseShape::infantry(), 1);
        unit.status = UnitStatus::Deployed;
        unit.models[0].position = at;
        unit
    }

    /// `a` (player one) charged `b`; `c` and `d` are engaged elsewhere.
    fn state() -> GameState {
        let mut state = GameState::new(Board::new(2400.0, 1760.0));
        state.phase = Phase::Fight;
        let mut a = unit("a", Player::One, Point::new(100.0, 100.0));
        a.flags.has_charged = true;
        state.add_unit(a);
        state.add_unit(unit("b", Player::Two, Point::new(170.0, 100.0)));
        state.add_unit(unit("c", Player::One, Point::new(100.0, 800.0)));
        state.add_unit(unit("d", Player::Two, Point::new(170.0, 800.0)));
        state
    }

    fn fight(a: &str, b: &str) -> Action {
        Action::Fight { unit_id: UnitId::from(a), target_id: UnitId::from(b) }
    }

    fn run(s: &mut GameState, action: &Action, dice: &[u8]) {
        let geometry = PlanarGeometry::new(40.0);
        let config = RulesConfig::default();
        let ctx = RulesContext::new(&geometry, &config);
        let v = FightPhase.validate_action(s, action, &ctx);
        assert!(v.valid, "{action:?}: {:?}", v.reasons);
        let result = FightPhase
            .process_action(s, action, &ctx, &mut ScriptedDice::new(dice.iter().copied()))
            .unwrap();
        s.apply_all(&result.changes).unwrap();
    }

    #[test]
    fn chargers_fight_first_then_players_alternate() {
        let geometry = PlanarGeometry::new(40.0);
        let config = RulesConfig::default();
        let ctx = RulesContext::new(&geometry, &config);
        let mut s = state();
        let ids = |s: &GameState| -> Vec<String> {
            selectable(s, &ctx).iter().map(|u| u.id.to_string()).collect()
        };
        assert_eq!(ids(&s), vec!["a"]);
        let v = FightPhase.validate_action(&s, &fight("d", "c"), &ctx);
        assert!(v.reasons.iter().any(|r| r.contains("cannot fight yet")));

        // a misses.
        run(&mut s, &fight("a", "b"), &[1]);
        assert_eq!(s.ledger.fight_selector, Some(Player::Two));
        assert_eq!(ids(&s), vec!["b", "d"]);
        run(&mut s, &fight("d", "c"), &[1]);
        assert_eq!(ids(&s), vec!["c"]);
        assert!(!FightPhase.validate_action(&s, &Action::EndPhase { player: Player::One }, &ctx).valid);
        run(&mut s, &fight("c", "d"), &[1]);
        run(&mut s, &fight("b", "a"), &[1]);
        assert!(selectable(&s, &ctx).is_empty());
        assert!(FightPhase.validate_action(&s, &Action::EndPhase { player: Player::One }, &ctx).valid);
    }

    #[test]
    fn fight_kills_target_and_allows_consolidation() {
        let geometry = PlanarGeometry::new(40.0);
        let config = RulesConfig::default();
        let ctx = RulesContext::new(&geometry, &config);
        let mut s = state();
        // hit 3, wound 4, save 1.
        run(&mut s, &fight("a", "b"), &[3, 4, 1]);
        assert_eq!(s.unit(&UnitId::from("b")).unwrap().status, UnitStatus::Destroyed);
        assert!(s.unit(&UnitId::from("a")).unwrap().flags.has_fought);

        let candidates = FightPhase.candidate_actions(&s, Player::One, &ctx);
        let consolidate = candidates
            .iter()
            .find(|a| matches!(a, Action::Consolidate { unit_id, .. } if unit_id.as_str() == "a"))
            .cloned()
            .unwrap();
        run(&mut s, &consolidate, &[]);
        assert_eq!(*s.activation(&UnitId::from("a")), Activation::Consolidated);
    }

    #[test]
    fn pile_in_must_close_and_then_fight() {
        let geometry = PlanarGeometry::new(40.0);
        let config = RulesConfig::default();
        let ctx = RulesContext::new(&geometry, &config);
        let mut s = state();
        let away = Action::PileIn {
            unit_id: UnitId::from("a"),
            placements: vec![ModelPlacement::new("a-m1".into(), Point::new(90.0, 100.0), 0.0)],
        };
        let v = FightPhase.validate_action(&s, &away, &ctx);
        assert!(v.reasons.iter().any(|r| r.contains("farther")));

        let closer = Action::PileIn {
            unit_id: UnitId::from("a"),
            placements: vec![ModelPlacement::new("a-m1".into(), Point::new(110.0, 100.0), 0.0)],
        };
        run(&mut s, &closer, &[]);
        assert_eq!(selectable(&s, &ctx).len(), 1);
        assert!(!FightPhase.validate_action(&s, &closer, &ctx).valid);
        run(&mut s, &fight("a", "b"), &[1]);
    }

    #[test]
    fn unengaged_unit_cannot_fight() {
        let geometry = PlanarGeometry::new(40.0);
        let config = RulesConfig::default();
        let ctx = RulesContext::new(&geometry, &config);
        let mut s = state();
        s.units.get_mut(&UnitId::from("b")).unwrap().models[0].position = Point::new(600.0, 100.0);
        let v = FightPhase.validate_action(&s, &fight("a", "b"), &ctx);
        assert!(!v.valid);
    }
}
