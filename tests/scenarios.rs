//! Scenario tests for the phase controller.
//!
//! Each test drives a `PhaseController` through the public API with
//! scripted dice, then checks the resulting state, log and verdicts.

use skirmish::board::{
    Action, BaseShape, Board, GameState, ModelId, ModelPlacement, Objective, Phase, Player, Point, StateChange, Unit,
    UnitId, UnitProfile, UnitStatus,
};
use skirmish::dice::ScriptedDice;
use skirmish::error::{EngineError, StateError};
use skirmish::mission::ScoringHook;
use skirmish::phase::{replay, spatial, LogEntry, PhaseController, RejectionKind, Services};
use skirmish::protocol::{decode_state, encode_state};
use skirmish::scenario;

fn duel(rolls: &[u8]) -> PhaseController {
    PhaseController::start(
        scenario::charge_duel(),
        Services::default(),
        Box::new(ScriptedDice::new(rolls.iter().copied())),
    )
    .unwrap()
}

fn a() -> UnitId {
    UnitId::from("a")
}

fn b() -> UnitId {
    UnitId::from("b")
}

fn declare(c: &mut PhaseController) {
    let outcome = c
        .submit(Action::DeclareCharge { unit_id: a(), target_ids: vec![b()] })
        .unwrap();
    assert!(outcome.validation.valid, "{:?}", outcome.validation.reasons);
}

fn move_a_to(x: f64) -> Action {
    Action::ChargeMove {
        unit_id: a(),
        placements: vec![ModelPlacement::new(ModelId::from("a-m1"), Point::new(x, 100.0), 0.0)],
    }
}

#[test]
fn charge_roll_of_eight_reaches_target_six_inches_away() {
    let mut c = duel(&[4, 4]);
    assert_eq!(c.current_phase(), Phase::Charge);
    declare(&mut c);

    let outcome = c.submit(Action::RollCharge { unit_id: a() }).unwrap();
    assert!(outcome.validation.valid);
    assert_eq!(outcome.execution.unwrap().dice, vec![4, 4]);

    let outcome = c.submit(move_a_to(270.0)).unwrap();
    assert!(outcome.validation.valid, "{:?}", outcome.validation.reasons);

    let state = c.state();
    let unit = state.unit(&a()).unwrap();
    assert_eq!(unit.models[0].position, Point::new(270.0, 100.0));
    assert!(unit.flags.has_charged);
    assert!(unit.flags.charge_attempted);

    let ctx = c.services().context();
    let gap = spatial::unit_gap(&ctx, unit, state.unit(&b()).unwrap());
    assert!(spatial::within(&ctx, gap, 1.0));
}

#[test]
fn charge_roll_of_four_fails_without_moving() {
    let mut c = duel(&[1, 3]);
    declare(&mut c);

    let outcome = c.submit(Action::RollCharge { unit_id: a() }).unwrap();
    assert!(outcome.validation.valid);

    let unit = c.state().unit(&a()).unwrap();
    assert!(unit.flags.charge_attempted);
    assert!(!unit.flags.has_charged);
    assert_eq!(unit.models[0].position, Point::new(100.0, 100.0));

    let before = c.state().clone();
    let outcome = c.submit(move_a_to(270.0)).unwrap();
    assert!(!outcome.validation.valid);
    assert_eq!(outcome.validation.kind, Some(RejectionKind::ValidationRejected));
    assert!(outcome.execution.is_none());
    assert_eq!(c.state(), &before);
}

#[test]
fn redeploying_a_unit_names_its_status() {
    let mut c = PhaseController::start(
        scenario::skirmish(),
        Services::default(),
        Box::new(ScriptedDice::new(Vec::<u8>::new())),
    )
    .unwrap();
    let deploy = {
        let ctx = c.services().context();
        let unit = c.state().unit(&UnitId::from("p1-battleline")).unwrap();
        Action::DeployUnit {
            unit_id: unit.id.clone(),
            placements: spatial::formation(&ctx, unit, Point::new(1200.0, 240.0)),
        }
    };

    let first = c.submit(deploy.clone()).unwrap();
    assert!(first.validation.valid, "{:?}", first.validation.reasons);
    assert_eq!(
        c.state().unit(&UnitId::from("p1-battleline")).unwrap().status,
        UnitStatus::Deployed
    );

    let again = c.submit(deploy).unwrap();
    assert!(!again.validation.valid);
    assert_eq!(again.validation.kind, Some(RejectionKind::ValidationRejected));
    assert!(
        again.validation.reasons.iter().any(|r| r.contains("DEPLOYED")),
        "{:?}",
        again.validation.reasons
    );
}

#[test]
fn charge_phase_completes_once_every_unit_has_resolved() {
    let mut c = duel(&[]);
    assert!(!c.is_phase_complete());

    let outcome = c.submit(Action::SkipCharge { unit_id: a() }).unwrap();
    assert!(outcome.validation.valid);

    // Nothing is engaged, so fight and scoring complete on entry and the
    // second player's turn begins.
    assert_eq!(c.state().active_player, Player::Two);
    assert_eq!(c.current_phase(), Phase::Movement);
    assert!(c.log().iter().any(|e| matches!(
        e,
        skirmish::phase::LogEntry::PhaseEntered { phase: Phase::Fight, .. }
    )));
}

#[test]
fn log_replays_to_live_state() {
    let mut c = duel(&[4, 4]);
    declare(&mut c);
    c.submit(Action::RollCharge { unit_id: a() }).unwrap();
    c.submit(move_a_to(270.0)).unwrap();

    let replayed = replay(c.initial(), c.log()).unwrap();
    assert_eq!(&replayed, c.state());
}

#[test]
fn mid_battle_state_round_trips() {
    let mut c = duel(&[4, 4]);
    declare(&mut c);
    c.submit(Action::RollCharge { unit_id: a() }).unwrap();

    let text = encode_state(c.state()).unwrap();
    let restored = decode_state(&text).unwrap();
    assert_eq!(&restored, c.state());

    // A resumed battle accepts the same charge move.
    let mut resumed = PhaseController::resume(restored, Services::default(), Box::new(ScriptedDice::new(Vec::<u8>::new()))).unwrap();
    let outcome = resumed.submit(move_a_to(270.0)).unwrap();
    assert!(outcome.validation.valid, "{:?}", outcome.validation.reasons);
}

#[test]
fn available_actions_are_stable() {
    let mut c = duel(&[4, 4]);
    declare(&mut c);
    let first = c.get_available_actions(Player::One);
    let second = c.get_available_actions(Player::One);
    assert_eq!(first, second);
    assert_eq!(
        first,
        vec![Action::RollCharge { unit_id: a() }, Action::EndPhase { player: Player::One }]
    );

    let overwatch = c.get_available_actions(Player::Two);
    assert_eq!(overwatch, vec![Action::Overwatch { unit_id: b(), target_id: a() }]);
}

/// Player one stands on all four objectives; player two waits far away.
/// Nobody carries weapons, so every phase ends on request.
fn held_objectives() -> GameState {
    let mut board = Board::new(2400.0, 1760.0);
    board.objectives = (1..=4)
        .map(|i| Objective { id: format!("obj-{i}"), position: Point::new(300.0 * i as f64, 300.0) })
        .collect();
    let profile = UnitProfile {
        movement: 6.0,
        toughness: 4,
        save: 4,
        wounds: 1,
        leadership: 7,
        objective_control: 2,
        ranged: vec![],
        melee: vec![],
    };
    let mut state = GameState::new(board);
    let placed = (1..=4)
        .map(|i| (format!("h{i}"), Player::One, Point::new(300.0 * i as f64, 300.0)))
        .chain([("far".to_string(), Player::Two, Point::new(1200.0, 1500.0))]);
    for (id, owner, at) in placed {
        let mut unit = Unit::new(id.as_str(), id.as_str(), owner, profile.clone(), BaseShape::infantry(), 1);
        unit.status = UnitStatus::Deployed;
        unit.models[0].position = at;
        state.add_unit(unit);
    }
    state.phase = Phase::Command;
    state.flags.tempting_target = Some("obj-1".to_string());
    state
}

fn scoring_entries(c: &PhaseController) -> Vec<(ScoringHook, Player, Vec<StateChange>)> {
    c.log()
        .iter()
        .filter_map(|e| match e {
            LogEntry::ScoringHookFired { hook, player, changes, .. } => Some((*hook, *player, changes.clone())),
            _ => None,
        })
        .collect()
}

#[test]
fn take_and_hold_scores_through_the_turn_sequence() {
    let mut c = PhaseController::start(held_objectives(), Services::default(), Box::new(ScriptedDice::new(Vec::<u8>::new())))
        .unwrap();

    // The round one command phase closes on entry and scores nothing.
    assert_eq!(c.current_phase(), Phase::Movement);
    assert_eq!(c.state().battle_round, 1);
    assert_eq!(c.state().victory_points, [0, 0]);
    assert!(scoring_entries(&c).is_empty());

    for _ in 0..40 {
        let state = c.state();
        if state.battle_round == 2 && state.active_player == Player::One && state.phase == Phase::Movement {
            break;
        }
        let outcome = c.submit(Action::EndPhase { player: state.active_player }).unwrap();
        assert!(outcome.validation.valid, "{:?}", outcome.validation.reasons);
    }
    assert_eq!(c.current_phase(), Phase::Movement);
    assert_eq!(c.state().battle_round, 2);

    // Tempting target once at the end of player one's turn, then the
    // primary from round two, capped at 15 for four objectives.
    assert_eq!(
        scoring_entries(&c),
        vec![
            (
                ScoringHook::EndOfYourTurn,
                Player::One,
                vec![StateChange::VictoryPoints { player: Player::One, before: 0, after: 5 }],
            ),
            (
                ScoringHook::CommandPhaseEnd,
                Player::One,
                vec![StateChange::VictoryPoints { player: Player::One, before: 5, after: 20 }],
            ),
        ]
    );
    assert_eq!(c.state().victory_points, [20, 0]);
    assert_eq!(&replay(c.initial(), c.log()).unwrap(), c.state());
}

#[test]
fn oversized_attack_profile_is_refused_at_start() {
    let mut state = scenario::charge_duel();
    state.units.get_mut(&a()).unwrap().profile.ranged[0].attacks = u32::MAX / 2 + 1;
    let started = PhaseController::start(state, Services::default(), Box::new(ScriptedDice::new(Vec::<u8>::new())));
    assert!(matches!(
        started,
        Err(EngineError::StateCorrupt(StateError::AttacksExceeded { .. }))
    ));
}
