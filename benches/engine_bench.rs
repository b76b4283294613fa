use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::time::Duration;

use skirmish::board::{Action, Player, UnitId};
use skirmish::dice::{ScriptedDice, SeededDice};
use skirmish::phase::{replay, PhaseController, Services};
use skirmish::protocol::{decode_state, encode_state};
use skirmish::scenario;
use skirmish::selfplay::{play_game, SelfPlayConfig};

fn deployment_controller() -> PhaseController {
    PhaseController::start(scenario::skirmish(), Services::default(), Box::new(SeededDice::new(1))).unwrap()
}

fn bench_available_actions_deployment(c: &mut Criterion) {
    let controller = deployment_controller();
    c.bench_function("available_actions_deployment", |b| {
        b.iter(|| controller.get_available_actions(black_box(Player::One)))
    });
}

fn bench_available_actions_charge(c: &mut Criterion) {
    let controller =
        PhaseController::start(scenario::charge_duel(), Services::default(), Box::new(SeededDice::new(1))).unwrap();
    c.bench_function("available_actions_charge", |b| {
        b.iter(|| controller.get_available_actions(black_box(Player::One)))
    });
}

fn bench_charge_sequence(c: &mut Criterion) {
    c.bench_function("declare_roll_charge", |b| {
        b.iter(|| {
            let mut controller = PhaseController::start(
                scenario::charge_duel(),
                Services::default(),
                Box::new(ScriptedDice::new([4u8, 4])),
            )
            .unwrap();
            controller
                .submit(Action::DeclareCharge { unit_id: UnitId::from("a"), target_ids: vec![UnitId::from("b")] })
                .unwrap();
            controller.submit(Action::RollCharge { unit_id: UnitId::from("a") }).unwrap()
        })
    });
}

fn bench_state_codec(c: &mut Criterion) {
    let state = scenario::skirmish();
    let text = encode_state(&state).unwrap();
    c.bench_function("encode_state", |b| b.iter(|| encode_state(black_box(&state)).unwrap()));
    c.bench_function("decode_state", |b| b.iter(|| decode_state(black_box(&text)).unwrap()));
}

fn bench_full_battle(c: &mut Criterion) {
    let config = SelfPlayConfig { quiet: true, ..Default::default() };
    let mut group = c.benchmark_group("battle");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(20));
    group.bench_function("random_battle", |b| {
        let mut seed = 0u64;
        b.iter(|| {
            seed += 1;
            play_game(&config, 0, &mut SmallRng::seed_from_u64(seed)).unwrap()
        })
    });
    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let mut controller = deployment_controller();
    for _ in 0..6 {
        let Some(action) = controller.get_available_actions(controller.state().active_player).into_iter().next() else {
            break;
        };
        controller.submit(action).unwrap();
    }
    c.bench_function("replay_log", |b| {
        b.iter(|| replay(black_box(controller.initial()), black_box(controller.log())).unwrap())
    });
}

criterion_group!(
    benches,
    bench_available_actions_deployment,
    bench_available_actions_charge,
    bench_charge_sequence,
    bench_state_codec,
    bench_replay,
    bench_full_battle,
);
criterion_main!(benches);
