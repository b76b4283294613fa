//! Batch simulation with random agents.
//!
//! Plays whole battles from a built-in scenario. At each step the agent
//! picks uniformly among the legal actions of both players (the reacting
//! player only ever has overwatch); an explicit end of phase is taken
//! rarely, or when nothing else is legal. Games run in parallel on a rayon
//! pool and are summarized as JSON lines.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::board::{Action, GameState, Phase, Player, ALL_PLAYERS};
use crate::config::RulesConfig;
use crate::dice::SeededDice;
use crate::error::{EngineError, StateError};
use crate::phase::{replay, LogEntry, PhaseController, Services};
use crate::scenario;

/// Configuration for batch simulation.
#[derive(Debug, Clone)]
pub struct SelfPlayConfig {
    /// Number of battles to play.
    pub num_games: usize,
    /// Number of parallel threads.
    pub threads: usize,
    /// Random seed (0 = use entropy).
    pub seed: u64,
    /// Actions per battle before it is abandoned.
    pub max_actions: usize,
    /// Chance of ending a phase while other actions remain.
    pub end_phase_probability: f64,
    /// Built-in scenario to start from.
    pub scenario: String,
    pub rules: RulesConfig,
    /// Replay each finished log and compare it with the live state.
    pub verify_replay: bool,
    /// Suppress per-game progress output.
    pub quiet: bool,
}

impl Default for SelfPlayConfig {
    fn default() -> Self {
        SelfPlayConfig {
            num_games: 10,
            threads: 4,
            seed: 0,
            max_actions: 5000,
            end_phase_probability: 0.05,
            scenario: "skirmish".to_string(),
            rules: RulesConfig::default(),
            verify_replay: false,
            quiet: false,
        }
    }
}

/// Actions taken in one phase of one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub battle_round: u32,
    pub active_player: Player,
    pub phase: Phase,
    pub actions: usize,
}

/// Summary of one battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub game_id: usize,
    pub dice_seed: u64,
    pub winner: Option<Player>,
    pub victory_points: [u32; 2],
    pub battle_rounds: u32,
    pub actions: usize,
    /// The battle hit `max_actions` or ran out of legal actions.
    pub truncated: bool,
    pub log_entries: usize,
    pub phases: Vec<PhaseRecord>,
}

/// Picks the next action from `pool`, or `None` if it is empty.
fn choose_action(pool: Vec<Action>, end_probability: f64, rng: &mut SmallRng) -> Option<Action> {
    let (ends, mut others): (Vec<Action>, Vec<Action>) =
        pool.into_iter().partition(|a| matches!(a, Action::EndPhase { .. }));
    let end = ends.into_iter().next();
    if others.is_empty() || (end.is_some() && rng.gen_bool(end_probability.clamp(0.0, 1.0))) {
        return end.or_else(|| others.pop());
    }
    others.shuffle(rng);
    others.pop()
}

fn legal_actions(controller: &PhaseController) -> Vec<Action> {
    ALL_PLAYERS
        .into_iter()
        .flat_map(|p| controller.get_available_actions(p))
        .collect()
}

/// Plays one battle to the end, or until it is abandoned.
/// Replays `log` from `initial` and checks it lands on `live`.
pub fn verify_replay(initial: &GameState, log: &[LogEntry], live: &GameState) -> Result<(), EngineError> {
    if &replay(initial, log)? != live {
        return Err(StateError::ReplayDiverged { entries: log.len() }.into());
    }
    Ok(())
}

pub fn play_game(config: &SelfPlayConfig, game_id: usize, rng: &mut SmallRng) -> Result<GameRecord, EngineError> {
    let start = scenario::by_name(&config.scenario)
        .ok_or_else(|| EngineError::NotFound(format!("scenario '{}'", config.scenario)))?;
    let dice_seed: u64 = rng.gen();
    let services = Services::new(config.rules.clone());
    let mut controller = PhaseController::start(start, services, Box::new(SeededDice::new(dice_seed)))?;

    let mut phases: Vec<PhaseRecord> = Vec::new();
    let mut actions = 0usize;
    let mut truncated = false;

    while !controller.is_battle_over() {
        if actions >= config.max_actions {
            warn!(game_id, actions, "battle abandoned at the action limit");
            truncated = true;
            break;
        }
        let Some(action) = choose_action(legal_actions(&controller), config.end_phase_probability, rng) else {
            warn!(game_id, phase = %controller.current_phase(), "no legal actions");
            truncated = true;
            break;
        };

        let state = controller.state();
        let here = (state.battle_round, state.active_player, state.phase);
        match phases.last_mut() {
            Some(r) if (r.battle_round, r.active_player, r.phase) == here => r.actions += 1,
            _ => phases.push(PhaseRecord {
                battle_round: here.0,
                active_player: here.1,
                phase: here.2,
                actions: 1,
            }),
        }

        let outcome = controller.submit(action)?;
        if !outcome.validation.valid {
            debug!(game_id, reasons = ?outcome.validation.reasons, "listed action rejected");
        }
        actions += 1;
    }

    if config.verify_replay {
        verify_replay(controller.initial(), controller.log(), controller.state()).inspect_err(|err| {
            warn!(game_id, error = %err, "replay verification failed");
        })?;
    }

    let state: &GameState = controller.state();
    Ok(GameRecord {
        game_id,
        dice_seed,
        winner: controller.winner(),
        victory_points: state.victory_points,
        battle_rounds: state.battle_round,
        actions,
        truncated,
        log_entries: controller.log().len(),
        phases,
    })
}

fn game_rng(config: &SelfPlayConfig, game_id: usize) -> SmallRng {
    if config.seed != 0 {
        SmallRng::seed_from_u64(config.seed.wrapping_add(game_id as u64))
    } else {
        SmallRng::from_entropy()
    }
}

fn outcome_label(game: &GameRecord) -> String {
    match (game.truncated, game.winner) {
        (true, _) => "abandoned".to_string(),
        (false, Some(p)) => format!("{p} wins"),
        (false, None) => "draw".to_string(),
    }
}

/// Plays all battles and returns their records, in completion order.
pub fn run_self_play(config: &SelfPlayConfig) -> Result<Vec<GameRecord>, EngineError> {
    let mut games = Vec::with_capacity(config.num_games);
    run_self_play_with_callback(config, |game| games.push(game))?;
    Ok(games)
}

/// Plays all battles, calling `on_game` with each completed record.
pub fn run_self_play_with_callback<F>(config: &SelfPlayConfig, on_game: F) -> Result<(), EngineError>
where
    F: FnMut(GameRecord) + Send,
{
    if config.threads > 1 {
        run_self_play_parallel(config, on_game)
    } else {
        run_self_play_sequential(config, on_game)
    }
}

fn run_self_play_sequential<F>(config: &SelfPlayConfig, mut on_game: F) -> Result<(), EngineError>
where
    F: FnMut(GameRecord),
{
    for i in 0..config.num_games {
        let game_start = Instant::now();
        let game = play_game(config, i, &mut game_rng(config, i))?;
        if !config.quiet {
            info!(
                game = i + 1,
                of = config.num_games,
                outcome = %outcome_label(&game),
                rounds = game.battle_rounds,
                secs = game_start.elapsed().as_secs_f64(),
                "battle finished"
            );
        }
        on_game(game);
    }
    Ok(())
}

/// Plays battles on a rayon pool. Records reach `on_game` on the calling
/// thread through a channel.
fn run_self_play_parallel<F>(config: &SelfPlayConfig, mut on_game: F) -> Result<(), EngineError>
where
    F: FnMut(GameRecord) + Send,
{
    use rayon::prelude::*;
    use std::sync::mpsc;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()
        .map_err(|e| EngineError::Io(std::io::Error::other(e)))?;
    let completed = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel::<Result<GameRecord, EngineError>>();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            pool.install(|| {
                (0..config.num_games).into_par_iter().for_each_with(tx, |tx, i| {
                    let game_start = Instant::now();
                    let game = play_game(config, i, &mut game_rng(config, i));
                    if let (Ok(game), false) = (&game, config.quiet) {
                        let n = completed.fetch_add(1, Ordering::Relaxed) + 1;
                        info!(
                            game = n,
                            of = config.num_games,
                            outcome = %outcome_label(game),
                            rounds = game.battle_rounds,
                            secs = game_start.elapsed().as_secs_f64(),
                            "battle finished"
                        );
                    }
                    let _ = tx.send(game);
                });
            });
        });

        for game in rx {
            on_game(game?);
        }
        Ok(())
    })
}

/// Writes game records as JSONL, one battle per line.
pub fn write_jsonl<W: Write>(games: &[GameRecord], out: &mut W) -> std::io::Result<()> {
    for game in games {
        serde_json::to_writer(&mut *out, game)?;
        writeln!(out)?;
    }
    out.flush()
}

/// Logs totals over a batch of battles.
pub fn print_summary(games: &[GameRecord]) {
    let total = games.len().max(1) as f64;
    let mut wins = [0usize; 2];
    let mut draws = 0usize;
    let mut abandoned = 0usize;
    let mut actions = 0usize;
    let mut vp = [0u64; 2];

    for game in games {
        actions += game.actions;
        vp[0] += u64::from(game.victory_points[0]);
        vp[1] += u64::from(game.victory_points[1]);
        if game.truncated {
            abandoned += 1;
            continue;
        }
        match game.winner {
            Some(p) => wins[p.index()] += 1,
            None => draws += 1,
        }
    }

    info!(
        games = games.len(),
        player_one_wins = wins[0],
        player_two_wins = wins[1],
        draws,
        abandoned,
        avg_actions = format_args!("{:.1}", actions as f64 / total),
        avg_vp_one = format_args!("{:.1}", vp[0] as f64 / total),
        avg_vp_two = format_args!("{:.1}", vp[1] as f64 / total),
        "self-play summary"
    );
}
