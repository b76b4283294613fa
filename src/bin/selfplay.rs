//! Batch simulation CLI.
//!
//! Plays battles between random agents and writes one JSON summary per
//! battle.
//!
//! Usage:
//!   cargo run --release --bin selfplay -- [OPTIONS]
//!
//! Options:
//!   --games N        Number of battles to play (default: 10)
//!   --threads N      Number of parallel threads (default: 4)
//!   --seed N         Random seed, 0 for entropy (default: 0)
//!   --max-actions N  Actions per battle before it is abandoned (default: 5000)
//!   --end-chance P   Chance of ending a phase early (default: 0.05)
//!   --scenario NAME  Built-in scenario (default: skirmish)
//!   --rules FILE     JSON rules config
//!   --verify         Replay each battle log against the live state
//!   --output FILE    Output file path (default: stdout)
//!   --quiet          Suppress progress and summary output

use std::env;
use std::fs::File;
use std::io::{self, BufWriter};
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Instant;

use tracing_subscriber::EnvFilter;

use skirmish::config::RulesConfig;
use skirmish::selfplay::{self, SelfPlayConfig};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,skirmish::selfplay=info")))
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let mut config = SelfPlayConfig::default();
    let mut output_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--games" => config.num_games = value(&args, &mut i),
            "--threads" => config.threads = value(&args, &mut i),
            "--seed" => config.seed = value(&args, &mut i),
            "--max-actions" => config.max_actions = value(&args, &mut i),
            "--end-chance" => config.end_phase_probability = value(&args, &mut i),
            "--scenario" => config.scenario = value(&args, &mut i),
            "--rules" => {
                let path: String = value(&args, &mut i);
                config.rules = match RulesConfig::load(&path) {
                    Ok(rules) => rules,
                    Err(e) => {
                        eprintln!("{e}");
                        return ExitCode::FAILURE;
                    }
                };
            }
            "--verify" => config.verify_replay = true,
            "--output" => output_path = Some(value(&args, &mut i)),
            "--quiet" => config.quiet = true,
            "--help" | "-h" => {
                print_usage();
                return ExitCode::SUCCESS;
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                print_usage();
                return ExitCode::FAILURE;
            }
        }
        i += 1;
    }

    if !config.quiet {
        eprintln!(
            "Self-play: {} battles of {}, {} threads, end chance {:.2}",
            config.num_games, config.scenario, config.threads, config.end_phase_probability
        );
    }

    let start = Instant::now();
    let games = match selfplay::run_self_play(&config) {
        Ok(games) => games,
        Err(e) => {
            eprintln!("self-play failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    let elapsed = start.elapsed();

    if !config.quiet {
        eprintln!(
            "Completed {} battles in {:.1}s ({:.1} battles/s)",
            games.len(),
            elapsed.as_secs_f64(),
            games.len() as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
        );
        selfplay::print_summary(&games);
    }

    let written = match &output_path {
        Some(path) => File::create(path).and_then(|file| selfplay::write_jsonl(&games, &mut BufWriter::new(file))),
        None => selfplay::write_jsonl(&games, &mut BufWriter::new(io::stdout().lock())),
    };
    if let Err(e) = written {
        eprintln!("failed to write output: {e}");
        return ExitCode::FAILURE;
    }
    if let (Some(path), false) = (&output_path, config.quiet) {
        eprintln!("Wrote {} battles to {}", games.len(), path);
    }
    ExitCode::SUCCESS
}

/// Parses the value following the flag at `args[*i]`, exiting with usage
/// if it is missing or invalid.
fn value<T: FromStr>(args: &[String], i: &mut usize) -> T {
    let flag = &args[*i];
    *i += 1;
    match args.get(*i).map(|raw| raw.parse::<T>()) {
        Some(Ok(v)) => v,
        _ => {
            eprintln!("invalid {} value", flag);
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!("Usage: selfplay [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --games N        Number of battles to play (default: 10)");
    eprintln!("  --threads N      Number of parallel threads (default: 4)");
    eprintln!("  --seed N         Random seed, 0 for entropy (default: 0)");
    eprintln!("  --max-actions N  Actions per battle before it is abandoned (default: 5000)");
    eprintln!("  --end-chance P   Chance of ending a phase early (default: 0.05)");
    eprintln!("  --scenario NAME  Built-in scenario (default: skirmish)");
    eprintln!("  --rules FILE     JSON rules config");
    eprintln!("  --verify         Replay each battle log against the live state");
    eprintln!("  --output FILE    Output file path (default: stdout)");
    eprintln!("  --quiet          Suppress progress and summary output");
    eprintln!("  --help           Show this help");
}
