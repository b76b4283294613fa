//! Skirmish -- a turn-based miniatures wargame rules engine.
//!
//! This binary reads protocol commands from stdin and writes responses to
//! stdout. Logs go to stderr, filtered by `RUST_LOG` (default `info`).

use std::io::{self, BufRead};
use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::EnvFilter;

use skirmish::engine::Engine;
use skirmish::error::EngineError;
use skirmish::protocol::parser::{parse_command, Command};

/// Runs the protocol loop. Exits non-zero when the session hits a fatal
/// error.
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let mut engine = Engine::new();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };

        let cmd = match parse_command(&line) {
            Some(c) => c,
            None => continue,
        };

        let result = match cmd {
            Command::Hello => engine.handle_hello(&mut out),
            Command::IsReady => engine.handle_isready(&mut out),
            Command::SetOption { name, value } => engine.set_option(&name, value.as_deref()),
            Command::NewGame => engine.new_game(),
            Command::Scenario { name } => engine.load_scenario(&name),
            Command::Position { json } => engine.set_position(&json),
            Command::Load { path } => engine.load(&path),
            Command::Seed { seed } => {
                engine.set_seed(seed);
                Ok(())
            }
            Command::Submit { json } => engine.handle_submit(&json, &mut out),
            Command::Actions { player } => engine.handle_actions(player, &mut out),
            Command::Phase => engine.handle_phase(&mut out),
            Command::State => engine.handle_state(&mut out),
            Command::Log => engine.handle_log(&mut out),
            Command::Quit => break,
        };

        if let Err(e) = result.or_else(|e| report(&engine, e, &mut out)) {
            error!(error = %e, "session aborted");
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}

/// Passes non-fatal errors on to the client; returns fatal ones.
fn report<W: io::Write>(engine: &Engine, err: EngineError, out: &mut W) -> Result<(), EngineError> {
    if err.is_fatal() {
        return Err(err);
    }
    engine.handle_error(&err, out)
}
