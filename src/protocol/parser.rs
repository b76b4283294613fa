//! Session command parser.
//!
//! Parses incoming protocol lines into structured `Command` variants that
//! the session loop dispatches on. JSON payloads are kept raw here and
//! decoded by the engine, so a bad payload gets a proper rejection
//! instead of being dropped.

use tracing::warn;

use crate::board::Player;

/// A parsed client-to-engine command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Protocol handshake.
    Hello,

    /// Synchronization ping; engine must reply `readyok`.
    IsReady,

    /// Set a rules option: `setoption name <id> [value <x>]`.
    SetOption { name: String, value: Option<String> },

    /// Start a new battle from the current position.
    NewGame,

    /// Load a built-in scenario by name.
    Scenario { name: String },

    /// Set the position from a JSON-encoded game state.
    Position { json: String },

    /// Load a JSON-encoded game state from a file.
    Load { path: String },

    /// Reseed the dice.
    Seed { seed: u64 },

    /// Submit a JSON-encoded action.
    Submit { json: String },

    /// List legal actions for a player, or the active player.
    Actions { player: Option<Player> },

    /// Report the current phase.
    Phase,

    /// Dump the current state as JSON.
    State,

    /// Dump the audit log as JSON lines.
    Log,

    /// Terminate the session.
    Quit,
}

/// Parses a single line of input into a `Command`.
///
/// Returns `None` for empty lines or unrecognized commands. Malformed
/// arguments for known commands also return `None` after logging to stderr.
pub fn parse_command(line: &str) -> Option<Command> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    match tokens[0] {
        "hello" => Some(Command::Hello),
        "isready" => Some(Command::IsReady),
        "quit" => Some(Command::Quit),
        "newgame" => Some(Command::NewGame),
        "phase" => Some(Command::Phase),
        "state" => Some(Command::State),
        "log" => Some(Command::Log),

        "setoption" => parse_setoption(&tokens),
        "scenario" => parse_single(&tokens, "scenario <name>").map(|name| Command::Scenario { name }),
        "load" => parse_single(&tokens, "load <path>").map(|path| Command::Load { path }),
        "seed" => parse_seed(&tokens),
        "actions" => parse_actions(&tokens),
        "position" => rest_of_line(trimmed, "position").map(|json| Command::Position { json }),
        "submit" => rest_of_line(trimmed, "submit").map(|json| Command::Submit { json }),

        other => {
            warn!(command = other, "unknown command");
            None
        }
    }
}

/// Parses `setoption name <id> [value <x>]`.
fn parse_setoption(tokens: &[&str]) -> Option<Command> {
    if tokens.len() < 3 || tokens[1] != "name" {
        warn!("malformed setoption: expected 'setoption name <id> [value <x>]'");
        return None;
    }

    let value_idx = tokens.iter().position(|&t| t == "value");
    let (name, value) = match value_idx {
        Some(vi) => {
            let name_parts = &tokens[2..vi];
            let value_parts = &tokens[vi + 1..];
            if name_parts.is_empty() {
                warn!("malformed setoption: empty name");
                return None;
            }
            let value = if value_parts.is_empty() {
                None
            } else {
                Some(value_parts.join(" "))
            };
            (name_parts.join(" "), value)
        }
        None => (tokens[2..].join(" "), None),
    };

    Some(Command::SetOption { name, value })
}

fn parse_single(tokens: &[&str], usage: &str) -> Option<String> {
    if tokens.len() != 2 {
        warn!(command = tokens[0], "malformed command: expected '{usage}'");
        return None;
    }
    Some(tokens[1].to_string())
}

/// Parses `seed <n>`.
fn parse_seed(tokens: &[&str]) -> Option<Command> {
    let raw = parse_single(tokens, "seed <n>")?;
    match raw.parse::<u64>() {
        Ok(seed) => Some(Command::Seed { seed }),
        Err(_) => {
            warn!(value = %raw, "invalid seed value");
            None
        }
    }
}

/// Parses `actions [1|2]`.
fn parse_actions(tokens: &[&str]) -> Option<Command> {
    match tokens.get(1) {
        None => Some(Command::Actions { player: None }),
        Some(raw) => match raw.parse::<u8>().ok().and_then(Player::from_number) {
            Some(player) => Some(Command::Actions { player: Some(player) }),
            None => {
                warn!(value = %raw, "unknown player");
                None
            }
        },
    }
}

/// Everything after the command word, which may contain spaces.
fn rest_of_line(line: &str, word: &str) -> Option<String> {
    let rest = line.strip_prefix(word).unwrap_or("").trim();
    if rest.is_empty() {
        warn!(command = word, "malformed command: expected '{word} <json>'");
        return None;
    }
    Some(rest.to_string())
}
