//! Session protocol handling.
//!
//! Line-oriented commands on stdin, responses on stdout. Game states and
//! actions travel as JSON.

pub mod json;
pub mod parser;

pub use json::{decode_action, decode_state, encode_action, encode_state, encode_state_pretty};
pub use parser::{parse_command, Command};
