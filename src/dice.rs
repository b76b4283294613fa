//! Injectable dice.
//!
//! Every executor that rolls takes a `&mut dyn DiceRoller`, so a seeded
//! source reproduces a whole battle and a scripted source pins exact rolls
//! in tests.

use std::collections::VecDeque;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

/// Source of six-sided dice results.
pub trait DiceRoller: Send {
    /// Rolls one D6 (1-6 inclusive).
    fn roll_d6(&mut self) -> u8;

    /// Rolls `count` D6 in order.
    fn roll_d6s(&mut self, count: usize) -> Vec<u8> {
        (0..count).map(|_| self.roll_d6()).collect()
    }

    /// Rolls 2D6 and returns both dice.
    fn roll_2d6(&mut self) -> [u8; 2] {
        [self.roll_d6(), self.roll_d6()]
    }
}

/// Pseudo-random dice backed by `SmallRng`.
#[derive(Debug, Clone)]
pub struct SeededDice {
    rng: SmallRng,
}

impl SeededDice {
    pub fn new(seed: u64) -> Self {
        SeededDice { rng: SmallRng::seed_from_u64(seed) }
    }

    pub fn from_entropy() -> Self {
        SeededDice { rng: SmallRng::from_entropy() }
    }
}

impl DiceRoller for SeededDice {
    fn roll_d6(&mut self) -> u8 {
        self.rng.gen_range(1..=6)
    }
}

/// Dice that return a fixed sequence. Once exhausted every roll is a 1.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDice {
    rolls: VecDeque<u8>,
}

impl ScriptedDice {
    pub fn new(rolls: impl IntoIterator<Item = u8>) -> Self {
        ScriptedDice {
            rolls: rolls.into_iter().map(|r| r.clamp(1, 6)).collect(),
        }
    }

    pub fn push(&mut self, roll: u8) {
        self.rolls.push_back(roll.clamp(1, 6));
    }

    pub fn remaining(&self) -> usize {
        self.rolls.len()
    }
}

impl DiceRoller for ScriptedDice {
    fn roll_d6(&mut self) -> u8 {
        match self.rolls.pop_front() {
            Some(r) => r,
            None => {
                warn!("scripted dice exhausted, rolling 1");
                1
            }
        }
    }
}
