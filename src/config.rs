//! Rules configuration.
//!
//! Distances are in inches; `px_per_inch` converts them to board units.
//! Every field has a default so partial JSON files are accepted.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown option '{0}'")]
    UnknownOption(String),

    #[error("invalid value '{value}' for option {name}")]
    InvalidValue { name: String, value: String },
}

/// Tunable rule constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub px_per_inch: f64,
    pub engagement_range: f64,
    pub coherency_range: f64,
    pub max_charge_distance: f64,
    pub pile_in_distance: f64,
    pub consolidate_distance: f64,
    pub objective_range: f64,
    pub max_battle_rounds: u32,
    pub command_points_per_turn: u32,
    pub overwatch_cost: u32,
    /// Minimum D6 result to hit when firing overwatch.
    pub overwatch_hit_roll: u8,
}

impl Default for RulesConfig {
    fn default() -> Self {
        RulesConfig {
            px_per_inch: 40.0,
            engagement_range: 1.0,
            coherency_range: 2.0,
            max_charge_distance: 12.0,
            pile_in_distance: 3.0,
            consolidate_distance: 3.0,
            objective_range: 3.0,
            max_battle_rounds: 5,
            command_points_per_turn: 1,
            overwatch_cost: 1,
            overwatch_hit_roll: 6,
        }
    }
}

/// Option names accepted by `set_option`, in the order they are advertised.
pub const OPTION_NAMES: [&str; 11] = [
    "PxPerInch",
    "EngagementRange",
    "CoherencyRange",
    "MaxChargeDistance",
    "PileInDistance",
    "ConsolidateDistance",
    "ObjectiveRange",
    "MaxBattleRounds",
    "CommandPointsPerTurn",
    "OverwatchCost",
    "OverwatchHitRoll",
];

impl RulesConfig {
    /// Loads a config from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Sets a single option by its protocol name.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        };
        let inches = || -> Result<f64, ConfigError> {
            value
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or_else(invalid)
        };
        let count = || value.parse::<u32>().map_err(|_| invalid());

        match name {
            "PxPerInch" => {
                let v = inches()?;
                if v == 0.0 {
                    return Err(invalid());
                }
                self.px_per_inch = v;
            }
            "EngagementRange" => self.engagement_range = inches()?,
            "CoherencyRange" => self.coherency_range = inches()?,
            "MaxChargeDistance" => self.max_charge_distance = inches()?,
            "PileInDistance" => self.pile_in_distance = inches()?,
            "ConsolidateDistance" => self.consolidate_distance = inches()?,
            "ObjectiveRange" => self.objective_range = inches()?,
            "MaxBattleRounds" => {
                let v = count()?;
                if v == 0 {
                    return Err(invalid());
                }
                self.max_battle_rounds = v;
            }
            "CommandPointsPerTurn" => self.command_points_per_turn = count()?,
            "OverwatchCost" => self.overwatch_cost = count()?,
            "OverwatchHitRoll" => {
                let v = value.parse::<u8>().map_err(|_| invalid())?;
                if !(1..=6).contains(&v) {
                    return Err(invalid());
                }
                self.overwatch_hit_roll = v;
            }
            other => return Err(ConfigError::UnknownOption(other.to_string())),
        }
        Ok(())
    }

    /// Current value of an option, formatted for the protocol.
    pub fn option_value(&self, name: &str) -> Option<String> {
        let value = match name {
            "PxPerInch" => self.px_per_inch.to_string(),
            "EngagementRange" => self.engagement_range.to_string(),
            "CoherencyRange" => self.coherency_range.to_string(),
            "MaxChargeDistance" => self.max_charge_distance.to_string(),
            "PileInDistance" => self.pile_in_distance.to_string(),
            "ConsolidateDistance" => self.consolidate_distance.to_string(),
            "ObjectiveRange" => self.objective_range.to_string(),
            "MaxBattleRounds" => self.max_battle_rounds.to_string(),
            "CommandPointsPerTurn" => self.command_points_per_turn.to_string(),
            "OverwatchCost" => self.overwatch_cost.to_string(),
            "OverwatchHitRoll" => self.overwatch_hit_roll.to_string(),
            _ => return None,
        };
        Some(value)
    }

    /// Converts inches to board units.
    pub fn px(&self, inches: f64) -> f64 {
        inches * self.px_per_inch
    }

    /// Converts board units to inches.
    pub fn inches(&self, px: f64) -> f64 {
        px / self.px_per_inch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RulesConfig::default();
        assert_eq!(config.px_per_inch, 40.0);
        assert_eq!(config.max_charge_distance, 12.0);
        assert_eq!(config.max_battle_rounds, 5);
        assert_eq!(config.px(6.0), 240.0);
        assert_eq!(config.inches(240.0), 6.0);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RulesConfig::from_json(r#"{"engagement_range": 2.0}"#).unwrap();
        assert_eq!(config.engagement_range, 2.0);
        assert_eq!(config.coherency_range, 2.0);
        assert_eq!(config.overwatch_hit_roll, 6);
    }

    #[test]
    fn bad_json_is_parse_error() {
        assert!(matches!(RulesConfig::from_json("{"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn load_missing_file() {
        let err = RulesConfig::load("/nonexistent/skirmish.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn set_option_by_name() {
        let mut config = RulesConfig::default();
        config.set_option("MaxBattleRounds", "3").unwrap();
        config.set_option("EngagementRange", "1.5").unwrap();
        assert_eq!(config.max_battle_rounds, 3);
        assert_eq!(config.option_value("EngagementRange").as_deref(), Some("1.5"));
    }

    #[test]
    fn set_option_rejects_bad_values() {
        let mut config = RulesConfig::default();
        assert!(matches!(config.set_option("Nope", "1"), Err(ConfigError::UnknownOption(_))));
        assert!(config.set_option("MaxBattleRounds", "0").is_err());
        assert!(config.set_option("OverwatchHitRoll", "7").is_err());
        assert!(config.set_option("CoherencyRange", "-1").is_err());
        assert!(config.set_option("PxPerInch", "abc").is_err());
        assert_eq!(config, RulesConfig::default());
    }

    #[test]
    fn every_option_has_a_value() {
        let config = RulesConfig::default();
        for name in OPTION_NAMES {
            assert!(config.option_value(name).is_some(), "{name}");
        }
    }
}
