//! Actions proposed by players and agents.
//!
//! Every action is a closed variant carrying exactly the payload its phase
//! needs. Payloads are decoded once, at the protocol boundary, into these
//! types; the rules never look fields up by name.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::geometry::Point;
use super::unit::{ModelId, Player, UnitId};

/// Destination of a single model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPlacement {
    pub model_id: ModelId,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub rotation: f64,
}

impl ModelPlacement {
    pub fn new(model_id: ModelId, position: Point, rotation: f64) -> Self {
        ModelPlacement {
            model_id,
            x: position.x,
            y: position.y,
            rotation,
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// A proposed game action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Place an undeployed unit inside its owner's deployment zone.
    DeployUnit {
        unit_id: UnitId,
        placements: Vec<ModelPlacement>,
    },

    /// Take a battle-shock test for a unit below half strength.
    BattleShockTest { unit_id: UnitId },

    /// Normal move, or the move that follows an advance roll.
    Move {
        unit_id: UnitId,
        placements: Vec<ModelPlacement>,
    },

    /// Roll to advance; the unit then moves with the bonus added.
    Advance { unit_id: UnitId },

    /// Leave engagement range.
    FallBack {
        unit_id: UnitId,
        placements: Vec<ModelPlacement>,
    },

    RemainStationary { unit_id: UnitId },

    Shoot { unit_id: UnitId, target_id: UnitId },

    DeclareCharge {
        unit_id: UnitId,
        target_ids: Vec<UnitId>,
    },

    RollCharge { unit_id: UnitId },

    ChargeMove {
        unit_id: UnitId,
        placements: Vec<ModelPlacement>,
    },

    SkipCharge { unit_id: UnitId },

    /// Reactive fire by the non-active player at a unit that declared a charge.
    Overwatch { unit_id: UnitId, target_id: UnitId },

    PileIn {
        unit_id: UnitId,
        placements: Vec<ModelPlacement>,
    },

    Fight { unit_id: UnitId, target_id: UnitId },

    Consolidate {
        unit_id: UnitId,
        placements: Vec<ModelPlacement>,
    },

    /// Explicit end of the current phase by the active player.
    EndPhase { player: Player },
}

/// The tag of an action, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    DeployUnit,
    BattleShockTest,
    Move,
    Advance,
    FallBack,
    RemainStationary,
    Shoot,
    DeclareCharge,
    RollCharge,
    ChargeMove,
    SkipCharge,
    Overwatch,
    PileIn,
    Fight,
    Consolidate,
    EndPhase,
}

impl ActionKind {
    /// The wire name of the kind.
    pub const fn name(self) -> &'static str {
        match self {
            ActionKind::DeployUnit => "DEPLOY_UNIT",
            ActionKind::BattleShockTest => "BATTLE_SHOCK_TEST",
            ActionKind::Move => "MOVE",
            ActionKind::Advance => "ADVANCE",
            ActionKind::FallBack => "FALL_BACK",
            ActionKind::RemainStationary => "REMAIN_STATIONARY",
            ActionKind::Shoot => "SHOOT",
            ActionKind::DeclareCharge => "DECLARE_CHARGE",
            ActionKind::RollCharge => "ROLL_CHARGE",
            ActionKind::ChargeMove => "CHARGE_MOVE",
            ActionKind::SkipCharge => "SKIP_CHARGE",
            ActionKind::Overwatch => "OVERWATCH",
            ActionKind::PileIn => "PILE_IN",
            ActionKind::Fight => "FIGHT",
            ActionKind::Consolidate => "CONSOLIDATE",
            ActionKind::EndPhase => "END_PHASE",
        }
    }

    pub fn from_name(name: &str) -> Option<ActionKind> {
        ALL_ACTION_KINDS.into_iter().find(|k| k.name() == name)
    }
}

pub const ALL_ACTION_KINDS: [ActionKind; 16] = [
    ActionKind::DeployUnit,
    ActionKind::BattleShockTest,
    ActionKind::Move,
    ActionKind::Advance,
    ActionKind::FallBack,
    ActionKind::RemainStationary,
    ActionKind::Shoot,
    ActionKind::DeclareCharge,
    ActionKind::RollCharge,
    ActionKind::ChargeMove,
    ActionKind::SkipCharge,
    ActionKind::Overwatch,
    ActionKind::PileIn,
    ActionKind::Fight,
    ActionKind::Consolidate,
    ActionKind::EndPhase,
];

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::DeployUnit { .. } => ActionKind::DeployUnit,
            Action::BattleShockTest { .. } => ActionKind::BattleShockTest,
            Action::Move { .. } => ActionKind::Move,
            Action::Advance { .. } => ActionKind::Advance,
            Action::FallBack { .. } => ActionKind::FallBack,
            Action::RemainStationary { .. } => ActionKind::RemainStationary,
            Action::Shoot { .. } => ActionKind::Shoot,
            Action::DeclareCharge { .. } => ActionKind::DeclareCharge,
            Action::RollCharge { .. } => ActionKind::RollCharge,
            Action::ChargeMove { .. } => ActionKind::ChargeMove,
            Action::SkipCharge { .. } => ActionKind::SkipCharge,
            Action::Overwatch { .. } => ActionKind::Overwatch,
            Action::PileIn { .. } => ActionKind::PileIn,
            Action::Fight { .. } => ActionKind::Fight,
            Action::Consolidate { .. } => ActionKind::Consolidate,
            Action::EndPhase { .. } => ActionKind::EndPhase,
        }
    }

    /// The acting unit, if the action has one.
    pub fn actor(&self) -> Option<&UnitId> {
        match self {
            Action::DeployUnit { unit_id, .. }
            | Action::BattleShockTest { unit_id }
            | Action::Move { unit_id, .. }
            | Action::Advance { unit_id }
            | Action::FallBack { unit_id, .. }
            | Action::RemainStationary { unit_id }
            | Action::Shoot { unit_id, .. }
            | Action::DeclareCharge { unit_id, .. }
            | Action::RollCharge { unit_id }
            | Action::ChargeMove { unit_id, .. }
            | Action::SkipCharge { unit_id }
            | Action::Overwatch { unit_id, .. }
            | Action::PileIn { unit_id, .. }
            | Action::Fight { unit_id, .. }
            | Action::Consolidate { unit_id, .. } => Some(unit_id),
            Action::EndPhase { .. } => None,
        }
    }

    /// Model destinations carried by the action, if any.
    pub fn placements(&self) -> Option<&[ModelPlacement]> {
        match self {
            Action::DeployUnit { placements, .. }
            | Action::Move { placements, .. }
            | Action::FallBack { placements, .. }
            | Action::ChargeMove { placements, .. }
            | Action::PileIn { placements, .. }
            | Action::Consolidate { placements, .. } => Some(placements),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_match_wire_tags() {
        let action = Action::RollCharge { unit_id: UnitId::from("a") };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["kind"], action.kind().name());

        let deploy = Action::DeployUnit { unit_id: UnitId::from("a"), placements: vec![] };
        let json = serde_json::to_value(&deploy).unwrap();
        assert_eq!(json["kind"], "DEPLOY_UNIT");
    }

    #[test]
    fn actor_and_placements() {
        let end = Action::EndPhase { player: Player::One };
        assert!(end.actor().is_none());
        assert!(end.placements().is_none());

        let mv = Action::Move {
            unit_id: UnitId::from("u"),
            placements: vec![ModelPlacement::new(ModelId::from("m"), Point::new(1.0, 2.0), 0.0)],
        };
        assert_eq!(mv.actor(), Some(&UnitId::from("u")));
        assert_eq!(mv.placements().map(|p| p.len()), Some(1));
    }

    #[test]
    fn rotation_defaults_to_zero() {
        let json = r#"{"kind":"MOVE","unit_id":"u","placements":[{"model_id":"m","x":1.5,"y":2}]}"#;
        let action: Action = serde_json::from_str(json).unwrap();
        let placements = action.placements().unwrap();
        assert_eq!(placements[0].rotation, 0.0);
        assert_eq!(placements[0].position(), Point::new(1.5, 2.0));
    }

    #[test]
    fn non_numeric_coordinate_is_rejected_at_decode() {
        let json = r#"{"kind":"MOVE","unit_id":"u","placements":[{"model_id":"m","x":"far","y":2}]}"#;
        assert!(serde_json::from_str::<Action>(json).is_err());
    }
}
