//! Units, models, ownership and the per-unit flag set.
//!
//! A unit is created when an army list is loaded and is never removed from
//! the battle; when its last model dies its status flips to `Destroyed`.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::geometry::{BaseShape, Footprint, Point};

/// One of the two players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Player {
    One,
    Two,
}

/// Both players in turn order.
pub const ALL_PLAYERS: [Player; 2] = [Player::One, Player::Two];

impl Player {
    /// The player's number as shown to users: 1 or 2.
    pub const fn number(self) -> u8 {
        match self {
            Player::One => 1,
            Player::Two => 2,
        }
    }

    /// Zero-based index for per-player arrays.
    pub const fn index(self) -> usize {
        match self {
            Player::One => 0,
            Player::Two => 1,
        }
    }

    pub const fn opponent(self) -> Player {
        match self {
            Player::One => Player::Two,
            Player::Two => Player::One,
        }
    }

    pub fn from_number(n: u8) -> Option<Player> {
        match n {
            1 => Some(Player::One),
            2 => Some(Player::Two),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Player {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Player::from_number(n).ok_or_else(|| format!("player must be 1 or 2, got {n}"))
    }
}

impl From<Player> for u8 {
    fn from(p: Player) -> u8 {
        p.number()
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player {}", self.number())
    }
}

/// Stable identifier of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        UnitId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UnitId {
    fn from(s: &str) -> Self {
        UnitId(s.to_string())
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a model, unique within its unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(pub String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        ModelId(id.into())
    }
}

impl From<&str> for ModelId {
    fn from(s: &str) -> Self {
        ModelId(s.to_string())
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a unit. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    Undeployed,
    Deployed,
    Destroyed,
}

impl UnitStatus {
    fn rank(self) -> u8 {
        match self {
            UnitStatus::Undeployed => 0,
            UnitStatus::Deployed => 1,
            UnitStatus::Destroyed => 2,
        }
    }

    /// Returns true if moving from `self` to `next` keeps the status monotonic.
    pub fn can_become(self, next: UnitStatus) -> bool {
        next.rank() >= self.rank()
    }

    pub const fn name(self) -> &'static str {
        match self {
            UnitStatus::Undeployed => "UNDEPLOYED",
            UnitStatus::Deployed => "DEPLOYED",
            UnitStatus::Destroyed => "DESTROYED",
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A turn-scoped unit flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitFlag {
    HasCharged,
    ChargeAttempted,
    CannotCharge,
    FellBack,
    Advanced,
    HasShot,
    FiredOverwatch,
    HasFought,
    BattleShocked,
}

pub const ALL_FLAGS: [UnitFlag; 9] = [
    UnitFlag::HasCharged,
    UnitFlag::ChargeAttempted,
    UnitFlag::CannotCharge,
    UnitFlag::FellBack,
    UnitFlag::Advanced,
    UnitFlag::HasShot,
    UnitFlag::FiredOverwatch,
    UnitFlag::HasFought,
    UnitFlag::BattleShocked,
];

impl UnitFlag {
    pub const fn name(self) -> &'static str {
        match self {
            UnitFlag::HasCharged => "has_charged",
            UnitFlag::ChargeAttempted => "charge_attempted",
            UnitFlag::CannotCharge => "cannot_charge",
            UnitFlag::FellBack => "fell_back",
            UnitFlag::Advanced => "advanced",
            UnitFlag::HasShot => "has_shot",
            UnitFlag::FiredOverwatch => "fired_overwatch",
            UnitFlag::HasFought => "has_fought",
            UnitFlag::BattleShocked => "battle_shocked",
        }
    }
}

/// Flags that gate legality in later phases. Cleared when the owner's
/// command phase begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitFlags {
    pub has_charged: bool,
    pub charge_attempted: bool,
    pub cannot_charge: bool,
    pub fell_back: bool,
    pub advanced: bool,
    pub has_shot: bool,
    pub fired_overwatch: bool,
    pub has_fought: bool,
    pub battle_shocked: bool,
}

impl UnitFlags {
    pub fn get(&self, flag: UnitFlag) -> bool {
        match flag {
            UnitFlag::HasCharged => self.has_charged,
            UnitFlag::ChargeAttempted => self.charge_attempted,
            UnitFlag::CannotCharge => self.cannot_charge,
            UnitFlag::FellBack => self.fell_back,
            UnitFlag::Advanced => self.advanced,
            UnitFlag::HasShot => self.has_shot,
            UnitFlag::FiredOverwatch => self.fired_overwatch,
            UnitFlag::HasFought => self.has_fought,
            UnitFlag::BattleShocked => self.battle_shocked,
        }
    }

    pub fn set(&mut self, flag: UnitFlag, value: bool) {
        let slot = match flag {
            UnitFlag::HasCharged => &mut self.has_charged,
            UnitFlag::ChargeAttempted => &mut self.charge_attempted,
            UnitFlag::CannotCharge => &mut self.cannot_charge,
            UnitFlag::FellBack => &mut self.fell_back,
            UnitFlag::Advanced => &mut self.advanced,
            UnitFlag::HasShot => &mut self.has_shot,
            UnitFlag::FiredOverwatch => &mut self.fired_overwatch,
            UnitFlag::HasFought => &mut self.has_fought,
            UnitFlag::BattleShocked => &mut self.battle_shocked,
        };
        *slot = value;
    }

    /// Flags currently raised.
    pub fn raised(&self) -> impl Iterator<Item = UnitFlag> + '_ {
        ALL_FLAGS.into_iter().filter(|f| self.get(*f))
    }
}

/// Highest attacks characteristic a stored weapon profile may carry.
pub const MAX_WEAPON_ATTACKS: u32 = 100;

/// A weapon profile. Melee weapons have a range of zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponProfile {
    pub name: String,
    #[serde(default)]
    pub range_inches: f64,
    pub attacks: u32,
    /// Ballistic or weapon skill: the D6 result needed to hit.
    pub skill: u8,
    pub strength: u8,
    /// Armour penetration, added to the save roll target.
    #[serde(default)]
    pub armour_penetration: u8,
    pub damage: u32,
}

/// Characteristics shared by every model of a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitProfile {
    /// Movement characteristic in inches.
    pub movement: f64,
    pub toughness: u8,
    pub save: u8,
    /// Wounds per model.
    pub wounds: u32,
    /// 2D6 result needed to pass a battle-shock test.
    pub leadership: u8,
    pub objective_control: u32,
    #[serde(default)]
    pub ranged: Vec<WeaponProfile>,
    #[serde(default)]
    pub melee: Vec<WeaponProfile>,
}

/// A single miniature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: ModelId,
    pub position: Point,
    #[serde(default)]
    pub rotation: f64,
    pub alive: bool,
    pub wounds: u32,
    pub base: BaseShape,
}

impl Model {
    pub fn new(id: impl Into<String>, base: BaseShape, wounds: u32) -> Self {
        Model {
            id: ModelId::new(id),
            position: Point::default(),
            rotation: 0.0,
            alive: true,
            wounds,
            base,
        }
    }

    pub fn footprint(&self) -> Footprint {
        Footprint::new(self.base, self.position, self.rotation)
    }
}

/// A unit of models that moves and fights together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub name: String,
    pub owner: Player,
    pub models: Vec<Model>,
    pub status: UnitStatus,
    #[serde(default)]
    pub flags: UnitFlags,
    pub profile: UnitProfile,
    /// Model count when the army list was loaded.
    pub starting_strength: usize,
}

impl Unit {
    /// Builds an undeployed unit of `count` identical models.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        owner: Player,
        profile: UnitProfile,
        base: BaseShape,
        count: usize,
    ) -> Self {
        let id = UnitId::new(id);
        let models = (0..count)
            .map(|i| Model::new(format!("{}-m{}", id, i + 1), base, profile.wounds))
            .collect();
        Unit {
            id,
            name: name.into(),
            owner,
            models,
            status: UnitStatus::Undeployed,
            flags: UnitFlags::default(),
            profile,
            starting_strength: count,
        }
    }

    pub fn alive_models(&self) -> impl Iterator<Item = &Model> + '_ {
        self.models.iter().filter(|m| m.alive)
    }

    pub fn alive_count(&self) -> usize {
        self.alive_models().count()
    }

    /// True if the unit is on the battlefield with at least one living model.
    pub fn is_active(&self) -> bool {
        self.status == UnitStatus::Deployed && self.models.iter().any(|m| m.alive)
    }

    pub fn model(&self, id: &ModelId) -> Option<&Model> {
        self.models.iter().find(|m| &m.id == id)
    }

    pub fn model_mut(&mut self, id: &ModelId) -> Option<&mut Model> {
        self.models.iter_mut().find(|m| &m.id == id)
    }

    /// Footprints of all living models.
    pub fn footprints(&self) -> Vec<Footprint> {
        self.alive_models().map(Model::footprint).collect()
    }

    /// Mean position of the living models.
    pub fn centroid(&self) -> Point {
        let alive: Vec<&Model> = self.alive_models().collect();
        if alive.is_empty() {
            return Point::default();
        }
        let n = alive.len() as f64;
        let (sx, sy) = alive
            .iter()
            .fold((0.0, 0.0), |(sx, sy), m| (sx + m.position.x, sy + m.position.y));
        Point::new(sx / n, sy / n)
    }

    /// Below half strength: fewer than half the starting models remain, or
    /// a single-model unit has lost more than half its wounds.
    pub fn is_below_half_strength(&self) -> bool {
        if self.starting_strength == 1 {
            return self
                .models
                .first()
                .map(|m| !m.alive || m.wounds * 2 < self.profile.wounds)
                .unwrap_or(true);
        }
        self.alive_count() * 2 < self.starting_strength
    }
}
