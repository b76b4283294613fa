//! Built-in scenarios.
//!
//! `skirmish` is a 60" x 44" table at 40 px per inch with two 12" deployment
//! strips, five objectives, a crater and a ruin, and three units a side.
//! `charge_duel` is two single-model units six inches apart at the start of
//! the charge phase.

use crate::board::{
    BaseShape, Board, DeploymentZone, GameState, Objective, Phase, Player, Point, TerrainFeature, Unit,
    UnitProfile, UnitStatus, WeaponProfile,
};

pub const SCENARIO_NAMES: [&str; 2] = ["skirmish", "charge_duel"];

const WIDTH: f64 = 2400.0;
const HEIGHT: f64 = 1760.0;
const ZONE_DEPTH: f64 = 480.0;

fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Point> {
    vec![Point::new(x0, y0), Point::new(x1, y0), Point::new(x1, y1), Point::new(x0, y1)]
}

fn weapon(name: &str, range_inches: f64, attacks: u32, skill: u8, strength: u8, ap: u8, damage: u32) -> WeaponProfile {
    WeaponProfile {
        name: name.to_string(),
        range_inches,
        attacks,
        skill,
        strength,
        armour_penetration: ap,
        damage,
    }
}

fn battleline() -> UnitProfile {
    UnitProfile {
        movement: 6.0,
        toughness: 4,
        save: 3,
        wounds: 2,
        leadership: 6,
        objective_control: 2,
        ranged: vec![weapon("bolt rifle", 24.0, 2, 3, 4, 1, 1)],
        melee: vec![weapon("close combat weapon", 0.0, 3, 3, 4, 0, 1)],
    }
}

fn assault() -> UnitProfile {
    UnitProfile {
        movement: 6.0,
        toughness: 4,
        save: 3,
        wounds: 2,
        leadership: 6,
        objective_control: 1,
        ranged: vec![weapon("heavy pistol", 12.0, 1, 3, 4, 0, 1)],
        melee: vec![weapon("chainsword", 0.0, 4, 3, 4, 1, 1)],
    }
}

fn support() -> UnitProfile {
    UnitProfile {
        movement: 5.0,
        toughness: 5,
        save: 3,
        wounds: 3,
        leadership: 6,
        objective_control: 1,
        ranged: vec![weapon("heavy bolter", 36.0, 3, 4, 5, 1, 2)],
        melee: vec![weapon("close combat weapon", 0.0, 2, 4, 4, 0, 1)],
    }
}

fn army(player: Player) -> Vec<Unit> {
    let p = player.number();
    vec![
        Unit::new(format!("p{p}-battleline"), "Battleline Squad", player, battleline(), BaseShape::infantry(), 5),
        Unit::new(format!("p{p}-assault"), "Assault Squad", player, assault(), BaseShape::infantry(), 5),
        Unit::new(
            format!("p{p}-support"),
            "Support Team",
            player,
            support(),
            BaseShape::Circle { diameter_mm: 40.0 },
            3,
        ),
    ]
}

/// The default battle: both armies undeployed, deployment about to begin.
pub fn skirmish() -> GameState {
    let mut board = Board::new(WIDTH, HEIGHT);
    board.deployment_zones = vec![
        DeploymentZone { player: Player::One, polygon: rect(0.0, 0.0, WIDTH, ZONE_DEPTH) },
        DeploymentZone { player: Player::Two, polygon: rect(0.0, HEIGHT - ZONE_DEPTH, WIDTH, HEIGHT) },
    ];
    board.objectives = [
        ("home-one", 1200.0, 240.0),
        ("home-two", 1200.0, 1520.0),
        ("west", 480.0, 880.0),
        ("centre", 1200.0, 880.0),
        ("east", 1920.0, 880.0),
    ]
    .into_iter()
    .map(|(id, x, y)| Objective { id: id.to_string(), position: Point::new(x, y) })
    .collect();
    board.terrain = vec![
        TerrainFeature {
            id: "crater".to_string(),
            footprint: rect(700.0, 760.0, 860.0, 1000.0),
            impassable: true,
            obscuring: false,
        },
        TerrainFeature {
            id: "ruin".to_string(),
            footprint: rect(1500.0, 620.0, 1700.0, 780.0),
            impassable: false,
            obscuring: true,
        },
    ];

    let mut state = GameState::new(board);
    state.flags.tempting_target = Some("centre".to_string());
    for unit in army(Player::One).into_iter().chain(army(Player::Two)) {
        state.add_unit(unit);
    }
    state
}

/// Unit `a` (player one) six inches from unit `b` (player two), centre to
/// centre, with the charge phase about to begin.
pub fn charge_duel() -> GameState {
    let profile = UnitProfile {
        movement: 6.0,
        toughness: 4,
        save: 3,
        wounds: 1,
        leadership: 7,
        objective_control: 1,
        ranged: vec![weapon("carbine", 18.0, 1, 4, 4, 0, 1)],
        melee: vec![weapon("blade", 0.0, 2, 3, 4, 0, 1)],
    };
    let mut state = GameState::new(Board::new(WIDTH, HEIGHT));
    for (id, owner, x) in [("a", Player::One, 100.0), ("b", Player::Two, 340.0)] {
        let mut unit = Unit::new(id, id, owner, profile.clone(), BaseShape::infantry(), 1);
        unit.status = UnitStatus::Deployed;
        unit.models[0].position = Point::new(x, 100.0);
        state.add_unit(unit);
    }
    state.phase = Phase::Charge;
    state.command_points = [1, 1];
    state
}

pub fn by_name(name: &str) -> Option<GameState> {
    match name {
        "skirmish" => Some(skirmish()),
        "charge_duel" => Some(charge_duel()),
        _ => None,
    }
}
