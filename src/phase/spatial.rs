//! Spatial rules shared by the phases: engagement, coherency, placement
//! legality, movement distance and paths, line of sight, and the formation
//! helpers used to propose concrete model positions.

use crate::board::{Footprint, GameState, ModelId, ModelPlacement, Player, Point, Unit};

use super::validation::Checks;
use super::RulesContext;

/// Slack for floating point comparisons, in board units.
pub const EPSILON: f64 = 1e-6;

/// Gap between adjacent bases in generated formations, in inches.
const FORMATION_GAP: f64 = 0.5;

/// Smallest edge-to-edge gap between the living models of two units.
/// Infinite if either unit has no living models.
pub fn unit_gap(ctx: &RulesContext, a: &Unit, b: &Unit) -> f64 {
    footprints_gap(ctx, &a.footprints(), &b.footprints())
}

pub fn footprints_gap(ctx: &RulesContext, a: &[Footprint], b: &[Footprint]) -> f64 {
    let mut best = f64::INFINITY;
    for fa in a {
        for fb in b {
            best = best.min(ctx.geometry.edge_distance(fa, fb));
        }
    }
    best
}

/// True if a gap in board units is within `inches`.
pub fn within(ctx: &RulesContext, gap: f64, inches: f64) -> bool {
    gap <= ctx.px(inches) + EPSILON
}

/// Active enemy units of `owner`.
pub fn enemies<'s>(state: &'s GameState, owner: Player) -> impl Iterator<Item = &'s Unit> + 's {
    state.active_units_of(owner.opponent())
}

pub fn engaged_with(ctx: &RulesContext, a: &Unit, b: &Unit) -> bool {
    within(ctx, unit_gap(ctx, a, b), ctx.config.engagement_range)
}

/// Enemy units within engagement range of `unit`.
pub fn engaged_enemies<'s>(state: &'s GameState, ctx: &RulesContext, unit: &Unit) -> Vec<&'s Unit> {
    enemies(state, unit.owner)
        .filter(|e| engaged_with(ctx, unit, e))
        .collect()
}

pub fn is_engaged(state: &GameState, ctx: &RulesContext, unit: &Unit) -> bool {
    enemies(state, unit.owner).any(|e| engaged_with(ctx, unit, e))
}

/// Footprints of every living enemy model.
pub fn enemy_footprints(state: &GameState, owner: Player) -> Vec<Footprint> {
    enemies(state, owner).flat_map(|u| u.footprints()).collect()
}

/// Edge distance from `fp` to the nearest of `others`.
pub fn nearest_gap(ctx: &RulesContext, fp: &Footprint, others: &[Footprint]) -> Option<f64> {
    others
        .iter()
        .map(|o| ctx.geometry.edge_distance(fp, o))
        .min_by(f64::total_cmp)
}

/// True if the segment stays clear of impassable terrain.
pub fn path_clear(state: &GameState, ctx: &RulesContext, from: Point, to: Point) -> bool {
    state
        .board
        .impassable()
        .all(|t| !ctx.geometry.segment_crosses_polygon(from, to, &t.footprint))
}

/// True if some model of `a` can see some model of `b`: the line between
/// their centres crosses no obscuring terrain.
pub fn has_line_of_sight(state: &GameState, ctx: &RulesContext, a: &Unit, b: &Unit) -> bool {
    let blockers: Vec<&[Point]> = state.board.obscuring().map(|t| t.footprint.as_slice()).collect();
    a.alive_models().any(|ma| {
        b.alive_models().any(|mb| {
            blockers
                .iter()
                .all(|poly| !ctx.geometry.segment_crosses_polygon(ma.position, mb.position, poly))
        })
    })
}

/// Models of `unit` with an edge gap to some model of `target` within `inches`.
pub fn models_within(ctx: &RulesContext, unit: &Unit, target: &Unit, inches: f64) -> usize {
    let targets = target.footprints();
    unit.alive_models()
        .filter(|m| {
            nearest_gap(ctx, &m.footprint(), &targets).is_some_and(|g| within(ctx, g, inches))
        })
        .count()
}

/// A model's destination resolved against its current position.
#[derive(Debug, Clone, PartialEq)]
pub struct Placed {
    pub model: ModelId,
    pub from: Point,
    pub footprint: Footprint,
}

impl Placed {
    pub fn travel(&self) -> f64 {
        self.from.distance(self.footprint.position)
    }
}

/// Matches placements to the unit's living models. Every living model must
/// be placed exactly once.
pub fn resolve_placements(unit: &Unit, placements: &[ModelPlacement], checks: &mut Checks) -> Option<Vec<Placed>> {
    let mut placed: Vec<Placed> = Vec::with_capacity(placements.len());
    let mut complete = true;
    for p in placements {
        let Some(model) = unit.model(&p.model_id) else {
            checks.fail(format!("unit '{}' has no model '{}'", unit.id, p.model_id));
            complete = false;
            continue;
        };
        if !model.alive {
            checks.fail(format!("model '{}' is not alive", p.model_id));
            complete = false;
            continue;
        }
        if placed.iter().any(|q| q.model == p.model_id) {
            checks.fail(format!("model '{}' is placed more than once", p.model_id));
            complete = false;
            continue;
        }
        placed.push(Placed {
            model: p.model_id.clone(),
            from: model.position,
            footprint: Footprint::new(model.base, p.position(), p.rotation),
        });
    }
    for model in unit.alive_models() {
        if !placed.iter().any(|q| q.model == model.id) {
            checks.fail(format!("model '{}' of unit '{}' has no placement", model.id, unit.id));
            complete = false;
        }
    }
    complete.then_some(placed)
}

/// True if every model has enough neighbours within coherency range.
pub fn coherent(ctx: &RulesContext, fps: &[Footprint]) -> bool {
    if fps.len() <= 1 {
        return true;
    }
    let needed = if fps.len() >= 7 { 2 } else { 1 };
    fps.iter().enumerate().all(|(i, a)| {
        fps.iter()
            .enumerate()
            .filter(|(j, b)| *j != i && within(ctx, ctx.geometry.edge_distance(a, b), ctx.config.coherency_range))
            .count()
            >= needed
    })
}

/// Where models may stand: on the board, clear of other bases and
/// impassable terrain, and in coherency.
pub fn check_positions(state: &GameState, ctx: &RulesContext, unit: &Unit, placed: &[Placed], checks: &mut Checks) {
    let board = &state.board;
    for p in placed {
        let pos = p.footprint.position;
        checks.require(board.contains(pos), || {
            format!("model '{}' at ({:.1}, {:.1}) is off the board", p.model, pos.x, pos.y)
        });
        for terrain in board.impassable() {
            checks.require(!ctx.geometry.shape_overlaps_polygon(&p.footprint, &terrain.footprint), || {
                format!("model '{}' would stand in impassable terrain '{}'", p.model, terrain.id)
            });
        }
    }

    for (i, a) in placed.iter().enumerate() {
        for b in &placed[i + 1..] {
            checks.require(!overlaps(ctx, &a.footprint, &b.footprint), || {
                format!("models '{}' and '{}' would overlap", a.model, b.model)
            });
        }
    }

    for other in state.units.values().filter(|u| u.id != unit.id && u.is_active()) {
        for om in other.alive_models() {
            let ofp = om.footprint();
            for p in placed {
                checks.require(!overlaps(ctx, &p.footprint, &ofp), || {
                    format!("model '{}' would overlap model '{}' of unit '{}'", p.model, om.id, other.id)
                });
            }
        }
    }

    let fps: Vec<Footprint> = placed.iter().map(|p| p.footprint).collect();
    checks.require(coherent(ctx, &fps), || {
        format!(
            "unit '{}' would break coherency ({}\" between models)",
            unit.id, ctx.config.coherency_range
        )
    });
}

fn overlaps(ctx: &RulesContext, a: &Footprint, b: &Footprint) -> bool {
    ctx.geometry
        .overlaps_with(&a.shape, a.position, a.rotation, &b.shape, b.position, b.rotation)
}

/// Every model travels at most `max_inches`.
pub fn check_distance(ctx: &RulesContext, placed: &[Placed], max_inches: f64, checks: &mut Checks) {
    for p in placed {
        let travel = p.travel();
        checks.require(within(ctx, travel, max_inches), || {
            format!(
                "model '{}' would move {:.2}\", more than the {max_inches}\" allowed",
                p.model,
                ctx.inches(travel)
            )
        });
    }
}

/// No model's straight path crosses impassable terrain.
pub fn check_paths(state: &GameState, ctx: &RulesContext, placed: &[Placed], checks: &mut Checks) {
    for p in placed.iter().filter(|p| p.travel() > EPSILON) {
        checks.require(path_clear(state, ctx, p.from, p.footprint.position), || {
            format!("model '{}' cannot move through impassable terrain", p.model)
        });
    }
}

/// True if placed models would end within engagement range of `enemy`.
pub fn placed_engaged_with(ctx: &RulesContext, placed: &[Placed], enemy: &Unit) -> bool {
    let fps: Vec<Footprint> = placed.iter().map(|p| p.footprint).collect();
    within(ctx, footprints_gap(ctx, &fps, &enemy.footprints()), ctx.config.engagement_range)
}

/// Each model ends no farther from its nearest enemy model than it started.
pub fn check_closing(state: &GameState, ctx: &RulesContext, unit: &Unit, placed: &[Placed], checks: &mut Checks) {
    let enemy = enemy_footprints(state, unit.owner);
    if enemy.is_empty() {
        return;
    }
    for p in placed {
        let start = Footprint::new(p.footprint.shape, p.from, p.footprint.rotation);
        let (Some(before), Some(after)) = (nearest_gap(ctx, &start, &enemy), nearest_gap(ctx, &p.footprint, &enemy))
        else {
            continue;
        };
        checks.require(after <= before + EPSILON, || {
            format!("model '{}' would end farther from the nearest enemy", p.model)
        });
    }
}

/// Current positions of the living models.
pub fn stay(unit: &Unit) -> Vec<ModelPlacement> {
    unit.alive_models()
        .map(|m| ModelPlacement::new(m.id.clone(), m.position, m.rotation))
        .collect()
}

/// Living models shifted by `(dx, dy)`.
pub fn translated(unit: &Unit, dx: f64, dy: f64) -> Vec<ModelPlacement> {
    unit.alive_models()
        .map(|m| ModelPlacement::new(m.id.clone(), m.position.offset(dx, dy), m.rotation))
        .collect()
}

/// Centres of the closest pair of living models between two units, and
/// their edge gap.
pub fn closest_pair(ctx: &RulesContext, a: &Unit, b: &Unit) -> Option<(Point, Point, f64)> {
    let mut best: Option<(Point, Point, f64)> = None;
    for ma in a.alive_models() {
        for mb in b.alive_models() {
            let gap = ctx.geometry.edge_distance(&ma.footprint(), &mb.footprint());
            if best.map_or(true, |(_, _, g)| gap < g) {
                best = Some((ma.position, mb.position, gap));
            }
        }
    }
    best
}

/// Moves the whole unit straight at `target` by up to `max_travel` board
/// units, stopping once the closest gap shrinks to `stop_gap`.
pub fn approach(ctx: &RulesContext, unit: &Unit, target: &Unit, max_travel: f64, stop_gap: f64) -> Option<Vec<ModelPlacement>> {
    let (from, to, gap) = closest_pair(ctx, unit, target)?;
    let dist = from.distance(to);
    let travel = (gap - stop_gap).min(max_travel);
    if dist <= EPSILON || travel <= EPSILON {
        return None;
    }
    let (ux, uy) = ((to.x - from.x) / dist, (to.y - from.y) / dist);
    Some(translated(unit, ux * travel, uy * travel))
}

/// Moves the whole unit straight away from `threat` by `travel` board units.
pub fn withdraw(ctx: &RulesContext, unit: &Unit, threat: &Unit, travel: f64) -> Option<Vec<ModelPlacement>> {
    let (from, to, _) = closest_pair(ctx, unit, threat)?;
    let dist = from.distance(to);
    if dist <= EPSILON {
        return None;
    }
    let (ux, uy) = ((from.x - to.x) / dist, (from.y - to.y) / dist);
    Some(translated(unit, ux * travel, uy * travel))
}

/// Moves the whole unit's centroid towards a point by up to `max_travel`.
pub fn advance_towards(unit: &Unit, goal: Point, max_travel: f64) -> Option<Vec<ModelPlacement>> {
    let centre = unit.centroid();
    let next = centre.towards(goal, max_travel);
    let (dx, dy) = (next.x - centre.x, next.y - centre.y);
    if dx.hypot(dy) <= EPSILON {
        return None;
    }
    Some(translated(unit, dx, dy))
}

/// Moves each model separately towards its nearest enemy model, stopping
/// at `stop_gap`.
pub fn close_individually(
    state: &GameState,
    ctx: &RulesContext,
    unit: &Unit,
    max_travel: f64,
    stop_gap: f64,
) -> Option<Vec<ModelPlacement>> {
    let enemy: Vec<Footprint> = enemy_footprints(state, unit.owner);
    if enemy.is_empty() {
        return None;
    }
    let mut moved = false;
    let placements: Vec<ModelPlacement> = unit
        .alive_models()
        .map(|m| {
            let fp = m.footprint();
            let nearest = enemy
                .iter()
                .map(|e| (e, ctx.geometry.edge_distance(&fp, e)))
                .min_by(|a, b| a.1.total_cmp(&b.1));
            let position = match nearest {
                Some((e, gap)) if gap > stop_gap + EPSILON => {
                    moved = true;
                    m.position.towards(e.position, (gap - stop_gap).min(max_travel))
                }
                _ => m.position,
            };
            ModelPlacement::new(m.id.clone(), position, m.rotation)
        })
        .collect();
    moved.then_some(placements)
}

/// Lays the unit out around `anchor`: one row for small units, two rows
/// from seven models so every model has two neighbours.
pub fn formation(ctx: &RulesContext, unit: &Unit, anchor: Point) -> Vec<ModelPlacement> {
    let models: Vec<_> = unit.alive_models().collect();
    let n = models.len();
    if n == 0 {
        return Vec::new();
    }
    let widest = models
        .iter()
        .map(|m| m.base.longest_mm())
        .fold(0.0_f64, f64::max);
    let spacing = widest * ctx.config.px_per_inch / crate::board::MM_PER_INCH + ctx.px(FORMATION_GAP);
    let rows = if n >= 7 { 2 } else { 1 };
    let cols = n.div_ceil(rows);
    let x0 = anchor.x - (cols as f64 - 1.0) * spacing / 2.0;
    let y0 = anchor.y - (rows as f64 - 1.0) * spacing / 2.0;
    models
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let (col, row) = (i % cols, i / cols);
            let pos = Point::new(x0 + col as f64 * spacing, y0 + row as f64 * spacing);
            ModelPlacement::new(m.id.clone(), pos, 0.0)
        })
        .collect()
}
