//! Base shapes and the geometry service used by range and overlap checks.
//!
//! Positions are in board units (pixels). Base sizes are given in
//! millimetres and scaled with the board's pixels-per-inch ratio. Rotations
//! are in radians, counter-clockwise, about the base centre.

use geo::{Closest, ClosestPoint, Coord, EuclideanDistance, Intersects, Line, LineString, Polygon};
use serde::{Deserialize, Serialize};

/// Millimetres per inch, used to scale base sizes onto the board.
pub const MM_PER_INCH: f64 = 25.4;

/// Number of segments used when an oval or circle has to become a polygon.
const ARC_SEGMENTS: usize = 48;

/// A point on the board, in board units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    /// Straight-line distance to another point.
    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn offset(self, dx: f64, dy: f64) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }

    /// Moves up to `distance` towards `target`, stopping on it.
    pub fn towards(self, target: Point, distance: f64) -> Point {
        let d = self.distance(target);
        if d <= distance || d == 0.0 {
            return target;
        }
        let t = distance / d;
        Point::new(self.x + (target.x - self.x) * t, self.y + (target.y - self.y) * t)
    }

    fn to_coord(self) -> Coord<f64> {
        Coord { x: self.x, y: self.y }
    }
}

/// The physical base a model stands on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BaseShape {
    Circle { diameter_mm: f64 },
    Oval { length_mm: f64, width_mm: f64 },
    Rectangle { length_mm: f64, width_mm: f64 },
}

impl BaseShape {
    /// The common 32mm infantry base.
    pub const fn infantry() -> Self {
        BaseShape::Circle { diameter_mm: 32.0 }
    }

    /// Largest extent of the base in millimetres.
    pub fn longest_mm(&self) -> f64 {
        match *self {
            BaseShape::Circle { diameter_mm } => diameter_mm,
            BaseShape::Oval { length_mm, width_mm } | BaseShape::Rectangle { length_mm, width_mm } => {
                length_mm.max(width_mm)
            }
        }
    }
}

/// A base placed on the board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    pub shape: BaseShape,
    pub position: Point,
    pub rotation: f64,
}

impl Footprint {
    pub fn new(shape: BaseShape, position: Point, rotation: f64) -> Self {
        Footprint { shape, position, rotation }
    }
}

/// Spatial queries consumed by the rules.
///
/// Implementations must be deterministic; the rules call these from
/// validation, which has to give the same verdict every time it is asked.
pub trait GeometryService: Send + Sync {
    /// True if `point` lies inside the base placed at `position`.
    fn contains_point(&self, shape: &BaseShape, point: Point, position: Point, rotation: f64) -> bool;

    /// The point on the base's edge closest to `point`.
    fn closest_edge_point(&self, shape: &BaseShape, point: Point, position: Point, rotation: f64) -> Point;

    /// True if two placed bases overlap. Bases that merely touch do not.
    #[allow(clippy::too_many_arguments)]
    fn overlaps_with(
        &self,
        shape: &BaseShape,
        position: Point,
        rotation: f64,
        other: &BaseShape,
        other_position: Point,
        other_rotation: f64,
    ) -> bool;

    /// True if the segment touches the placed base.
    fn overlaps_with_segment(
        &self,
        shape: &BaseShape,
        position: Point,
        rotation: f64,
        seg_start: Point,
        seg_end: Point,
    ) -> bool;

    /// Edge-to-edge distance between two bases in board units, zero if they touch.
    fn edge_distance(&self, a: &Footprint, b: &Footprint) -> f64;

    /// Point-in-polygon test, inclusive of the boundary.
    fn point_in_polygon(&self, point: Point, polygon: &[Point]) -> bool;

    /// True if the segment touches or crosses the polygon.
    fn segment_crosses_polygon(&self, start: Point, end: Point, polygon: &[Point]) -> bool;

    /// True if the placed base overlaps the polygon.
    fn shape_overlaps_polygon(&self, footprint: &Footprint, polygon: &[Point]) -> bool;

    /// Edge distance from a base to a bare point, zero if the point is inside.
    fn distance_to_point(&self, footprint: &Footprint, point: Point) -> f64 {
        if self.contains_point(&footprint.shape, point, footprint.position, footprint.rotation) {
            return 0.0;
        }
        let edge = self.closest_edge_point(&footprint.shape, point, footprint.position, footprint.rotation);
        edge.distance(point)
    }
}

/// Flat 2D geometry backed by the `geo` crate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarGeometry {
    px_per_inch: f64,
}

impl PlanarGeometry {
    pub fn new(px_per_inch: f64) -> Self {
        PlanarGeometry { px_per_inch }
    }

    pub fn px_per_inch(&self) -> f64 {
        self.px_per_inch
    }

    fn mm_to_px(&self, mm: f64) -> f64 {
        mm * self.px_per_inch / MM_PER_INCH
    }

    /// Half extents of the base in board units along its local axes.
    fn half_extents(&self, shape: &BaseShape) -> (f64, f64) {
        match *shape {
            BaseShape::Circle { diameter_mm } => {
                let r = self.mm_to_px(diameter_mm) / 2.0;
                (r, r)
            }
            BaseShape::Oval { length_mm, width_mm } | BaseShape::Rectangle { length_mm, width_mm } => {
                (self.mm_to_px(length_mm) / 2.0, self.mm_to_px(width_mm) / 2.0)
            }
        }
    }

    fn to_local(point: Point, position: Point, rotation: f64) -> Point {
        let (sin, cos) = (-rotation).sin_cos();
        let dx = point.x - position.x;
        let dy = point.y - position.y;
        Point::new(dx * cos - dy * sin, dx * sin + dy * cos)
    }

    fn to_world(local: Point, position: Point, rotation: f64) -> Point {
        let (sin, cos) = rotation.sin_cos();
        Point::new(
            position.x + local.x * cos - local.y * sin,
            position.y + local.x * sin + local.y * cos,
        )
    }

    /// World-space polygon outline of a placed base.
    fn polygon(&self, footprint: &Footprint) -> Polygon<f64> {
        let (hx, hy) = self.half_extents(&footprint.shape);
        let local: Vec<Point> = match footprint.shape {
            BaseShape::Rectangle { .. } => vec![
                Point::new(-hx, -hy),
                Point::new(hx, -hy),
                Point::new(hx, hy),
                Point::new(-hx, hy),
            ],
            BaseShape::Circle { .. } | BaseShape::Oval { .. } => (0..ARC_SEGMENTS)
                .map(|i| {
                    let a = std::f64::consts::TAU * i as f64 / ARC_SEGMENTS as f64;
                    Point::new(hx * a.cos(), hy * a.sin())
                })
                .collect(),
        };
        let coords: Vec<Coord<f64>> = local
            .into_iter()
            .map(|p| Self::to_world(p, footprint.position, footprint.rotation).to_coord())
            .collect();
        Polygon::new(LineString::from(coords), vec![])
    }

    fn outline(polygon: &[Point]) -> Polygon<f64> {
        let coords: Vec<Coord<f64>> = polygon.iter().map(|p| p.to_coord()).collect();
        Polygon::new(LineString::from(coords), vec![])
    }

    fn radius(&self, shape: &BaseShape) -> Option<f64> {
        match shape {
            BaseShape::Circle { .. } => Some(self.half_extents(shape).0),
            _ => None,
        }
    }
}

/// Distance from `p` to the segment `a`-`b`.
fn point_segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance(Point::new(a.x + t * dx, a.y + t * dy))
}

/// Separating-axis test on two convex rings. Rings whose projections only
/// meet within 1e-6 on some edge normal share no interior.
fn convex_interiors_overlap(a: &Polygon<f64>, b: &Polygon<f64>) -> bool {
    let (ra, rb) = (a.exterior().0.as_slice(), b.exterior().0.as_slice());
    let project = |ring: &[Coord<f64>], nx: f64, ny: f64| {
        ring.iter()
            .map(|c| c.x * nx + c.y * ny)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
    };
    for ring in [ra, rb] {
        for edge in ring.windows(2) {
            let (nx, ny) = (edge[0].y - edge[1].y, edge[1].x - edge[0].x);
            let len = nx.hypot(ny);
            if len == 0.0 {
                continue;
            }
            let (lo_a, hi_a) = project(ra, nx / len, ny / len);
            let (lo_b, hi_b) = project(rb, nx / len, ny / len);
            if hi_a <= lo_b + 1e-6 || hi_b <= lo_a + 1e-6 {
                return false;
            }
        }
    }
    true
}

impl GeometryService for PlanarGeometry {
    fn contains_point(&self, shape: &BaseShape, point: Point, position: Point, rotation: f64) -> bool {
        let local = Self::to_local(point, position, rotation);
        let (hx, hy) = self.half_extents(shape);
        match shape {
            BaseShape::Circle { .. } => local.x.hypot(local.y) <= hx,
            BaseShape::Oval { .. } => (local.x / hx).powi(2) + (local.y / hy).powi(2) <= 1.0,
            BaseShape::Rectangle { .. } => local.x.abs() <= hx && local.y.abs() <= hy,
        }
    }

    fn closest_edge_point(&self, shape: &BaseShape, point: Point, position: Point, rotation: f64) -> Point {
        if let Some(r) = self.radius(shape) {
            let d = point.distance(position);
            if d == 0.0 {
                return position.offset(r, 0.0);
            }
            return Point::new(
                position.x + (point.x - position.x) * r / d,
                position.y + (point.y - position.y) * r / d,
            );
        }
        let polygon = self.polygon(&Footprint::new(*shape, position, rotation));
        match polygon.exterior().closest_point(&geo::Point::new(point.x, point.y)) {
            Closest::SinglePoint(p) | Closest::Intersection(p) => Point::new(p.x(), p.y()),
            Closest::Indeterminate => position,
        }
    }

    fn overlaps_with(
        &self,
        shape: &BaseShape,
        position: Point,
        rotation: f64,
        other: &BaseShape,
        other_position: Point,
        other_rotation: f64,
    ) -> bool {
        let a = Footprint::new(*shape, position, rotation);
        let b = Footprint::new(*other, other_position, other_rotation);
        if let (Some(ra), Some(rb)) = (self.radius(shape), self.radius(other)) {
            return position.distance(other_position) < ra + rb - 1e-6;
        }
        convex_interiors_overlap(&self.polygon(&a), &self.polygon(&b))
    }

    fn overlaps_with_segment(
        &self,
        shape: &BaseShape,
        position: Point,
        rotation: f64,
        seg_start: Point,
        seg_end: Point,
    ) -> bool {
        if let Some(r) = self.radius(shape) {
            return point_segment_distance(position, seg_start, seg_end) <= r;
        }
        let line = Line::new(seg_start.to_coord(), seg_end.to_coord());
        self.polygon(&Footprint::new(*shape, position, rotation)).intersects(&line)
    }

    fn edge_distance(&self, a: &Footprint, b: &Footprint) -> f64 {
        if let (Some(ra), Some(rb)) = (self.radius(&a.shape), self.radius(&b.shape)) {
            return (a.position.distance(b.position) - ra - rb).max(0.0);
        }
        let pa = self.polygon(a);
        let pb = self.polygon(b);
        if pa.intersects(&pb) {
            return 0.0;
        }
        pa.euclidean_distance(&pb)
    }

    fn point_in_polygon(&self, point: Point, polygon: &[Point]) -> bool {
        if polygon.len() < 3 {
            return false;
        }
        Self::outline(polygon).intersects(&geo::Point::new(point.x, point.y))
    }

    fn segment_crosses_polygon(&self, start: Point, end: Point, polygon: &[Point]) -> bool {
        if polygon.len() < 3 {
            return false;
        }
        let line = Line::new(start.to_coord(), end.to_coord());
        Self::outline(polygon).intersects(&line)
    }

    fn shape_overlaps_polygon(&self, footprint: &Footprint, polygon: &[Point]) -> bool {
        if polygon.len() < 3 {
            return false;
        }
        self.polygon(footprint).intersects(&Self::outline(polygon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn geometry() -> PlanarGeometry {
        PlanarGeometry::new(40.0)
    }

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Point> {
        vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ]
    }

    #[test]
    fn circle_contains_centre_and_excludes_far_point() {
        let g = geometry();
        let shape = BaseShape::infantry();
        let pos = Point::new(100.0, 100.0);
        assert!(g.contains_point(&shape, pos, pos, 0.0));
        assert!(!g.contains_point(&shape, Point::new(140.0, 100.0), pos, 0.0));
    }

    #[test]
    fn rectangle_respects_rotation() {
        let g = geometry();
        // 100mm x 25.4mm -> roughly 157px x 40px.
        let shape = BaseShape::Rectangle { length_mm: 101.6, width_mm: 25.4 };
        let pos = Point::new(0.0, 0.0);
        assert!(g.contains_point(&shape, Point::new(70.0, 0.0), pos, 0.0));
        assert!(!g.contains_point(&shape, Point::new(0.0, 70.0), pos, 0.0));
        let quarter = std::f64::consts::FRAC_PI_2;
        assert!(g.contains_point(&shape, Point::new(0.0, 70.0), pos, quarter));
    }

    #[test]
    fn oval_contains_along_major_axis() {
        let g = geometry();
        let shape = BaseShape::Oval { length_mm: 90.0, width_mm: 52.0 };
        let pos = Point::new(0.0, 0.0);
        assert!(g.contains_point(&shape, Point::new(65.0, 0.0), pos, 0.0));
        assert!(!g.contains_point(&shape, Point::new(0.0, 65.0), pos, 0.0));
    }

    #[test]
    fn circle_closest_edge_point_is_on_radius() {
        let g = geometry();
        let shape = BaseShape::Circle { diameter_mm: 25.4 };
        let p = g.closest_edge_point(&shape, Point::new(100.0, 0.0), Point::new(0.0, 0.0), 0.0);
        assert!((p.x - 20.0).abs() < EPS);
        assert!(p.y.abs() < EPS);
    }

    #[test]
    fn rectangle_closest_edge_point() {
        let g = geometry();
        let shape = BaseShape::Rectangle { length_mm: 50.8, width_mm: 50.8 };
        let p = g.closest_edge_point(&shape, Point::new(100.0, 10.0), Point::new(0.0, 0.0), 0.0);
        assert!((p.x - 40.0).abs() < 1e-3);
        assert!((p.y - 10.0).abs() < 1e-3);
    }

    #[test]
    fn circles_touching_do_not_overlap() {
        let g = geometry();
        let shape = BaseShape::Circle { diameter_mm: 25.4 };
        let a = Point::new(0.0, 0.0);
        assert!(!g.overlaps_with(&shape, a, 0.0, &shape, Point::new(40.0, 0.0), 0.0));
        assert!(g.overlaps_with(&shape, a, 0.0, &shape, Point::new(39.0, 0.0), 0.0));
    }

    #[test]
    fn rectangle_overlaps_circle() {
        let g = geometry();
        let rect = BaseShape::Rectangle { length_mm: 50.8, width_mm: 50.8 };
        let circle = BaseShape::Circle { diameter_mm: 25.4 };
        assert!(g.overlaps_with(&rect, Point::new(0.0, 0.0), 0.0, &circle, Point::new(50.0, 0.0), 0.0));
        assert!(!g.overlaps_with(&rect, Point::new(0.0, 0.0), 0.0, &circle, Point::new(80.0, 0.0), 0.0));
    }

    #[test]
    fn rectangles_touching_do_not_overlap() {
        let g = geometry();
        let rect = BaseShape::Rectangle { length_mm: 50.8, width_mm: 50.8 };
        let origin = Point::new(0.0, 0.0);
        // Side by side, sharing the edge x = 40.
        assert!(!g.overlaps_with(&rect, origin, 0.0, &rect, Point::new(80.0, 0.0), 0.0));
        // Corner to corner.
        assert!(!g.overlaps_with(&rect, origin, 0.0, &rect, Point::new(80.0, 80.0), 0.0));
        assert!(g.overlaps_with(&rect, origin, 0.0, &rect, Point::new(79.0, 0.0), 0.0));
        assert!(g.overlaps_with(&rect, origin, 0.0, &rect, origin, 0.0));
    }

    #[test]
    fn segment_overlap() {
        let g = geometry();
        let shape = BaseShape::infantry();
        let pos = Point::new(0.0, 0.0);
        assert!(g.overlaps_with_segment(&shape, pos, 0.0, Point::new(-50.0, 5.0), Point::new(50.0, 5.0)));
        assert!(!g.overlaps_with_segment(&shape, pos, 0.0, Point::new(-50.0, 50.0), Point::new(50.0, 50.0)));
    }

    #[test]
    fn edge_distance_between_circles() {
        let g = geometry();
        // 1" bases, centres 3" apart -> 2" gap.
        let shape = BaseShape::Circle { diameter_mm: 25.4 };
        let a = Footprint::new(shape, Point::new(0.0, 0.0), 0.0);
        let b = Footprint::new(shape, Point::new(120.0, 0.0), 0.0);
        assert!((g.edge_distance(&a, &b) - 80.0).abs() < EPS);
    }

    #[test]
    fn edge_distance_mixed_shapes() {
        let g = geometry();
        let rect = BaseShape::Rectangle { length_mm: 50.8, width_mm: 50.8 };
        let circle = BaseShape::Circle { diameter_mm: 25.4 };
        let a = Footprint::new(rect, Point::new(0.0, 0.0), 0.0);
        let b = Footprint::new(circle, Point::new(100.0, 0.0), 0.0);
        // rect edge at 40, circle edge at 80.
        assert!((g.edge_distance(&a, &b) - 40.0).abs() < 0.5);
    }

    #[test]
    fn polygon_queries() {
        let g = geometry();
        let zone = square(0.0, 0.0, 100.0, 100.0);
        assert!(g.point_in_polygon(Point::new(50.0, 50.0), &zone));
        assert!(g.point_in_polygon(Point::new(100.0, 50.0), &zone));
        assert!(!g.point_in_polygon(Point::new(150.0, 50.0), &zone));
        assert!(g.segment_crosses_polygon(Point::new(-10.0, 50.0), Point::new(200.0, 50.0), &zone));
        assert!(!g.segment_crosses_polygon(Point::new(-10.0, 150.0), Point::new(200.0, 150.0), &zone));
    }

    #[test]
    fn degenerate_polygon_never_matches() {
        let g = geometry();
        let line = vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        assert!(!g.point_in_polygon(Point::new(5.0, 0.0), &line));
    }

    #[test]
    fn base_overlapping_polygon() {
        let g = geometry();
        let ruin = square(100.0, 100.0, 200.0, 200.0);
        let inside = Footprint::new(BaseShape::infantry(), Point::new(150.0, 150.0), 0.0);
        let clipping = Footprint::new(BaseShape::infantry(), Point::new(90.0, 150.0), 0.0);
        let clear = Footprint::new(BaseShape::infantry(), Point::new(40.0, 150.0), 0.0);
        assert!(g.shape_overlaps_polygon(&inside, &ruin));
        assert!(g.shape_overlaps_polygon(&clipping, &ruin));
        assert!(!g.shape_overlaps_polygon(&clear, &ruin));
    }

    #[test]
    fn distance_to_point_is_zero_inside() {
        let g = geometry();
        let fp = Footprint::new(BaseShape::infantry(), Point::new(0.0, 0.0), 0.0);
        assert_eq!(g.distance_to_point(&fp, Point::new(1.0, 1.0)), 0.0);
        assert!(g.distance_to_point(&fp, Point::new(100.0, 0.0)) > 70.0);
    }

    #[test]
    fn towards_stops_on_target() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 0.0);
        assert_eq!(a.towards(b, 4.0), Point::new(4.0, 0.0));
        assert_eq!(a.towards(b, 40.0), b);
    }
}
