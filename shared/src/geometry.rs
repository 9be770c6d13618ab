use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::boundary::CornerRing;
use crate::claims::CELL_SIZE;

pub const DEFAULT_OUTER_SCALE: f64 = 0.999;
pub const DEFAULT_HOLE_SCALE: f64 = 1.001;
pub const DEFAULT_NUDGE_EPSILON: f64 = 0.1;
pub const DEFAULT_NUDGE_FRACTION: f64 = 0.01;

/// World-space point on the horizontal plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub z: f64,
}

impl Point {
    pub const fn new(x: f64, z: f64) -> Self {
        Self { x, z }
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.z - other.z)
    }

    /// `self + (target - self) * t`
    pub fn lerp(self, target: Point, t: f64) -> Point {
        Point::new(
            self.x + (target.x - self.x) * t,
            self.z + (target.z - self.z) * t,
        )
    }
}

pub type Ring = Vec<Point>;

/// One region's outline in world units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub outer: Ring,
    #[serde(default)]
    pub holes: Vec<Ring>,
}

/// Anti-artifact tuning for rendered outlines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Outer rings shrink toward their centroid by this factor.
    pub outer_scale: f64,
    /// Hole rings grow away from their centroid by this factor.
    pub hole_scale: f64,
    /// Hole vertices closer than this to another ring's vertex get nudged.
    pub nudge_epsilon: f64,
    /// Share of the vertex-to-centroid distance a nudged vertex moves.
    pub nudge_fraction: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            outer_scale: DEFAULT_OUTER_SCALE,
            hole_scale: DEFAULT_HOLE_SCALE,
            nudge_epsilon: DEFAULT_NUDGE_EPSILON,
            nudge_fraction: DEFAULT_NUDGE_FRACTION,
        }
    }
}

impl GeometryConfig {
    /// Scaling and nudging both disabled.
    pub const fn identity() -> Self {
        Self {
            outer_scale: 1.0,
            hole_scale: 1.0,
            nudge_epsilon: 0.0,
            nudge_fraction: 0.0,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.outer_scale > 0.0 && self.outer_scale <= 1.0) {
            return Err(format!(
                "outer_scale must be in (0, 1], got {}",
                self.outer_scale
            ));
        }
        if !(self.hole_scale >= 1.0 && self.hole_scale.is_finite()) {
            return Err(format!("hole_scale must be >= 1, got {}", self.hole_scale));
        }
        if !(self.nudge_epsilon >= 0.0 && self.nudge_epsilon.is_finite()) {
            return Err(format!(
                "nudge_epsilon must be >= 0, got {}",
                self.nudge_epsilon
            ));
        }
        if !(0.0..1.0).contains(&self.nudge_fraction) {
            return Err(format!(
                "nudge_fraction must be in [0, 1), got {}",
                self.nudge_fraction
            ));
        }
        Ok(())
    }
}

pub fn to_world(ring: &CornerRing) -> Ring {
    let size = f64::from(CELL_SIZE);
    ring.iter()
        .map(|corner| Point::new(f64::from(corner.x) * size, f64::from(corner.z) * size))
        .collect()
}

/// Arithmetic mean of the ring's vertices.
pub fn centroid(ring: &[Point]) -> Option<Point> {
    if ring.is_empty() {
        return None;
    }
    let n = ring.len() as f64;
    let (sx, sz) = ring
        .iter()
        .fold((0.0, 0.0), |(sx, sz), p| (sx + p.x, sz + p.z));
    Some(Point::new(sx / n, sz / n))
}

/// Scale a ring about its own centroid: `p' = c + (p - c) * scale`.
/// Rings with fewer than 3 vertices are left alone.
pub fn scale_ring(ring: &mut [Point], scale: f64) {
    if ring.len() < 3 || scale == 1.0 {
        return;
    }
    let Some(c) = centroid(ring) else {
        return;
    };
    for p in ring.iter_mut() {
        *p = Point::new(c.x + (p.x - c.x) * scale, c.z + (p.z - c.z) * scale);
    }
}

/// Pull hole vertices that sit within `epsilon` of a vertex on any other ring
/// of the polygon a `fraction` of the way toward their own ring's centroid.
///
/// Proximity is judged on the positions before any vertex moves, so the result
/// does not depend on ring order. Outer-ring vertices never move.
pub fn nudge_hole_vertices(polygon: &mut Polygon, epsilon: f64, fraction: f64) {
    if polygon.holes.is_empty() || epsilon <= 0.0 || fraction <= 0.0 {
        return;
    }

    // Ring 0 is the outer ring, ring i + 1 is hole i.
    let index = VertexGrid::build(
        std::iter::once(&polygon.outer).chain(polygon.holes.iter()),
        epsilon,
    );

    let mut moves: Vec<(usize, usize, Point)> = Vec::new();
    for (hole_idx, hole) in polygon.holes.iter().enumerate() {
        if hole.len() < 3 {
            continue;
        }
        let Some(c) = centroid(hole) else {
            continue;
        };
        for (vertex_idx, &p) in hole.iter().enumerate() {
            if index.has_foreign_neighbor(p, hole_idx + 1, epsilon) {
                moves.push((hole_idx, vertex_idx, p.lerp(c, fraction)));
            }
        }
    }

    for (hole_idx, vertex_idx, moved) in moves {
        polygon.holes[hole_idx][vertex_idx] = moved;
    }
}

/// Uniform hash grid over vertices with cell size equal to the search radius,
/// so a radius query only inspects the 3x3 block around the query point.
struct VertexGrid {
    cells: HashMap<(i64, i64), Vec<(usize, Point)>>,
    cell_size: f64,
}

impl VertexGrid {
    fn build<'a>(rings: impl Iterator<Item = &'a Ring>, cell_size: f64) -> Self {
        let mut cells: HashMap<(i64, i64), Vec<(usize, Point)>> = HashMap::new();
        for (ring_idx, ring) in rings.enumerate() {
            for &p in ring {
                cells
                    .entry(Self::key(p, cell_size))
                    .or_default()
                    .push((ring_idx, p));
            }
        }
        Self { cells, cell_size }
    }

    fn key(p: Point, cell_size: f64) -> (i64, i64) {
        (
            (p.x / cell_size).floor() as i64,
            (p.z / cell_size).floor() as i64,
        )
    }

    fn has_foreign_neighbor(&self, p: Point, own_ring: usize, radius: f64) -> bool {
        let (kx, kz) = Self::key(p, self.cell_size);
        (kx - 1..=kx + 1)
            .flat_map(|x| (kz - 1..=kz + 1).map(move |z| (x, z)))
            .filter_map(|key| self.cells.get(&key))
            .flatten()
            .any(|&(ring_idx, q)| ring_idx != own_ring && p.distance(q) < radius)
    }
}

/// Convert extracted rings to a world-space polygon and apply the
/// anti-artifact adjustments. Index 0 of `rings` is the outer ring.
pub fn post_process(rings: &[CornerRing], config: &GeometryConfig) -> Option<Polygon> {
    let (outer, holes) = rings.split_first()?;

    let mut outer = to_world(outer);
    scale_ring(&mut outer, config.outer_scale);

    let holes = holes
        .iter()
        .map(|hole| {
            let mut ring = to_world(hole);
            scale_ring(&mut ring, config.hole_scale);
            ring
        })
        .collect();

    let mut polygon = Polygon { outer, holes };
    nudge_hole_vertices(&mut polygon, config.nudge_epsilon, config.nudge_fraction);
    Some(polygon)
}
