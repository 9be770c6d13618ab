use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::claims::{CellSet, ChunkCoord};

/// Chunk-corner point. Corner `(x, z)` is the top-left corner of cell `(x, z)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Corner {
    pub x: i32,
    pub z: i32,
}

impl Corner {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// Closed ring of corners; the first corner is not repeated at the end.
pub type CornerRing = Vec<Corner>;

/// Side of a cell. Each edge is walked clockwise around the cell that owns it
/// (x to the right, z downward), so the owning cell is always on the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    North,
    East,
    South,
    West,
}

impl Edge {
    const fn start(self, cell: ChunkCoord) -> Corner {
        match self {
            Edge::North => Corner::new(cell.x, cell.z),
            Edge::East => Corner::new(cell.x + 1, cell.z),
            Edge::South => Corner::new(cell.x + 1, cell.z + 1),
            Edge::West => Corner::new(cell.x, cell.z + 1),
        }
    }

    /// The cell on the other side of this edge.
    const fn outside(self, cell: ChunkCoord) -> ChunkCoord {
        match self {
            Edge::North => cell.offset(0, -1),
            Edge::East => cell.offset(1, 0),
            Edge::South => cell.offset(0, 1),
            Edge::West => cell.offset(-1, 0),
        }
    }
}

/// Step to the boundary edge that follows `edge` of `cell`.
///
/// At the end corner of the current edge there are two cells ahead: one on
/// the left (across the boundary) and one on the right. They only disagree
/// about where to go when the ahead-left cell is filled and the ahead-right
/// cell is not, i.e. two filled cells touch at this corner and nothing else.
/// With `join_diagonals` the walk turns left and keeps both filled cells in one
/// outline; without it the walk turns right and follows the unfilled side
/// through the corner instead.
fn next_edge<F>(
    is_filled: &F,
    join_diagonals: bool,
    cell: ChunkCoord,
    edge: Edge,
) -> (ChunkCoord, Edge)
where
    F: Fn(ChunkCoord) -> bool,
{
    let (ahead_left, ahead_right, turn_left, straight, turn_right) = match edge {
        Edge::North => (cell.offset(1, -1), cell.offset(1, 0), Edge::West, Edge::North, Edge::East),
        Edge::East => (cell.offset(1, 1), cell.offset(0, 1), Edge::North, Edge::East, Edge::South),
        Edge::South => (cell.offset(-1, 1), cell.offset(-1, 0), Edge::East, Edge::South, Edge::West),
        Edge::West => (cell.offset(-1, -1), cell.offset(0, -1), Edge::South, Edge::West, Edge::North),
    };

    match (is_filled(ahead_left), is_filled(ahead_right)) {
        (true, true) => (ahead_left, turn_left),
        (true, false) if join_diagonals => (ahead_left, turn_left),
        (false, true) => (ahead_right, straight),
        _ => (cell, turn_right),
    }
}

/// Walk the boundary of a filled set clockwise, starting on the north edge of
/// `anchor`, which must be the set's topmost-then-leftmost cell.
///
/// Only corners where the walk changes direction are emitted, so a corner the
/// walk passes through twice appears twice. `visit` sees every unit edge
/// walked. Returns an empty ring if the walk does not close within
/// `max_edges` steps.
fn trace_ring<F, V>(
    is_filled: F,
    join_diagonals: bool,
    anchor: ChunkCoord,
    max_edges: usize,
    mut visit: V,
) -> CornerRing
where
    F: Fn(ChunkCoord) -> bool,
    V: FnMut(ChunkCoord, Edge),
{
    let mut ring = Vec::new();
    let mut cell = anchor;
    let mut edge = Edge::North;
    // The anchor's west edge always precedes its north edge.
    let mut previous = Edge::West;

    for _ in 0..max_edges {
        visit(cell, edge);
        if edge != previous {
            ring.push(edge.start(cell));
        }
        previous = edge;

        let (next_cell, following) = next_edge(&is_filled, join_diagonals, cell, edge);
        if next_cell == anchor && following == Edge::North {
            return ring;
        }
        cell = next_cell;
        edge = following;
    }

    Vec::new()
}

fn scan_anchor<'a>(cells: impl IntoIterator<Item = &'a ChunkCoord>) -> Option<ChunkCoord> {
    cells.into_iter().copied().min_by_key(|cell| cell.scan_key())
}

/// Boundary rings of one 4-connected region, in chunk-corner coordinates.
///
/// Index 0 is the outer ring (clockwise); the rest are hole rings
/// (counter-clockwise), one per enclosed unclaimed component. With
/// `merge_diagonal_holes`, components that only share a corner become a single
/// ring that passes through the shared corner twice. Unclaimed cells that
/// reach the outside, even only through a corner, belong to the outer ring,
/// which then passes through that corner twice as well. Returns an empty list
/// when the region is empty.
pub fn extract_rings(cells: &CellSet, merge_diagonal_holes: bool) -> Vec<CornerRing> {
    let Some(anchor) = scan_anchor(cells) else {
        return Vec::new();
    };

    let mut exterior = CellSet::new();
    let outer = trace_ring(
        |cell| cells.contains(&cell),
        false,
        anchor,
        cells.len() * 4 + 4,
        |cell, edge| {
            exterior.insert(edge.outside(cell));
        },
    );
    if outer.len() < 4 {
        return Vec::new();
    }

    let mut rings = vec![outer];
    for hole in find_holes(cells, &exterior, merge_diagonal_holes) {
        let Some(hole_anchor) = scan_anchor(&hole) else {
            continue;
        };
        let mut ring = trace_ring(
            |cell| hole.contains(&cell),
            true,
            hole_anchor,
            hole.len() * 4 + 4,
            |_, _| {},
        );
        if ring.len() < 4 {
            continue;
        }
        // Traced clockwise around the hole; flip so the claimed side stays on the right.
        ring[1..].reverse();
        rings.push(ring);
    }

    rings
}

/// Unclaimed components enclosed by the region, sorted by anchor cell.
///
/// `exterior` holds every unclaimed cell across an outer-ring edge. Any other
/// unclaimed neighbour of the region is enclosed, and flooding from it through
/// unclaimed cells never reaches the outside. A component touching an
/// exterior cell, along an edge or at a corner, is not a hole.
fn find_holes(cells: &CellSet, exterior: &CellSet, merge_diagonal: bool) -> Vec<CellSet> {
    let mut seen = CellSet::new();
    let mut components: Vec<Vec<ChunkCoord>> = Vec::new();
    let mut stack = Vec::new();

    for cell in cells {
        for seed in cell.neighbors() {
            if cells.contains(&seed) || exterior.contains(&seed) || !seen.insert(seed) {
                continue;
            }

            let mut component = Vec::new();
            let mut leaked = false;
            stack.push(seed);
            while let Some(current) = stack.pop() {
                component.push(current);
                if current.diagonals().into_iter().any(|d| exterior.contains(&d)) {
                    leaked = true;
                }
                for next in current.neighbors() {
                    if cells.contains(&next) {
                        continue;
                    }
                    if exterior.contains(&next) {
                        leaked = true;
                        continue;
                    }
                    if seen.insert(next) {
                        stack.push(next);
                    }
                }
            }

            if !leaked {
                components.push(component);
            }
        }
    }

    let mut holes: Vec<CellSet> = if merge_diagonal && components.len() > 1 {
        merge_diagonal_components(components)
    } else {
        components
            .into_iter()
            .map(|component| component.into_iter().collect())
            .collect()
    };

    holes.sort_by_key(|hole| scan_anchor(hole).map(ChunkCoord::scan_key));
    holes
}

/// Union components that touch at a corner.
fn merge_diagonal_components(components: Vec<Vec<ChunkCoord>>) -> Vec<CellSet> {
    fn root(parent: &mut [usize], mut idx: usize) -> usize {
        while parent[idx] != idx {
            parent[idx] = parent[parent[idx]];
            idx = parent[idx];
        }
        idx
    }

    let mut owner: HashMap<ChunkCoord, usize> = HashMap::new();
    for (idx, component) in components.iter().enumerate() {
        for &cell in component {
            owner.insert(cell, idx);
        }
    }

    let mut parent: Vec<usize> = (0..components.len()).collect();
    for (idx, component) in components.iter().enumerate() {
        for cell in component {
            for diagonal in cell.diagonals() {
                if let Some(&other) = owner.get(&diagonal) {
                    let a = root(&mut parent, idx);
                    let b = root(&mut parent, other);
                    if a != b {
                        parent[a.max(b)] = a.min(b);
                    }
                }
            }
        }
    }

    let mut grouped: HashMap<usize, CellSet> = HashMap::new();
    for (idx, component) in components.into_iter().enumerate() {
        let group = root(&mut parent, idx);
        grouped.entry(group).or_default().extend(component);
    }
    grouped.into_values().collect()
}
