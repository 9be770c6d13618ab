use crate::claims::{CellSet, ChunkCoord};

/// Maximal 4-connected group of claimed cells. Recomputed every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    cells: CellSet,
    anchor: ChunkCoord,
}

impl Region {
    pub fn cells(&self) -> &CellSet {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Topmost, then leftmost cell.
    pub fn anchor(&self) -> ChunkCoord {
        self.anchor
    }
}

/// Partition a claim set into its 4-connected regions.
///
/// Uses an explicit stack so large territories cannot overflow the call stack.
/// Regions come back sorted by anchor cell, which keeps region indices stable
/// for an unchanged claim set.
pub fn segment_regions(claims: &CellSet) -> Vec<Region> {
    let mut visited = CellSet::with_capacity(claims.len());
    let mut regions = Vec::new();
    let mut stack = Vec::new();

    for &seed in claims {
        if !visited.insert(seed) {
            continue;
        }

        let mut cells = CellSet::new();
        let mut anchor = seed;
        stack.push(seed);

        while let Some(cell) = stack.pop() {
            if cell.scan_key() < anchor.scan_key() {
                anchor = cell;
            }
            cells.insert(cell);
            for next in cell.neighbors() {
                if claims.contains(&next) && visited.insert(next) {
                    stack.push(next);
                }
            }
        }

        regions.push(Region { cells, anchor });
    }

    regions.sort_by_key(|region| region.anchor.scan_key());
    regions
}
