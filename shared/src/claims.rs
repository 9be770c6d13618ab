use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::colors::Rgb;

/// Side length of one claimable cell in world units.
pub const CELL_SIZE: i32 = 16;

pub type CellSet = HashSet<ChunkCoord>;

/// Integer grid cell inside one world. Serialized as `[x, z]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct ChunkCoord {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoord {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub const fn offset(self, dx: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            z: self.z + dz,
        }
    }

    /// North, east, south, west.
    pub const fn neighbors(self) -> [ChunkCoord; 4] {
        [
            self.offset(0, -1),
            self.offset(1, 0),
            self.offset(0, 1),
            self.offset(-1, 0),
        ]
    }

    pub const fn diagonals(self) -> [ChunkCoord; 4] {
        [
            self.offset(1, -1),
            self.offset(1, 1),
            self.offset(-1, 1),
            self.offset(-1, -1),
        ]
    }

    /// Row-major scan order: top row first, then left to right.
    pub const fn scan_key(self) -> (i32, i32) {
        (self.z, self.x)
    }
}

impl From<[i32; 2]> for ChunkCoord {
    fn from([x, z]: [i32; 2]) -> Self {
        Self { x, z }
    }
}

impl From<ChunkCoord> for [i32; 2] {
    fn from(coord: ChunkCoord) -> Self {
        [coord.x, coord.z]
    }
}

/// Custom colors a faction picked for itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactionColors {
    pub primary: Rgb,
    pub secondary: Rgb,
}

/// One faction's claims in one world. Label and description arrive already
/// resolved and are passed through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FactionClaims {
    pub name: String,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colors: Option<FactionColors>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cells: CellSet,
}

impl FactionClaims {
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warp {
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub home: bool,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldClaims {
    /// Faction id -> claims.
    #[serde(default)]
    pub factions: HashMap<String, FactionClaims>,
    #[serde(default)]
    pub warps: Vec<Warp>,
}

/// Read-only view of every world's claims at one point in time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClaimSnapshot {
    #[serde(default)]
    pub worlds: HashMap<String, WorldClaims>,
}

impl ClaimSnapshot {
    pub fn is_empty(&self) -> bool {
        self.worlds
            .values()
            .all(|world| world.factions.values().all(|f| f.cells.is_empty()) && world.warps.is_empty())
    }

    pub fn faction_count(&self) -> usize {
        self.worlds.values().map(|world| world.factions.len()).sum()
    }

    pub fn claimed_cell_count(&self) -> usize {
        self.worlds
            .values()
            .flat_map(|world| world.factions.values())
            .map(|faction| faction.cells.len())
            .sum()
    }
}
