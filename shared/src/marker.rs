use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::claims::{FactionClaims, Warp};
use crate::geometry::Polygon;
use crate::style::TerritoryStyle;

/// World -> marker id -> marker.
pub type TerritoryLayer = HashMap<String, HashMap<String, TerritoryMarker>>;

/// One region of one faction, ready for a renderer adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerritoryMarker {
    pub id: String,
    pub faction_id: String,
    pub label: String,
    pub description: String,
    #[serde(flatten)]
    pub polygon: Polygon,
    pub style: TerritoryStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarpMarker {
    pub label: String,
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldWarps {
    pub home: Vec<WarpMarker>,
    pub other: Vec<WarpMarker>,
}

/// Everything one pipeline run produces for one renderer backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerBatch {
    pub generated_at: DateTime<Utc>,
    pub territories: TerritoryLayer,
    pub warps: HashMap<String, WorldWarps>,
}

impl MarkerBatch {
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            territories: HashMap::new(),
            warps: HashMap::new(),
        }
    }

    pub fn territory_count(&self) -> usize {
        self.territories.values().map(HashMap::len).sum()
    }

    pub fn warp_count(&self) -> usize {
        self.warps
            .values()
            .map(|warps| warps.home.len() + warps.other.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.territory_count() == 0 && self.warp_count() == 0
    }
}

/// `{world}__{faction_id}__{region_index}`
pub fn marker_id(world: &str, faction_id: &str, region_index: usize) -> String {
    format!("{world}__{faction_id}__{region_index}")
}

pub fn assemble_territory(
    world: &str,
    faction_id: &str,
    region_index: usize,
    faction: &FactionClaims,
    polygon: Polygon,
    style: TerritoryStyle,
) -> TerritoryMarker {
    TerritoryMarker {
        id: marker_id(world, faction_id, region_index),
        faction_id: faction_id.to_string(),
        label: faction.display_label().to_string(),
        description: faction.description.clone(),
        polygon,
        style,
    }
}

/// Split a world's warps into home and other groups. Icon keys are dropped
/// for renderers that cannot show icons.
pub fn assemble_warps(world: &str, warps: &[Warp], supports_icons: bool) -> WorldWarps {
    let mut grouped = WorldWarps::default();
    for warp in warps {
        let marker = WarpMarker {
            label: warp.label.clone(),
            world: world.to_string(),
            x: warp.x,
            y: warp.y,
            z: warp.z,
            icon: warp.icon.clone().filter(|_| supports_icons),
            description: warp.description.clone(),
        };
        if warp.home {
            grouped.home.push(marker);
        } else {
            grouped.other.push(marker);
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::{assemble_territory, assemble_warps, marker_id};
    use crate::claims::{FactionClaims, Warp};
    use crate::geometry::{Point, Polygon};
    use crate::style::TerritoryStyle;

    fn warp(label: &str, home: bool) -> Warp {
        Warp {
            label: label.to_string(),
            x: 1.0,
            y: 64.0,
            z: -2.0,
            home,
            icon: Some("tower".to_string()),
            description: format!("{label} description"),
        }
    }

    #[test]
    fn marker_ids_carry_region_suffix() {
        assert_eq!(marker_id("overworld", "f1", 0), "overworld__f1__0");
        assert_eq!(marker_id("nether", "f1", 12), "nether__f1__12");
    }

    #[test]
    fn territory_uses_label_fallback_and_passes_text_through() {
        let faction = FactionClaims {
            name: "Wardens".to_string(),
            description: "<b>Wardens</b> since 2019".to_string(),
            ..FactionClaims::default()
        };
        let polygon = Polygon {
            outer: vec![
                Point::new(0.0, 0.0),
                Point::new(16.0, 0.0),
                Point::new(16.0, 16.0),
            ],
            holes: Vec::new(),
        };

        let marker = assemble_territory(
            "overworld",
            "f1",
            3,
            &faction,
            polygon.clone(),
            TerritoryStyle::default(),
        );
        assert_eq!(marker.id, "overworld__f1__3");
        assert_eq!(marker.label, "Wardens");
        assert_eq!(marker.description, "<b>Wardens</b> since 2019");
        assert_eq!(marker.polygon, polygon);

        let labelled = FactionClaims {
            label: Some("The Wardens".to_string()),
            ..faction
        };
        let marker = assemble_territory(
            "overworld",
            "f1",
            0,
            &labelled,
            polygon,
            TerritoryStyle::default(),
        );
        assert_eq!(marker.label, "The Wardens");
    }

    #[test]
    fn warps_split_into_home_and_other() {
        let warps = [warp("Keep", true), warp("Mine", false), warp("Port", false)];
        let grouped = assemble_warps("overworld", &warps, true);
        assert_eq!(grouped.home.len(), 1);
        assert_eq!(grouped.home[0].label, "Keep");
        assert_eq!(grouped.home[0].world, "overworld");
        assert_eq!(grouped.home[0].icon.as_deref(), Some("tower"));
        assert_eq!(
            grouped
                .other
                .iter()
                .map(|w| w.label.as_str())
                .collect::<Vec<_>>(),
            vec!["Mine", "Port"]
        );
    }

    #[test]
    fn icons_dropped_when_unsupported() {
        let grouped = assemble_warps("overworld", &[warp("Keep", true)], false);
        assert!(grouped.home[0].icon.is_none());
        assert_eq!(grouped.home[0].description, "Keep description");
    }
}
