use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::boundary::extract_rings;
use crate::claims::{ClaimSnapshot, FactionClaims};
use crate::geometry::{GeometryConfig, post_process};
use crate::marker::{MarkerBatch, TerritoryMarker, assemble_territory, assemble_warps};
use crate::region::segment_regions;
use crate::style::{StyleConfig, StyleResolver};

/// What a renderer backend can draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RendererCapabilities {
    pub supports_holes: bool,
    pub supports_icons: bool,
    /// Corner-sharing holes become one ring, for triangulators that choke on
    /// hole rings meeting at a single vertex.
    pub merge_diagonal_holes: bool,
}

/// Settings every pipeline run reads. Passed in explicitly per run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub geometry: GeometryConfig,
    pub style: StyleConfig,
}

/// All region markers for one faction in one world, in region order.
pub fn faction_markers(
    world: &str,
    faction_id: &str,
    faction: &FactionClaims,
    config: &PipelineConfig,
    capabilities: RendererCapabilities,
    styles: &StyleResolver<'_>,
) -> Vec<TerritoryMarker> {
    let regions = segment_regions(&faction.cells);
    if regions.is_empty() {
        return Vec::new();
    }

    let style = styles.resolve(faction_id, faction);
    let mut markers = Vec::with_capacity(regions.len());
    for (region_index, region) in regions.iter().enumerate() {
        let mut rings = extract_rings(region.cells(), capabilities.merge_diagonal_holes);
        if !capabilities.supports_holes {
            rings.truncate(1);
        }
        let Some(polygon) = post_process(&rings, &config.geometry) else {
            continue;
        };
        markers.push(assemble_territory(
            world,
            faction_id,
            region_index,
            faction,
            polygon,
            style.clone(),
        ));
    }
    markers
}

/// Run the whole geometry pipeline over a claim snapshot for one backend.
pub fn build_batch(
    snapshot: &ClaimSnapshot,
    config: &PipelineConfig,
    capabilities: RendererCapabilities,
    generated_at: DateTime<Utc>,
) -> MarkerBatch {
    let styles = StyleResolver::new(&config.style);
    let mut batch = MarkerBatch::new(generated_at);

    for (world, claims) in &snapshot.worlds {
        let layer = batch.territories.entry(world.clone()).or_default();
        for (faction_id, faction) in &claims.factions {
            for marker in faction_markers(world, faction_id, faction, config, capabilities, &styles) {
                layer.insert(marker.id.clone(), marker);
            }
        }

        if !claims.warps.is_empty() {
            batch.warps.insert(
                world.clone(),
                assemble_warps(world, &claims.warps, capabilities.supports_icons),
            );
        }
    }

    batch.territories.retain(|_, layer| !layer.is_empty());
    batch
}
