use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use claimmap_shared::{
    MarkerBatch, Point, RendererCapabilities, Ring, TerritoryMarker, WarpMarker,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::PublishedLayer;

/// Height Bluemap shapes are drawn at.
pub const BLUEMAP_SHAPE_Y: f64 = 64.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Dynmap,
    Bluemap,
    Squaremap,
    Pl3xmap,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Dynmap,
        BackendKind::Bluemap,
        BackendKind::Squaremap,
        BackendKind::Pl3xmap,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            BackendKind::Dynmap => "dynmap",
            BackendKind::Bluemap => "bluemap",
            BackendKind::Squaremap => "squaremap",
            BackendKind::Pl3xmap => "pl3xmap",
        }
    }

    /// Built-in capabilities; config entries may override the optional ones.
    pub const fn capabilities(self) -> RendererCapabilities {
        match self {
            BackendKind::Dynmap => RendererCapabilities {
                supports_holes: false,
                supports_icons: true,
                merge_diagonal_holes: false,
            },
            BackendKind::Bluemap => RendererCapabilities {
                supports_holes: true,
                supports_icons: true,
                merge_diagonal_holes: true,
            },
            BackendKind::Squaremap => RendererCapabilities {
                supports_holes: true,
                supports_icons: true,
                merge_diagonal_holes: false,
            },
            BackendKind::Pl3xmap => RendererCapabilities {
                supports_holes: true,
                supports_icons: false,
                merge_diagonal_holes: false,
            },
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown backend: {0}")]
pub struct UnknownBackend(pub String);

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| UnknownBackend(raw.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("backend {0} is not available")]
    Unavailable(BackendKind),
    #[error("failed to serialize layer: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The seam between the shared pipeline and one renderer backend.
pub trait RendererAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;
    fn capabilities(&self) -> RendererCapabilities;
    fn is_available(&self) -> bool;
    fn apply(&self, batch: MarkerBatch) -> Result<PublishedLayer, AdapterError>;
}

type Xz = [f64; 2];
type Xyz = [f64; 3];

fn xz(ring: &[Point]) -> Vec<Xz> {
    ring.iter().map(|p| [p.x, p.z]).collect()
}

fn xz_rings(rings: &[Ring]) -> Vec<Vec<Xz>> {
    rings.iter().map(|ring| xz(ring)).collect()
}

fn xyz(ring: &[Point], y: f64) -> Vec<Xyz> {
    ring.iter().map(|p| [p.x, y, p.z]).collect()
}

/// `0xAARRGGBB`
fn argb(color: claimmap_shared::Rgb, opacity: f64) -> u32 {
    let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u32;
    (alpha << 24) | color.as_u32()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DynmapArea {
    pub id: String,
    pub label: String,
    pub markup: String,
    pub x: Vec<f64>,
    pub z: Vec<f64>,
    pub line_color: u32,
    pub line_opacity: f64,
    pub line_weight: u32,
    pub fill_color: u32,
    pub fill_opacity: f64,
    pub boost: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BluemapShape {
    pub id: String,
    pub label: String,
    pub detail: String,
    pub shape: Vec<Xyz>,
    pub holes: Vec<Vec<Xyz>>,
    pub line_color: String,
    pub fill_color: String,
    pub line_width: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SquaremapPolygon {
    pub id: String,
    pub tooltip: String,
    pub popup: String,
    pub points: Vec<Xz>,
    pub negative_space: Vec<Vec<Xz>>,
    pub stroke_color: String,
    pub stroke_opacity: f64,
    pub stroke_weight: u32,
    pub fill_color: String,
    pub fill_opacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pl3xmapPolygon {
    pub key: String,
    pub tooltip: String,
    pub popup: String,
    /// Outer ring first, then holes.
    pub polylines: Vec<Vec<Xz>>,
    pub stroke: u32,
    pub fill: u32,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendMarker {
    DynmapArea(DynmapArea),
    BluemapShape(BluemapShape),
    SquaremapPolygon(SquaremapPolygon),
    Pl3xmapPolygon(Pl3xmapPolygon),
}

impl BackendMarker {
    pub fn id(&self) -> &str {
        match self {
            BackendMarker::DynmapArea(area) => &area.id,
            BackendMarker::BluemapShape(shape) => &shape.id,
            BackendMarker::SquaremapPolygon(polygon) => &polygon.id,
            BackendMarker::Pl3xmapPolygon(polygon) => &polygon.key,
        }
    }
}

/// Convert one territory marker into the backend's own marker shape.
/// Hole rings are dropped for backends that cannot draw them.
pub fn adapt_marker(
    kind: BackendKind,
    marker: &TerritoryMarker,
    capabilities: RendererCapabilities,
) -> BackendMarker {
    let style = &marker.style;
    let holes: &[Ring] = if capabilities.supports_holes {
        &marker.polygon.holes
    } else {
        &[]
    };

    match kind {
        BackendKind::Dynmap => BackendMarker::DynmapArea(DynmapArea {
            id: marker.id.clone(),
            label: marker.label.clone(),
            markup: marker.description.clone(),
            x: marker.polygon.outer.iter().map(|p| p.x).collect(),
            z: marker.polygon.outer.iter().map(|p| p.z).collect(),
            line_color: style.line_color.as_u32(),
            line_opacity: style.line_opacity,
            line_weight: style.line_weight,
            fill_color: style.fill_color.as_u32(),
            fill_opacity: style.fill_opacity,
            boost: style.boost,
        }),
        BackendKind::Bluemap => BackendMarker::BluemapShape(BluemapShape {
            id: marker.id.clone(),
            label: marker.label.clone(),
            detail: marker.description.clone(),
            shape: xyz(&marker.polygon.outer, BLUEMAP_SHAPE_Y),
            holes: holes
                .iter()
                .map(|hole| xyz(hole, BLUEMAP_SHAPE_Y))
                .collect(),
            line_color: style.line_color.rgba_css(style.line_opacity),
            fill_color: style.fill_color.rgba_css(style.fill_opacity),
            line_width: style.line_weight,
        }),
        BackendKind::Squaremap => BackendMarker::SquaremapPolygon(SquaremapPolygon {
            id: marker.id.clone(),
            tooltip: marker.label.clone(),
            popup: marker.description.clone(),
            points: xz(&marker.polygon.outer),
            negative_space: xz_rings(holes),
            stroke_color: style.line_color.to_string(),
            stroke_opacity: style.line_opacity,
            stroke_weight: style.line_weight,
            fill_color: style.fill_color.to_string(),
            fill_opacity: style.fill_opacity,
        }),
        BackendKind::Pl3xmap => {
            let mut polylines = Vec::with_capacity(1 + holes.len());
            polylines.push(xz(&marker.polygon.outer));
            polylines.extend(holes.iter().map(|hole| xz(hole)));
            BackendMarker::Pl3xmapPolygon(Pl3xmapPolygon {
                key: marker.id.clone(),
                tooltip: marker.label.clone(),
                popup: marker.description.clone(),
                polylines,
                stroke: argb(style.line_color, style.line_opacity),
                fill: argb(style.fill_color, style.fill_opacity),
                weight: style.line_weight,
            })
        }
    }
}

#[derive(Debug, Serialize)]
struct WorldLayer<'a> {
    territories: Vec<BackendMarker>,
    home_warps: &'a [WarpMarker],
    other_warps: &'a [WarpMarker],
}

#[derive(Debug, Serialize)]
struct LayerDocument<'a> {
    backend: BackendKind,
    seq: u64,
    generated_at: DateTime<Utc>,
    worlds: BTreeMap<&'a str, WorldLayer<'a>>,
}

/// Serialize a batch as the backend's published layer document. Worlds and
/// markers are ordered so identical batches produce identical bytes.
pub fn render_layer(
    kind: BackendKind,
    capabilities: RendererCapabilities,
    seq: u64,
    batch: &MarkerBatch,
) -> Result<Bytes, serde_json::Error> {
    let mut worlds: BTreeMap<&str, WorldLayer<'_>> = BTreeMap::new();

    for (world, markers) in &batch.territories {
        let mut territories: Vec<BackendMarker> = markers
            .values()
            .map(|marker| adapt_marker(kind, marker, capabilities))
            .collect();
        territories.sort_by(|a, b| a.id().cmp(b.id()));
        worlds.insert(
            world.as_str(),
            WorldLayer {
                territories,
                home_warps: &[],
                other_warps: &[],
            },
        );
    }

    for (world, warps) in &batch.warps {
        let layer = worlds.entry(world.as_str()).or_insert_with(|| WorldLayer {
            territories: Vec::new(),
            home_warps: &[],
            other_warps: &[],
        });
        layer.home_warps = warps.home.as_slice();
        layer.other_warps = warps.other.as_slice();
    }

    let document = LayerDocument {
        backend: kind,
        seq,
        generated_at: batch.generated_at,
        worlds,
    };
    serde_json::to_vec(&document).map(Bytes::from)
}

/// Adapter that renders batches into the shared layer store served over HTTP.
pub struct LayerPublisher {
    kind: BackendKind,
    capabilities: RendererCapabilities,
    enabled: bool,
    next_seq: AtomicU64,
    layers: Arc<DashMap<BackendKind, PublishedLayer>>,
}

impl LayerPublisher {
    pub fn new(
        kind: BackendKind,
        capabilities: RendererCapabilities,
        enabled: bool,
        layers: Arc<DashMap<BackendKind, PublishedLayer>>,
    ) -> Self {
        Self {
            kind,
            capabilities,
            enabled,
            next_seq: AtomicU64::new(0),
            layers,
        }
    }
}

impl RendererAdapter for LayerPublisher {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn capabilities(&self) -> RendererCapabilities {
        self.capabilities
    }

    fn is_available(&self) -> bool {
        self.enabled
    }

    fn apply(&self, batch: MarkerBatch) -> Result<PublishedLayer, AdapterError> {
        if !self.is_available() {
            return Err(AdapterError::Unavailable(self.kind));
        }

        let seq = self.next_seq.fetch_add(1, Ordering::AcqRel) + 1;
        let json = render_layer(self.kind, self.capabilities, seq, &batch)?;
        let layer = PublishedLayer {
            seq,
            generated_at: batch.generated_at,
            territory_count: batch.territory_count(),
            warp_count: batch.warp_count(),
            json: Arc::new(json),
        };
        self.layers.insert(self.kind, layer.clone());
        Ok(layer)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use claimmap_shared::{
        MarkerBatch, Point, Polygon, Rgb, TerritoryMarker, TerritoryStyle, WarpMarker, WorldWarps,
    };
    use dashmap::DashMap;

    use super::{
        AdapterError, BLUEMAP_SHAPE_Y, BackendKind, BackendMarker, LayerPublisher,
        RendererAdapter, UnknownBackend, adapt_marker, argb, render_layer,
    };

    fn square(x0: f64, z0: f64, size: f64) -> Vec<Point> {
        vec![
            Point::new(x0, z0),
            Point::new(x0 + size, z0),
            Point::new(x0 + size, z0 + size),
            Point::new(x0, z0 + size),
        ]
    }

    fn marker(id: &str) -> TerritoryMarker {
        TerritoryMarker {
            id: id.to_string(),
            faction_id: "f1".to_string(),
            label: "Wardens".to_string(),
            description: "Est. 2019".to_string(),
            polygon: Polygon {
                outer: square(0.0, 0.0, 48.0),
                holes: vec![square(16.0, 16.0, 16.0)],
            },
            style: TerritoryStyle {
                line_color: Rgb(0xff, 0x00, 0x00),
                fill_color: Rgb(0x00, 0x00, 0xff),
                line_opacity: 1.0,
                fill_opacity: 0.5,
                line_weight: 3,
                boost: true,
            },
        }
    }

    fn batch() -> MarkerBatch {
        let mut batch = MarkerBatch::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
        batch.territories.insert(
            "overworld".to_string(),
            HashMap::from([
                ("overworld__f1__1".to_string(), marker("overworld__f1__1")),
                ("overworld__f1__0".to_string(), marker("overworld__f1__0")),
            ]),
        );
        batch.warps.insert(
            "nether".to_string(),
            WorldWarps {
                home: vec![WarpMarker {
                    label: "Hub".to_string(),
                    world: "nether".to_string(),
                    x: 0.0,
                    y: 70.0,
                    z: 0.0,
                    icon: None,
                    description: String::new(),
                }],
                other: Vec::new(),
            },
        );
        batch
    }

    #[test]
    fn backend_names_parse_case_insensitively() {
        assert_eq!("Bluemap".parse::<BackendKind>(), Ok(BackendKind::Bluemap));
        assert_eq!(" pl3xmap ".parse::<BackendKind>(), Ok(BackendKind::Pl3xmap));
        assert_eq!(
            "leaflet".parse::<BackendKind>(),
            Err(UnknownBackend("leaflet".to_string()))
        );
        for kind in BackendKind::ALL {
            assert_eq!(kind.to_string().parse::<BackendKind>(), Ok(kind));
        }
    }

    #[test]
    fn only_bluemap_merges_diagonal_holes_by_default() {
        for kind in BackendKind::ALL {
            assert_eq!(
                kind.capabilities().merge_diagonal_holes,
                kind == BackendKind::Bluemap
            );
        }
        assert!(!BackendKind::Dynmap.capabilities().supports_holes);
    }

    #[test]
    fn dynmap_area_uses_flat_coordinate_arrays_without_holes() {
        let marker = marker("overworld__f1__0");
        let BackendMarker::DynmapArea(area) = adapt_marker(
            BackendKind::Dynmap,
            &marker,
            BackendKind::Dynmap.capabilities(),
        ) else {
            panic!("expected a dynmap area");
        };
        assert_eq!(area.x, vec![0.0, 48.0, 48.0, 0.0]);
        assert_eq!(area.z, vec![0.0, 0.0, 48.0, 48.0]);
        assert_eq!(area.line_color, 0xff0000);
        assert_eq!(area.fill_color, 0x0000ff);
        assert_eq!(area.markup, "Est. 2019");
        assert!(area.boost);
    }

    #[test]
    fn bluemap_shape_lifts_points_to_marker_height() {
        let marker = marker("overworld__f1__0");
        let BackendMarker::BluemapShape(shape) = adapt_marker(
            BackendKind::Bluemap,
            &marker,
            BackendKind::Bluemap.capabilities(),
        ) else {
            panic!("expected a bluemap shape");
        };
        assert_eq!(shape.shape[1], [48.0, BLUEMAP_SHAPE_Y, 0.0]);
        assert_eq!(shape.holes.len(), 1);
        assert_eq!(shape.fill_color, "rgba(0,0,255,0.5)");
    }

    #[test]
    fn squaremap_and_pl3xmap_carry_holes() {
        let marker = marker("overworld__f1__0");
        let BackendMarker::SquaremapPolygon(polygon) = adapt_marker(
            BackendKind::Squaremap,
            &marker,
            BackendKind::Squaremap.capabilities(),
        ) else {
            panic!("expected a squaremap polygon");
        };
        assert_eq!(polygon.negative_space.len(), 1);
        assert_eq!(polygon.stroke_color, "#ff0000");

        let BackendMarker::Pl3xmapPolygon(polygon) = adapt_marker(
            BackendKind::Pl3xmap,
            &marker,
            BackendKind::Pl3xmap.capabilities(),
        ) else {
            panic!("expected a pl3xmap polygon");
        };
        assert_eq!(polygon.polylines.len(), 2);
        assert_eq!(polygon.polylines[1][0], [16.0, 16.0]);
        assert_eq!(polygon.fill, 0x800000ff);
    }

    #[test]
    fn holes_skipped_when_capability_is_off() {
        let marker = marker("overworld__f1__0");
        let mut capabilities = BackendKind::Squaremap.capabilities();
        capabilities.supports_holes = false;
        let BackendMarker::SquaremapPolygon(polygon) =
            adapt_marker(BackendKind::Squaremap, &marker, capabilities)
        else {
            panic!("expected a squaremap polygon");
        };
        assert!(polygon.negative_space.is_empty());
    }

    #[test]
    fn argb_packs_rounded_alpha() {
        assert_eq!(argb(Rgb(0x12, 0x34, 0x56), 1.0), 0xff123456);
        assert_eq!(argb(Rgb(0x12, 0x34, 0x56), 0.0), 0x00123456);
        assert_eq!(argb(Rgb(0, 0, 0), 7.0), 0xff000000);
    }

    #[test]
    fn rendered_layer_is_ordered_and_includes_warp_only_worlds() {
        let batch = batch();
        let json = render_layer(
            BackendKind::Squaremap,
            BackendKind::Squaremap.capabilities(),
            4,
            &batch,
        )
        .expect("render layer");
        let parsed: serde_json::Value = serde_json::from_slice(&json).expect("layer json");

        assert_eq!(parsed["backend"], "squaremap");
        assert_eq!(parsed["seq"], 4);
        let territories = parsed["worlds"]["overworld"]["territories"]
            .as_array()
            .expect("territory array");
        assert_eq!(territories[0]["id"], "overworld__f1__0");
        assert_eq!(territories[1]["id"], "overworld__f1__1");
        assert_eq!(territories[0]["type"], "squaremap_polygon");
        assert_eq!(parsed["worlds"]["nether"]["home_warps"][0]["label"], "Hub");

        let again = render_layer(
            BackendKind::Squaremap,
            BackendKind::Squaremap.capabilities(),
            4,
            &batch,
        )
        .expect("render layer again");
        assert_eq!(json, again);
    }

    #[test]
    fn publisher_stores_layer_with_increasing_seq() {
        let layers = Arc::new(DashMap::new());
        let publisher = LayerPublisher::new(
            BackendKind::Bluemap,
            BackendKind::Bluemap.capabilities(),
            true,
            Arc::clone(&layers),
        );

        let first = publisher.apply(batch()).expect("first publish");
        let second = publisher.apply(batch()).expect("second publish");
        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        assert_eq!(second.territory_count, 2);
        assert_eq!(second.warp_count, 1);
        assert_eq!(
            layers.get(&BackendKind::Bluemap).map(|layer| layer.seq),
            Some(2)
        );
    }

    #[test]
    fn unavailable_publisher_discards_batches() {
        let layers = Arc::new(DashMap::new());
        let publisher = LayerPublisher::new(
            BackendKind::Dynmap,
            BackendKind::Dynmap.capabilities(),
            false,
            Arc::clone(&layers),
        );
        assert!(!publisher.is_available());
        assert!(matches!(
            publisher.apply(batch()),
            Err(AdapterError::Unavailable(BackendKind::Dynmap))
        ));
        assert!(layers.is_empty());
    }
}
