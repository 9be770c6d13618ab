pub mod boundary;
pub mod claims;
pub mod colors;
pub mod geometry;
pub mod marker;
pub mod pipeline;
pub mod region;
pub mod style;

pub use boundary::{Corner, CornerRing, extract_rings};
pub use claims::*;
pub use colors::Rgb;
pub use geometry::{GeometryConfig, Point, Polygon, Ring};
pub use marker::*;
pub use pipeline::{PipelineConfig, RendererCapabilities, build_batch};
pub use region::{Region, segment_regions};
pub use style::{StyleConfig, StyleResolver, TerritoryStyle};
