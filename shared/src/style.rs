use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::claims::FactionClaims;
use crate::colors::Rgb;

/// Resolved look of one faction's territory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerritoryStyle {
    pub line_color: Rgb,
    pub fill_color: Rgb,
    /// 0..1
    pub line_opacity: f64,
    /// 0..1
    pub fill_opacity: f64,
    pub line_weight: u32,
    /// Renderers that support it draw boosted areas above others.
    pub boost: bool,
}

impl Default for TerritoryStyle {
    fn default() -> Self {
        Self {
            line_color: Rgb(0x00, 0xff, 0x00),
            fill_color: Rgb(0x00, 0xff, 0x00),
            line_opacity: 0.65,
            fill_opacity: 0.22,
            line_weight: 2,
            boost: false,
        }
    }
}

impl TerritoryStyle {
    fn with_colors(&self, line_color: Rgb, fill_color: Rgb) -> Self {
        Self {
            line_color,
            fill_color,
            ..self.clone()
        }
    }

    fn clamped(mut self) -> Self {
        self.line_opacity = self.line_opacity.clamp(0.0, 1.0);
        self.fill_opacity = self.fill_opacity.clamp(0.0, 1.0);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    pub default: TerritoryStyle,
    /// Take the default style's colors from a hash of the faction name.
    pub derive_default_color_from_name: bool,
    /// Honour the colors factions set for themselves.
    pub use_faction_colors: bool,
    /// Admin overrides keyed by faction id or faction name.
    pub overrides: HashMap<String, TerritoryStyle>,
}

/// Picks a faction's style: admin override, then the faction's own colors,
/// then the default. The first tier that applies wins outright.
pub struct StyleResolver<'a> {
    config: &'a StyleConfig,
    overrides_by_name: HashMap<String, &'a TerritoryStyle>,
}

impl<'a> StyleResolver<'a> {
    pub fn new(config: &'a StyleConfig) -> Self {
        let overrides_by_name = config
            .overrides
            .iter()
            .map(|(key, style)| (key.to_lowercase(), style))
            .collect();
        Self {
            config,
            overrides_by_name,
        }
    }

    pub fn resolve(&self, faction_id: &str, faction: &FactionClaims) -> TerritoryStyle {
        if let Some(style) = self.override_for(faction_id, &faction.name) {
            return style.clone().clamped();
        }

        if self.config.use_faction_colors
            && let Some(colors) = faction.colors
        {
            return self
                .config
                .default
                .with_colors(colors.primary, colors.secondary)
                .clamped();
        }

        if self.config.derive_default_color_from_name {
            let color = Rgb::from_name(&faction.name);
            return self.config.default.with_colors(color, color).clamped();
        }

        self.config.default.clone().clamped()
    }

    fn override_for(&self, faction_id: &str, faction_name: &str) -> Option<&'a TerritoryStyle> {
        if let Some(style) = self.config.overrides.get(faction_id) {
            return Some(style);
        }
        self.overrides_by_name
            .get(&faction_name.to_lowercase())
            .copied()
    }
}
