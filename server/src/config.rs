use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use claimmap_shared::{PipelineConfig, RendererCapabilities};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::adapters::BackendKind;

pub const DEFAULT_CLAIMS_URL: &str = "http://127.0.0.1:8100/claims";
pub const DEFAULT_CLAIMS_REFRESH_SECS: u64 = 30;
pub const DEFAULT_RENDER_INTERVAL_SECS: u64 = 300; // 5 minutes
pub const DEFAULT_CONFIG_PATH: &str = "claimmap.toml";
pub const DEFAULT_UPSTREAM_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 3;
pub const DEFAULT_SERVER_PORT: u16 = 3000;

pub fn claims_url() -> String {
    std::env::var("CLAIMS_URL")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_CLAIMS_URL.to_string())
}

pub fn claims_refresh_interval() -> Duration {
    std::env::var("CLAIMS_REFRESH_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(DEFAULT_CLAIMS_REFRESH_SECS))
}

pub fn config_path() -> PathBuf {
    std::env::var_os("CLAIMMAP_CONFIG")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub fn server_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_SERVER_PORT)
}

pub fn upstream_http_timeout() -> Duration {
    std::env::var("UPSTREAM_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(DEFAULT_UPSTREAM_HTTP_TIMEOUT_SECS))
}

pub fn upstream_connect_timeout() -> Duration {
    std::env::var("UPSTREAM_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid geometry settings: {0}")]
    Geometry(String),
    #[error("refresh_interval_secs must be greater than zero")]
    ZeroRefreshInterval,
    #[error("backend {0} is configured more than once")]
    DuplicateBackend(BackendKind),
}

/// One renderer backend entry from the config file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Overrides the backend's built-in choice.
    #[serde(default)]
    pub merge_diagonal_holes: Option<bool>,
    #[serde(default)]
    pub supports_icons: Option<bool>,
}

fn enabled_by_default() -> bool {
    true
}

impl BackendConfig {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            enabled: true,
            merge_diagonal_holes: None,
            supports_icons: None,
        }
    }

    pub fn capabilities(&self) -> RendererCapabilities {
        let mut capabilities = self.kind.capabilities();
        if let Some(merge) = self.merge_diagonal_holes {
            capabilities.merge_diagonal_holes = merge;
        }
        if let Some(icons) = self.supports_icons {
            capabilities.supports_icons = icons;
        }
        capabilities
    }
}

/// Everything the config file controls. Built once at startup and handed to
/// each refresher.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub refresh_interval_secs: u64,
    #[serde(flatten)]
    pub pipeline: PipelineConfig,
    pub backends: Vec<BackendConfig>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: DEFAULT_RENDER_INTERVAL_SECS,
            pipeline: PipelineConfig::default(),
            backends: BackendKind::ALL.into_iter().map(BackendConfig::new).collect(),
        }
    }
}

impl MapConfig {
    /// Load from `path`; a missing file means defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "no config file found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::parse(&raw, path)
    }

    pub fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::ZeroRefreshInterval);
        }
        self.pipeline
            .geometry
            .validate()
            .map_err(ConfigError::Geometry)?;

        let mut seen = HashSet::new();
        for backend in &self.backends {
            if !seen.insert(backend.kind) {
                return Err(ConfigError::DuplicateBackend(backend.kind));
            }
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}
