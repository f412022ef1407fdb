use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use splitpdf_core::LoadingParams;
use thiserror::Error;

use crate::scale::{ScaleBounds, ScaleValue, MAX_SCALE, MIN_SCALE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ViewerConfig {
    #[serde_as(as = "DisplayFromStr")]
    pub default_scale: ScaleValue,
    /// Re-fit the page width whenever the container is resized.
    pub auto_fit: bool,
    pub min_scale: f32,
    pub max_scale: f32,
    pub frame_interval_ms: u64,
    pub loading: LoadingParams,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            default_scale: ScaleValue::default(),
            auto_fit: false,
            min_scale: MIN_SCALE,
            max_scale: MAX_SCALE,
            frame_interval_ms: 16,
            loading: LoadingParams::default(),
        }
    }
}

impl ViewerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn bounds(&self) -> ScaleBounds {
        let min = self.min_scale.max(f32::MIN_POSITIVE);
        ScaleBounds {
            min,
            max: self.max_scale.max(min),
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}
