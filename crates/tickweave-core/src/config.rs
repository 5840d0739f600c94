//! Tickweave configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickweaveConfig {
    #[serde(default)]
    pub lag: LagConfig,
    #[serde(default)]
    pub driver: DriverConfig,
}

impl Default for TickweaveConfig {
    fn default() -> Self {
        Self {
            lag: LagConfig::default(),
            driver: DriverConfig::default(),
        }
    }
}

impl TickweaveConfig {
    /// Load config from the default path (~/.tickweave/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::TickweaveError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::TickweaveError::Config(format!("Failed to parse config: {e}")))?;
        tracing::debug!("📋 Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::TickweaveError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tickweave")
            .join("config.toml")
    }
}

/// Frame-lag probe configuration.
///
/// The defaults are the tuned production values: watch at most 20 frames,
/// judge jitter over the 3 most recent delta samples, and call the frame
/// rate steady once their variance drops below 20 ms².
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LagConfig {
    #[serde(default = "default_max_window_frames")]
    pub max_window_frames: u64,
    #[serde(default = "default_sample_window")]
    pub sample_window: usize,
    #[serde(default = "default_variance_threshold")]
    pub variance_threshold_ms2: f64,
}

fn default_max_window_frames() -> u64 { 20 }
fn default_sample_window() -> usize { 3 }
fn default_variance_threshold() -> f64 { 20.0 }

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            max_window_frames: default_max_window_frames(),
            sample_window: default_sample_window(),
            variance_threshold_ms2: default_variance_threshold(),
        }
    }
}

/// Tick driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_fps() -> u32 { 60 }

impl Default for DriverConfig {
    fn default() -> Self {
        Self { fps: default_fps() }
    }
}
