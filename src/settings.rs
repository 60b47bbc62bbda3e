//! Persistent player settings (`flick.json`).

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::DEFAULT_PRELOAD_WINDOW;
use crate::core::workers::default_threads;

/// Settings file name inside the config directory
pub const SETTINGS_FILE: &str = "flick.json";

/// Player and clock configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    // Playback
    pub speed: f64,
    pub skip_frames: bool,
    pub preload_window: usize,
    pub autoplay: bool,

    // Clock
    pub refresh_hz: f64,
    pub frame_interval: u32, // Tick every N refreshes

    // Workers
    pub worker_threads: usize, // 0 = auto

    // Memory
    pub memory_pressure_percent: f64, // Used system memory that triggers a trim
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            speed: 1.0,
            skip_frames: true,
            preload_window: DEFAULT_PRELOAD_WINDOW,
            autoplay: true,
            refresh_hz: 60.0,
            frame_interval: 1,
            worker_threads: 0,
            memory_pressure_percent: 90.0,
        }
    }
}

impl PlayerSettings {
    /// Load from `path`; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings: {}", path.display()))?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Worker pool size with 0 resolved to the automatic default
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            default_threads()
        } else {
            self.worker_threads
        }
    }
}
