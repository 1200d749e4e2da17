use anyhow::{Context, Result};
use serde::{Serialize, Deserialize};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::core::analyzer::LEVEL_SMOOTHING;
use crate::core::gate::GATE_THRESHOLD;
use crate::core::oscillator::{Envelope, Waveform};

const APP_DIR: &str = "pitchmidi";
const SETTINGS_FILE: &str = "settings.json";

/// Runtime settings. Only ever read; nothing is saved between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub gate_threshold: f32,
    pub level_smoothing: f32,
    pub window_size: usize,
    pub hop_size: usize,
    pub power_threshold: f32,
    pub clarity_threshold: f32,
    pub input_device: Option<String>,
    pub midi_output_port: Option<String>,
    pub volume: f32,
    pub waveform: Waveform,
    pub envelope: Envelope,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gate_threshold: GATE_THRESHOLD,
            level_smoothing: LEVEL_SMOOTHING,
            window_size: 2048,
            hop_size: 1024,
            power_threshold: 0.1,
            clarity_threshold: 0.7,
            input_device: None,
            midi_output_port: None,
            volume: 0.5,
            waveform: Waveform::default(),
            envelope: Envelope::default(),
        }
    }
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE))
    }

    /// Load from the user config dir, or defaults when there is no file
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open settings file {}", path.display()))?;
        let settings: Self = serde_json::from_reader(file)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.gate_threshold) {
            anyhow::bail!("gate_threshold must be in [0, 1), got {}", self.gate_threshold);
        }
        if !(0.0..1.0).contains(&self.level_smoothing) {
            anyhow::bail!("level_smoothing must be in [0, 1), got {}", self.level_smoothing);
        }
        if self.hop_size == 0 || self.window_size < self.hop_size {
            anyhow::bail!(
                "window_size ({}) must be at least hop_size ({}) and hop_size non-zero",
                self.window_size,
                self.hop_size
            );
        }
        if !(0.0..=1.0).contains(&self.volume) {
            anyhow::bail!("volume must be in [0, 1], got {}", self.volume);
        }
        Ok(())
    }
}
