use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// File name of the tool settings inside `<root>/metadata/`.
pub const SETTINGS_FILE_NAME: &str = "spread.toml";

/// Numeric defaults shared by synthesis and rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Sample rate of every recording in the dataset.
    pub sample_rate_hz: f64,
    /// Noise reference used when a recording carries no `noise_db`.
    pub default_noise_db: f32,
    /// Lowest SNR mapped to a pixel value (black).
    pub snr_floor_db: f32,
    /// Highest SNR mapped to a pixel value (white).
    pub snr_ceiling_db: f32,
    /// FFT length, also the picture width.
    pub fft_size: usize,
    /// Spectrogram lines per picture before compression.
    pub lines: usize,
    /// Rows averaged together in the first compression stage.
    pub compr_avg: usize,
    /// Averaged rows reduced per block in the second compression stage.
    pub compr_proc: usize,
    /// JPEG quality, 1..=100.
    pub jpeg_quality: u8,
    /// Worker threads for batch operations.
    pub workers: usize,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            sample_rate_hz: 100e6,
            default_noise_db: -50.0,
            snr_floor_db: -10.0,
            snr_ceiling_db: 50.0,
            fft_size: 512,
            lines: 512,
            compr_avg: 3,
            compr_proc: 4,
            jpeg_quality: 90,
            workers: default_workers(),
        }
    }
}

impl ToolSettings {
    /// Load settings from `path`, falling back to defaults when the file is missing.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validated()
    }

    /// Reject values the renderer or combiner cannot use.
    pub fn validated(self) -> Result<Self, ConfigError> {
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "sample_rate_hz must be positive, got {}",
                self.sample_rate_hz
            )));
        }
        for (name, value) in [
            ("fft_size", self.fft_size),
            ("lines", self.lines),
            ("compr_avg", self.compr_avg),
            ("compr_proc", self.compr_proc),
            ("workers", self.workers),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
            }
        }
        if self.snr_floor_db >= self.snr_ceiling_db {
            return Err(ConfigError::Invalid(format!(
                "snr_floor_db ({}) must be below snr_ceiling_db ({})",
                self.snr_floor_db, self.snr_ceiling_db
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        Ok(self)
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
