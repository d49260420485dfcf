use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::Result;

/// How hardware-accelerated decoding is decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GpuMode {
    /// Ask the engine which hwaccels it supports
    #[default]
    Auto,
    Enabled,
    Disabled,
}

/// Configuration for the batch converter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Path to the ffmpeg binary
    pub ffmpeg_bin: PathBuf,
    /// Directory receiving converted files
    pub output_dir: PathBuf,
    /// Hardware acceleration policy
    pub gpu_acceleration: GpuMode,
    /// Extensions (without dot) accepted as video input, compared case-insensitively
    pub video_extensions: Vec<String>,
    /// Number of trailing engine output lines kept for failure messages
    pub diagnostic_tail_lines: usize,
    /// Never let the reported batch fraction go backwards
    pub monotonic_progress: bool,
    /// Write a JSON report next to the converted files
    pub write_report: bool,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl ConverterConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            ffmpeg_bin: default_ffmpeg_bin(),
            output_dir: PathBuf::from("converted_videos"),
            gpu_acceleration: GpuMode::Auto,
            video_extensions: ["mp4", "avi", "mkv", "mov", "wmv", "flv", "mpeg"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            diagnostic_tail_lines: 20,
            monotonic_progress: false,
            write_report: true,
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)?;

                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)?;
                } else {
                    config = serde_json::from_str(&content)?;
                }
                log::debug!("Loaded configuration from {}", config_path.display());
            } else {
                log::warn!("Config file {} not found, using defaults", config_path.display());
            }
        }

        Ok(config)
    }
}

#[cfg(windows)]
fn default_ffmpeg_bin() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_default()
        .join("ffmpeg")
        .join("bin")
        .join("ffmpeg.exe")
}

#[cfg(not(windows))]
fn default_ffmpeg_bin() -> PathBuf {
    PathBuf::from("ffmpeg")
}
