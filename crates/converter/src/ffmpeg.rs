use std::path::{Path, PathBuf};
use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use tokio::process::Command;
use crate::config::{ConverterConfig, GpuMode};

/// FFmpeg version information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FFmpegVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FFmpegVersion {
    /// Parse version from FFmpeg version string
    /// Example: "ffmpeg version 7.1.1" -> FFmpegVersion { major: 7, minor: 1, patch: 1 }
    /// Git builds report "n7.1-2-gabcdef"; the leading `n` and the suffix are ignored.
    pub fn parse(version_str: &str) -> Result<Self> {
        let version_part = version_str
            .split_whitespace()
            .map(|s| s.trim_start_matches('n'))
            .find(|s| s.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false))
            .ok_or_else(|| anyhow!("No version number found in: {}", version_str))?;

        let numeric: String = version_part
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let parts: Vec<&str> = numeric.split('.').filter(|p| !p.is_empty()).collect();

        if parts.is_empty() {
            return Err(anyhow!("Invalid version format: {}", version_str));
        }

        let major = parts[0].parse::<u32>()
            .with_context(|| format!("Failed to parse major version from: {}", parts[0]))?;
        let minor = match parts.get(1) {
            Some(p) => p.parse::<u32>()
                .with_context(|| format!("Failed to parse minor version from: {}", p))?,
            None => 0,
        };
        let patch = match parts.get(2) {
            Some(p) => p.parse::<u32>()
                .with_context(|| format!("Failed to parse patch version from: {}", p))?,
            None => 0,
        };

        Ok(FFmpegVersion { major, minor, patch })
    }
}

impl std::fmt::Display for FFmpegVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// What the installed engine can do
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub ffmpeg_bin: PathBuf,
    pub version: Option<FFmpegVersion>,
    pub hwaccels: Vec<String>,
    pub gpu_available: bool,
}

impl EngineInfo {
    /// Inspect the configured engine. Detection problems are logged, never fatal:
    /// the batch reports per-file spawn failures itself.
    pub async fn detect(config: &ConverterConfig) -> Self {
        let ffmpeg_bin = config.ffmpeg_bin.clone();

        let version = match detect_version(&ffmpeg_bin).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Could not determine FFmpeg version: {:#}", e);
                None
            }
        };

        let hwaccels = match config.gpu_acceleration {
            GpuMode::Auto => detect_hwaccels(&ffmpeg_bin).await.unwrap_or_else(|e| {
                warn!("Could not query FFmpeg hwaccels: {:#}", e);
                Vec::new()
            }),
            GpuMode::Enabled | GpuMode::Disabled => Vec::new(),
        };

        let gpu_available = match config.gpu_acceleration {
            GpuMode::Enabled => true,
            GpuMode::Disabled => false,
            GpuMode::Auto => hwaccels.iter().any(|h| h == "cuda"),
        };

        let info = EngineInfo {
            ffmpeg_bin,
            version,
            hwaccels,
            gpu_available,
        };
        info!(
            "FFmpeg {} at {} (GPU acceleration: {})",
            info.version_label(),
            info.ffmpeg_bin.display(),
            if info.gpu_available { "Available" } else { "Not Available" }
        );
        info
    }

    /// Engine version for display, `unknown` when detection failed
    pub fn version_label(&self) -> String {
        self.version
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Detect FFmpeg version
pub async fn detect_version(ffmpeg_bin: &Path) -> Result<FFmpegVersion> {
    let output = Command::new(ffmpeg_bin)
        .arg("-version")
        .output()
        .await
        .with_context(|| format!("Failed to execute FFmpeg at: {}", ffmpeg_bin.display()))?;

    if !output.status.success() {
        return Err(anyhow!("FFmpeg version check failed"));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let first_line = stdout.lines().next()
        .ok_or_else(|| anyhow!("Empty output from FFmpeg -version"))?;

    FFmpegVersion::parse(first_line)
}

/// Detect available hardware acceleration methods
pub async fn detect_hwaccels(ffmpeg_bin: &Path) -> Result<Vec<String>> {
    let output = Command::new(ffmpeg_bin)
        .arg("-hide_banner")
        .arg("-hwaccels")
        .output()
        .await
        .with_context(|| format!("Failed to query FFmpeg hwaccels at: {}", ffmpeg_bin.display()))?;

    if !output.status.success() {
        return Err(anyhow!("FFmpeg hwaccel query failed"));
    }

    Ok(parse_hwaccels(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse the output of `ffmpeg -hwaccels`: a header line followed by one method per line
pub fn parse_hwaccels(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.ends_with(':'))
        .map(|l| l.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_version_parsing() {
        let v1 = FFmpegVersion::parse("ffmpeg version 6.0 Copyright (c) 2000-2023").unwrap();
        assert_eq!(v1, FFmpegVersion { major: 6, minor: 0, patch: 0 });

        let v2 = FFmpegVersion::parse("ffmpeg version 7.1.1").unwrap();
        assert_eq!(v2, FFmpegVersion { major: 7, minor: 1, patch: 1 });

        let v3 = FFmpegVersion::parse("ffmpeg version 4.4.2-0ubuntu0.22.04.1").unwrap();
        assert_eq!(v3, FFmpegVersion { major: 4, minor: 4, patch: 2 });

        let v4 = FFmpegVersion::parse("ffmpeg version n7.1-2-g1234abcd").unwrap();
        assert_eq!(v4, FFmpegVersion { major: 7, minor: 1, patch: 0 });
    }

    #[test]
    fn test_version_parsing_failure() {
        assert!(FFmpegVersion::parse("ffmpeg version").is_err());
        assert!(FFmpegVersion::parse("").is_err());
    }

    #[test]
    fn test_parse_hwaccels() {
        let out = "Hardware acceleration methods:\nvdpau\ncuda\nvaapi\n\n";
        assert_eq!(parse_hwaccels(out), vec!["vdpau", "cuda", "vaapi"]);
        assert!(parse_hwaccels("Hardware acceleration methods:\n").is_empty());
    }

    #[tokio::test]
    async fn test_forced_gpu_modes_skip_detection() {
        let mut cfg = ConverterConfig {
            ffmpeg_bin: PathBuf::from("/nonexistent/ffmpeg-binary"),
            gpu_acceleration: GpuMode::Enabled,
            ..Default::default()
        };
        let info = EngineInfo::detect(&cfg).await;
        assert!(info.gpu_available);
        assert!(info.version.is_none());
        assert_eq!(info.version_label(), "unknown");
        assert!(info.hwaccels.is_empty());

        cfg.gpu_acceleration = GpuMode::Disabled;
        assert!(!EngineInfo::detect(&cfg).await.gpu_available);

        cfg.gpu_acceleration = GpuMode::Auto;
        assert!(!EngineInfo::detect(&cfg).await.gpu_available);
    }

    #[test]
    fn test_version_label_uses_detected_version() {
        let info = EngineInfo {
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            version: Some(FFmpegVersion { major: 7, minor: 1, patch: 1 }),
            hwaccels: vec!["cuda".to_string()],
            gpu_available: true,
        };
        assert_eq!(info.version_label(), "7.1.1");
    }

    proptest! {
        #[test]
        fn test_version_display_round_trip(
            major in 0u32..20u32,
            minor in 0u32..10u32,
            patch in 0u32..10u32,
        ) {
            let version = FFmpegVersion { major, minor, patch };
            let parsed = FFmpegVersion::parse(&format!("ffmpeg version {}", version)).unwrap();
            prop_assert_eq!(parsed, version);
        }
    }
}
