use std::path::Path;
use log::{debug, warn};
use tokio::process::Command;
use crate::command::CommandBuilder;
use crate::error::{ConvertError, Result};
use crate::progress::parse_timestamp;

/// Extract `Duration: HH:MM:SS.ms` from the engine's banner output
pub fn parse_duration_output(output: &str) -> Result<f64> {
    let line = output
        .lines()
        .find(|l| l.contains("Duration:"))
        .ok_or_else(|| ConvertError::DurationProbeFailure("no Duration marker in output".to_string()))?;

    let start = line.find("Duration:").map(|i| i + "Duration:".len()).unwrap_or(0);
    let value = line[start..].split(',').next().unwrap_or("").trim();

    parse_timestamp(value)
        .ok_or_else(|| ConvertError::DurationProbeFailure(format!("unparsable duration '{}'", value)))
}

/// Query the total duration of `input` in seconds.
///
/// Any failure is logged and degrades to `0.0`, which disables intermediate
/// progress for that file without blocking its conversion.
pub async fn probe_duration(ffmpeg_bin: &Path, input: &Path) -> f64 {
    match try_probe_duration(ffmpeg_bin, input).await {
        Ok(seconds) => {
            debug!("Probed duration of {}: {:.2}s", input.display(), seconds);
            seconds
        }
        Err(e) => {
            warn!("Error getting video duration for {}: {}", input.display(), e);
            0.0
        }
    }
}

async fn try_probe_duration(ffmpeg_bin: &Path, input: &Path) -> Result<f64> {
    // Without an output file the engine exits non-zero after printing the
    // input description; only the text matters here.
    let args = CommandBuilder::new(false).build_probe_command(input);
    let output = Command::new(ffmpeg_bin)
        .args(&args)
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .map_err(|e| ConvertError::DurationProbeFailure(format!("failed to run {}: {}", ffmpeg_bin.display(), e)))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push('\n');
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    parse_duration_output(&combined)
}
