use std::path::PathBuf;

/// Result type alias for converter operations
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Errors raised while resolving options or converting files
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// Input path vanished between submission and conversion
    #[error("Input file does not exist: {}", display_name(path))]
    InputNotFound { path: PathBuf },

    #[error("Invalid bitrate value: {0}. Please enter a numeric value.")]
    InvalidBitrateValue(String),

    #[error("Invalid bitrate unit selected: {0}")]
    InvalidBitrateUnit(String),

    #[error("Unknown output format: {0}")]
    UnknownFormat(String),

    #[error("Unknown codec: {0}")]
    UnknownCodec(String),

    #[error("Unknown output resolution: {0}")]
    UnknownResolution(String),

    #[error("Unknown output fps: {0}")]
    UnknownFps(String),

    /// The engine binary could not be started at all
    #[error("failed to start {}: {source}", bin.display())]
    EngineSpawnFailure {
        bin: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine ran and reported failure
    #[error("FFmpeg error code {code}\n{diagnostic}")]
    EngineNonZeroExit { code: i32, diagnostic: String },

    /// Duration marker missing or unparsable; never reported, only degrades progress
    #[error("could not determine duration: {0}")]
    DurationProbeFailure(String),

    #[error("No valid video files found. Please upload video files.")]
    EmptyBatch,

    #[error("conversion cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ConvertError {
    /// Errors that abort the whole batch instead of a single file
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            ConvertError::InvalidBitrateValue(_)
                | ConvertError::InvalidBitrateUnit(_)
                | ConvertError::UnknownFormat(_)
                | ConvertError::UnknownCodec(_)
                | ConvertError::UnknownResolution(_)
                | ConvertError::UnknownFps(_)
                | ConvertError::EmptyBatch
        )
    }
}

fn display_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
