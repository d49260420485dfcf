use std::path::{Path, PathBuf};
use chrono::NaiveDateTime;
use crate::options::{Bitrate, Codec, ResolvedOptions};

/// Constant rate factor used when no bitrate is requested
pub const DEFAULT_CRF: u8 = 23;

/// Everything needed to convert one input file. Built once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub input: PathBuf,
    pub options: ResolvedOptions,
    pub output_dir: PathBuf,
    pub output_filename: String,
}

impl ConversionRequest {
    /// Build a request, naming the output after the input stem and `timestamp`
    pub fn new(input: &Path, options: ResolvedOptions, output_dir: &Path, timestamp: NaiveDateTime) -> Self {
        let display_name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let output_filename = output_filename(&display_name, options.format.extension(), timestamp);
        Self {
            input: input.to_path_buf(),
            options,
            output_dir: output_dir.to_path_buf(),
            output_filename,
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_filename)
    }

    /// Ensure the output filename does not clobber an existing file.
    ///
    /// Two inputs with the same stem converted within one second would otherwise
    /// share a name; a `-N` counter is appended before the extension.
    pub fn with_unique_output(mut self) -> Self {
        if !self.output_path().exists() {
            return self;
        }
        let base = Path::new(&self.output_filename);
        let stem = base
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = self.options.format.extension();
        let mut n = 1;
        loop {
            let candidate = format!("{}-{}.{}", stem, n, ext);
            if !self.output_dir.join(&candidate).exists() {
                self.output_filename = candidate;
                return self;
            }
            n += 1;
        }
    }
}

/// `{stem}_{YYYYMMDD_HHMMSS}.{ext}`
pub fn output_filename(input_name: &str, extension: &str, timestamp: NaiveDateTime) -> String {
    let stem = Path::new(input_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| input_name.to_string());
    format!("{}_{}.{}", stem, timestamp.format("%Y%m%d_%H%M%S"), extension)
}

/// Command builder for generating ffmpeg argument vectors
pub struct CommandBuilder {
    gpu_available: bool,
}

impl CommandBuilder {
    /// Create a new command builder
    pub fn new(gpu_available: bool) -> Self {
        CommandBuilder { gpu_available }
    }

    /// Build the full conversion command (without the binary itself)
    ///
    /// Generates, in order:
    /// - Overwrite flag
    /// - CUDA hwaccel for H.264/HEVC when a GPU is available
    /// - Input file
    /// - Codec profile flags
    /// - Optional scale filter and frame rate
    /// - Explicit bitrate, or CRF when bitrate is auto
    /// - Output file
    ///
    /// Audio is left to the engine's default stream handling.
    pub fn build_convert_command(&self, request: &ConversionRequest) -> Vec<String> {
        let options = &request.options;
        let mut args = Vec::new();

        args.push("-y".to_string());

        if self.uses_hwaccel(options.codec) {
            args.push("-hwaccel".to_string());
            args.push("cuda".to_string());
        }

        args.push("-i".to_string());
        args.push(request.input.to_string_lossy().to_string());

        args.extend(options.codec.profile().flags.iter().map(|f| f.to_string()));

        if let Some(scale) = options.resolution.scale() {
            args.push("-vf".to_string());
            args.push(format!("scale={}", scale));
        }

        if let Some(fps) = options.fps.value() {
            args.push("-r".to_string());
            args.push(fps.to_string());
        }

        match options.bitrate {
            Bitrate::Auto => {
                args.push("-crf".to_string());
                args.push(DEFAULT_CRF.to_string());
            }
            Bitrate::Value { .. } => {
                args.push("-b:v".to_string());
                args.push(options.bitrate.engine_value().unwrap_or_default());
            }
        }

        args.push(request.output_path().to_string_lossy().to_string());

        args
    }

    /// Build the metadata-only command used to read the input's duration
    pub fn build_probe_command(&self, input: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
        ]
    }

    fn uses_hwaccel(&self, codec: Codec) -> bool {
        self.gpu_available && codec.is_hw_accelerable()
    }
}
