use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use converter::{
    batch::{BatchObserver, BatchOrchestrator, InputFile},
    cancel::cancel_pair,
    config::{ConverterConfig, GpuMode},
    error::ConvertError,
    ffmpeg::EngineInfo,
    options::{BitrateUnit, Codec, ConversionOptions, Fps, OutputFormat, Resolution, SAME_AS_INPUT},
    report::{BatchReport, ConversionOutcome},
    scan,
};
use log::{debug, error, info, warn, LevelFilter};
use std::path::PathBuf;

const EXIT_PARTIAL: i32 = 1;
const EXIT_BATCH_ERROR: i32 = 2;
const EXIT_CANCELLED: i32 = 130;

/// Batch video converter driven by FFmpeg
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Video files or directories to convert
    #[arg(required_unless_present = "list_options")]
    inputs: Vec<PathBuf>,

    /// Output container
    #[arg(short, long, default_value = "MP4")]
    format: String,

    /// Video codec
    #[arg(long, default_value = "H.264")]
    codec: String,

    /// Output resolution
    #[arg(short, long, default_value = SAME_AS_INPUT)]
    resolution: String,

    /// Target bitrate; empty means automatic quality
    #[arg(short, long, default_value = "")]
    bitrate: String,

    /// Unit for --bitrate (kbps or Mbps)
    #[arg(long, default_value = "Mbps")]
    bitrate_unit: String,

    /// Output frame rate
    #[arg(long, default_value = SAME_AS_INPUT)]
    fps: String,

    /// Directory receiving converted files (overrides config)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Hardware acceleration policy (overrides config)
    #[arg(long, value_enum)]
    gpu: Option<GpuArg>,

    /// Descend into subdirectories of directory inputs
    #[arg(long)]
    recursive: bool,

    /// Print the batch report as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// List accepted option labels and exit
    #[arg(long)]
    list_options: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum GpuArg {
    Auto,
    Enabled,
    Disabled,
}

impl From<GpuArg> for GpuMode {
    fn from(arg: GpuArg) -> Self {
        match arg {
            GpuArg::Auto => GpuMode::Auto,
            GpuArg::Enabled => GpuMode::Enabled,
            GpuArg::Disabled => GpuMode::Disabled,
        }
    }
}

impl Args {
    fn conversion_options(&self) -> ConversionOptions {
        ConversionOptions {
            format: self.format.clone(),
            codec: self.codec.clone(),
            resolution: self.resolution.clone(),
            bitrate: self.bitrate.clone(),
            bitrate_unit: self.bitrate_unit.clone(),
            fps: self.fps.clone(),
        }
    }
}

/// Logs per-file progress as the batch moves along
struct LogObserver {
    total: usize,
}

impl BatchObserver for LogObserver {
    fn batch_started(&mut self, files: &[InputFile]) {
        self.total = files.len();
    }

    fn file_started(&mut self, index: usize, file: &InputFile) {
        info!("[{}/{}] Converting {}", index + 1, self.total, file.display_name);
    }

    fn file_finished(&mut self, index: usize, outcome: &ConversionOutcome) {
        let first_line = outcome.message.lines().next().unwrap_or_default();
        if outcome.success {
            info!("[{}/{}] {}", index + 1, self.total, first_line);
        } else {
            warn!("[{}/{}] {}", index + 1, self.total, first_line);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if args.verbose {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.format_timestamp_secs().init();

    let mut cfg = ConverterConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(dir) = &args.output_dir {
        cfg.output_dir = dir.clone();
    }
    if let Some(gpu) = args.gpu {
        cfg.gpu_acceleration = gpu.into();
    }

    info!("Video converter starting");
    debug!("Configuration: {:?}", cfg);

    let engine = EngineInfo::detect(&cfg).await;
    if args.list_options {
        print_options(&engine);
        return Ok(());
    }

    let files = scan::collect_inputs(&args.inputs, args.recursive);
    info!("Collected {} input file(s)", files.len());

    let (cancel_handle, cancel_token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling batch");
            cancel_handle.cancel();
        }
    });

    let mut last_decile = 0;
    let mut progress = |fraction: f64| {
        let decile = (fraction * 10.0).floor() as u32;
        if decile > last_decile {
            last_decile = decile;
            info!("Overall progress: {:.0}%", fraction * 100.0);
        }
    };
    let mut observer = LogObserver { total: 0 };

    let orchestrator = BatchOrchestrator::new(cfg, engine.gpu_available);
    let result = orchestrator
        .run(&files, &args.conversion_options(), &mut progress, &mut observer, cancel_token)
        .await;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            error!("{}", batch_error_message(&e));
            std::process::exit(EXIT_BATCH_ERROR);
        }
    };

    print_report(&report, args.json)?;
    std::process::exit(exit_code(&report));
}

fn exit_code(report: &BatchReport) -> i32 {
    if report.cancelled {
        EXIT_CANCELLED
    } else if report.all_succeeded() {
        0
    } else {
        EXIT_PARTIAL
    }
}

fn batch_error_message(err: &ConvertError) -> String {
    if err.is_batch_fatal() {
        format!("Cannot start batch: {}", err)
    } else {
        format!("Batch aborted: {}", err)
    }
}

fn print_report(report: &BatchReport, json: bool) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(report).context("Failed to serialize batch report")?;
        println!("{}", text);
        return Ok(());
    }

    println!("{}", report.summary_text());
    if !report.output_paths.is_empty() {
        println!();
        println!("Output files:");
        for path in &report.output_paths {
            println!("  {}", path.display());
        }
    }

    let elapsed = report.finished_at - report.started_at;
    info!("Batch {} took {:.1}s", report.batch_id, elapsed.num_milliseconds() as f64 / 1000.0);
    Ok(())
}

fn print_options(engine: &EngineInfo) {
    let labels = |items: Vec<&str>| items.join(", ");
    println!("FFmpeg:        {} ({})", engine.version_label(), engine.ffmpeg_bin.display());
    if engine.hwaccels.is_empty() {
        println!("Hwaccels:      none detected");
    } else {
        println!("Hwaccels:      {}", engine.hwaccels.join(", "));
    }
    println!("GPU encoding:  {}", if engine.gpu_available { "available" } else { "not available" });
    println!("Formats:       {}", labels(OutputFormat::ALL.iter().map(|f| f.label()).collect()));
    println!("Codecs:        {}", labels(Codec::ALL.iter().map(|c| c.label()).collect()));
    println!("Resolutions:   {}", labels(Resolution::ALL.iter().map(|r| r.label()).collect()));
    println!("Frame rates:   {}", labels(Fps::ALL.iter().map(|f| f.label()).collect()));
    println!("Bitrate units: {}", labels(BitrateUnit::ALL.iter().map(|u| u.label()).collect()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use converter::report::FileReport;

    fn report_with(outcomes: Vec<ConversionOutcome>, cancelled: bool) -> BatchReport {
        let now = Utc::now();
        BatchReport {
            batch_id: uuid::Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            options: ConversionOptions::default(),
            files: outcomes
                .into_iter()
                .map(|outcome| FileReport {
                    input: PathBuf::from("in.mp4"),
                    display_name: "in.mp4".to_string(),
                    duration_secs: 0.0,
                    outcome,
                })
                .collect(),
            output_paths: Vec::new(),
            cancelled,
        }
    }

    #[test]
    fn test_exit_codes() {
        let ok = report_with(vec![ConversionOutcome::converted("Successfully converted: a.mp4", None)], false);
        assert_eq!(exit_code(&ok), 0);

        let partial = report_with(
            vec![
                ConversionOutcome::converted("Successfully converted: a.mp4", None),
                ConversionOutcome::failed("Error converting b.mp4: boom"),
            ],
            false,
        );
        assert_eq!(exit_code(&partial), EXIT_PARTIAL);

        let cancelled = report_with(vec![ConversionOutcome::cancelled("Cancelled: a.mp4")], true);
        assert_eq!(exit_code(&cancelled), EXIT_CANCELLED);
    }

    #[test]
    fn test_args_map_to_options() {
        let args = Args::parse_from([
            "vconvert", "--format", "MKV", "--codec", "HEVC (H.265)", "--bitrate", "5",
            "--bitrate-unit", "Mbps", "--resolution", "1920x1080 (1080p)", "movie.mp4",
        ]);
        let options = args.conversion_options();
        assert_eq!(options.format, "MKV");
        assert_eq!(options.codec, "HEVC (H.265)");
        assert_eq!(options.fps, SAME_AS_INPUT);
        assert!(options.resolve().is_ok());
        assert_eq!(args.inputs, vec![PathBuf::from("movie.mp4")]);
    }

    #[test]
    fn test_inputs_optional_only_for_listing() {
        assert!(Args::try_parse_from(["vconvert"]).is_err());
        assert!(Args::try_parse_from(["vconvert", "--list-options"]).is_ok());
    }

    #[test]
    fn test_batch_error_wording() {
        let settings = batch_error_message(&ConvertError::InvalidBitrateValue("abc".into()));
        assert!(settings.starts_with("Cannot start batch: "));

        let io = ConvertError::Io(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"));
        assert!(batch_error_message(&io).starts_with("Batch aborted: "));
    }

    #[test]
    fn test_gpu_flag() {
        let args = Args::parse_from(["vconvert", "--gpu", "disabled", "a.mp4"]);
        assert_eq!(args.gpu.map(GpuMode::from), Some(GpuMode::Disabled));
    }
}
