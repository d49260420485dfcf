use std::fs;
use std::path::{Path, PathBuf};
use chrono::{Local, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::cancel::CancelToken;
use crate::command::{CommandBuilder, ConversionRequest};
use crate::config::ConverterConfig;
use crate::error::{ConvertError, Result};
use crate::options::{ConversionOptions, ResolvedOptions};
use crate::probe::probe_duration;
use crate::progress::{BatchWeights, ProgressAggregator, ProgressSink, ProgressState};
use crate::report::{write_report, BatchReport, ConversionOutcome, FileReport};
use crate::runner::ProcessRunner;
use crate::scan::is_video_file;

/// A submitted input: where it lives and what to call it in messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    pub path: PathBuf,
    pub display_name: String,
}

impl InputFile {
    pub fn new(path: PathBuf) -> Self {
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { path, display_name }
    }
}

/// Per-file lifecycle notifications. Indices refer to the filtered list of valid inputs.
pub trait BatchObserver: Send {
    fn batch_started(&mut self, _files: &[InputFile]) {}
    fn file_started(&mut self, _index: usize, _file: &InputFile) {}
    fn file_finished(&mut self, _index: usize, _outcome: &ConversionOutcome) {}
}

/// Observer that ignores every notification
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

/// Runs a list of inputs through the engine one at a time
pub struct BatchOrchestrator {
    config: ConverterConfig,
    gpu_available: bool,
}

impl BatchOrchestrator {
    pub fn new(config: ConverterConfig, gpu_available: bool) -> Self {
        Self { config, gpu_available }
    }

    /// Convert `files` with one shared set of options.
    ///
    /// Returns `Err` only for batch-level problems (nothing to convert, bad options,
    /// unusable output directory). Per-file failures end up in the report.
    pub async fn run(
        &self,
        files: &[InputFile],
        options: &ConversionOptions,
        sink: &mut dyn ProgressSink,
        observer: &mut dyn BatchObserver,
        mut cancel: CancelToken,
    ) -> Result<BatchReport> {
        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();

        if files.is_empty() {
            return Err(ConvertError::EmptyBatch);
        }

        let valid: Vec<InputFile> = files
            .iter()
            .filter(|f| {
                let keep = is_video_file(&f.path, &self.config.video_extensions);
                if !keep {
                    info!("Skipping non-video file: {}", f.display_name);
                }
                keep
            })
            .cloned()
            .collect();
        if valid.is_empty() {
            return Err(ConvertError::EmptyBatch);
        }

        let resolved = options.resolve()?;
        debug!("Resolved options: {:?}", resolved);

        fs::create_dir_all(&self.config.output_dir)?;
        let output_dir = fs::canonicalize(&self.config.output_dir)
            .unwrap_or_else(|_| self.config.output_dir.clone());

        info!("Batch {}: converting {} file(s) into {}", batch_id, valid.len(), output_dir.display());
        observer.batch_started(&valid);

        let runner = ProcessRunner::new(&self.config.ffmpeg_bin, self.config.diagnostic_tail_lines);
        let builder = CommandBuilder::new(self.gpu_available);
        let state = ProgressState::new(BatchWeights::uniform(valid.len()));
        let mut aggregator = ProgressAggregator::new(state, sink, self.config.monotonic_progress);

        let mut reports = Vec::with_capacity(valid.len());
        for (index, file) in valid.iter().enumerate() {
            observer.file_started(index, file);

            let (duration_secs, outcome) = if cancel.is_cancelled() {
                (0.0, ConversionOutcome::cancelled(format!("Cancelled: {}", file.display_name)))
            } else {
                let step = FileStep {
                    index,
                    file,
                    options: resolved,
                    output_dir: &output_dir,
                    runner: &runner,
                    builder: &builder,
                };
                self.convert_one(step, &mut aggregator, &mut cancel).await
            };

            aggregator.complete(index);
            observer.file_finished(index, &outcome);
            reports.push(FileReport {
                input: file.path.clone(),
                display_name: file.display_name.clone(),
                duration_secs,
                outcome,
            });
        }

        let output_paths = reports
            .iter()
            .filter_map(|r| r.outcome.output_path.clone())
            .collect();
        let report = BatchReport {
            batch_id,
            started_at,
            finished_at: Utc::now(),
            options: options.clone(),
            files: reports,
            output_paths,
            cancelled: cancel.is_cancelled(),
        };
        info!(
            "Batch {} finished: {}/{} converted",
            batch_id,
            report.success_count(),
            report.total()
        );

        if self.config.write_report {
            match write_report(&output_dir, &report) {
                Ok(path) => debug!("Wrote batch report to {}", path.display()),
                Err(e) => warn!("Failed to write batch report: {}", e),
            }
        }

        Ok(report)
    }

    async fn convert_one(
        &self,
        step: FileStep<'_>,
        aggregator: &mut ProgressAggregator<'_>,
        cancel: &mut CancelToken,
    ) -> (f64, ConversionOutcome) {
        let name = &step.file.display_name;

        if !step.file.path.exists() {
            let err = ConvertError::InputNotFound { path: step.file.path.clone() };
            error!("{}", err);
            return (0.0, ConversionOutcome::failed(err.to_string()));
        }

        let duration = probe_duration(&self.config.ffmpeg_bin, &step.file.path).await;
        if cancel.is_cancelled() {
            info!("Conversion of {} cancelled before start", name);
            return (duration, ConversionOutcome::cancelled(format!("Cancelled: {}", name)));
        }

        let request = ConversionRequest::new(
            &step.file.path,
            step.options,
            step.output_dir,
            Local::now().naive_local(),
        )
        .with_unique_output();
        let args = step.builder.build_convert_command(&request);
        let output_path = request.output_path();
        info!("Converting {} -> {}", name, request.output_filename);

        let index = step.index;
        let mut forward = |fraction: f64| {
            aggregator.update(index, fraction);
        };

        let outcome = match step.runner.run(&args, duration, &mut forward, cancel).await {
            Ok(run) => {
                debug!("{}: {} progress line(s) of {} output line(s)", name, run.progress_lines, run.lines);
                let verified = output_path.exists().then(|| output_path.clone());
                if verified.is_none() {
                    warn!("Engine reported success but {} was not created", output_path.display());
                }
                ConversionOutcome::converted(format!("Successfully converted: {}", request.output_filename), verified)
            }
            Err(ConvertError::Cancelled) => {
                info!("Conversion of {} cancelled", name);
                remove_partial_output(&output_path);
                ConversionOutcome::cancelled(format!("Cancelled: {}", name))
            }
            Err(e) => {
                error!("Error converting {}: {}", name, e);
                ConversionOutcome::failed(format!("Error converting {}: {}", name, e))
            }
        };

        (duration, outcome)
    }
}

/// Everything needed to convert one file that does not change between files
struct FileStep<'a> {
    index: usize,
    file: &'a InputFile,
    options: ResolvedOptions,
    output_dir: &'a Path,
    runner: &'a ProcessRunner,
    builder: &'a CommandBuilder,
}

fn remove_partial_output(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to remove partial output {}: {}", path.display(), e);
        }
    }
}
