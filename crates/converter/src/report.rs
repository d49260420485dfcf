use std::fs;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::error::Result;
use crate::options::ConversionOptions;

/// Terminal state of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Converted,
    Failed,
    Cancelled,
}

/// Per-file result: `(success, message, output_path)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOutcome {
    pub status: OutcomeStatus,
    pub success: bool,
    pub message: String,
    /// Present only when the converted file was found on disk afterwards
    pub output_path: Option<PathBuf>,
}

impl ConversionOutcome {
    pub fn converted(message: impl Into<String>, output_path: Option<PathBuf>) -> Self {
        Self {
            status: OutcomeStatus::Converted,
            success: true,
            message: message.into(),
            output_path,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            success: false,
            message: message.into(),
            output_path: None,
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Cancelled,
            success: false,
            message: message.into(),
            output_path: None,
        }
    }
}

/// One processed input and what happened to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub input: PathBuf,
    pub display_name: String,
    /// Probed duration in seconds; 0.0 when unknown
    pub duration_secs: f64,
    pub outcome: ConversionOutcome,
}

/// Consolidated result of a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub options: ConversionOptions,
    /// Same length and order as the valid inputs
    pub files: Vec<FileReport>,
    /// Outputs verified to exist, absolute
    pub output_paths: Vec<PathBuf>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.files.len()
    }

    pub fn success_count(&self) -> usize {
        self.files.iter().filter(|f| f.outcome.success).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.success_count() == self.total()
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &ConversionOutcome> {
        self.files.iter().map(|f| &f.outcome)
    }

    /// Count line, blank line, then every file's message in input order
    pub fn summary_text(&self) -> String {
        let mut text = format!(
            "Conversion completed: {}/{} files converted successfully\n\n",
            self.success_count(),
            self.total()
        );
        let messages: Vec<&str> = self.outcomes().map(|o| o.message.as_str()).collect();
        text.push_str(&messages.join("\n"));
        text
    }
}

/// Path of the JSON report for `batch_id` inside `dir`
pub fn report_path(dir: &Path, batch_id: &Uuid) -> PathBuf {
    dir.join(format!("batch-{}.report.json", batch_id))
}

/// Write the report as pretty JSON next to the converted files
pub fn write_report(dir: &Path, report: &BatchReport) -> Result<PathBuf> {
    let path = report_path(dir, &report.batch_id);
    let json = serde_json::to_string_pretty(report)?;
    fs::write(&path, json)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, outcome: ConversionOutcome) -> FileReport {
        FileReport {
            input: PathBuf::from(format!("/in/{}", name)),
            display_name: name.to_string(),
            duration_secs: 10.0,
            outcome,
        }
    }

    fn sample_report() -> BatchReport {
        let now = Utc::now();
        BatchReport {
            batch_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            options: ConversionOptions::default(),
            files: vec![
                file("movie.mp4", ConversionOutcome::converted(
                    "Successfully converted: movie_20240309_140507.mp4",
                    Some(PathBuf::from("/out/movie_20240309_140507.mp4")),
                )),
                file("clip.avi", ConversionOutcome::failed(
                    "Error converting clip.avi: FFmpeg error code 1\nInvalid data found when processing input",
                )),
            ],
            output_paths: vec![PathBuf::from("/out/movie_20240309_140507.mp4")],
            cancelled: false,
        }
    }

    #[test]
    fn test_summary_text() {
        let report = sample_report();
        assert_eq!(report.success_count(), 1);
        assert!(!report.all_succeeded());
        assert_eq!(
            report.summary_text(),
            "Conversion completed: 1/2 files converted successfully\n\n\
             Successfully converted: movie_20240309_140507.mp4\n\
             Error converting clip.avi: FFmpeg error code 1\n\
             Invalid data found when processing input"
        );
    }

    #[test]
    fn test_outcome_constructors() {
        assert!(ConversionOutcome::converted("ok", None).success);
        let failed = ConversionOutcome::failed("bad");
        assert!(!failed.success);
        assert_eq!(failed.status, OutcomeStatus::Failed);
        let cancelled = ConversionOutcome::cancelled("stop");
        assert!(!cancelled.success);
        assert_eq!(cancelled.status, OutcomeStatus::Cancelled);
    }

    #[test]
    fn test_write_report_json() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample_report();
        let path = write_report(dir.path(), &report).unwrap();
        assert_eq!(path, report_path(dir.path(), &report.batch_id));

        let json = fs::read_to_string(&path).unwrap();
        assert!(json.contains("\"status\": \"converted\""));
        let parsed: BatchReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }
}
