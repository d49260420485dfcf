pub mod error;
pub mod options;
pub mod config;
pub mod command;
pub mod progress;
pub mod cancel;
pub mod runner;
pub mod probe;
pub mod ffmpeg;
pub mod scan;
pub mod report;
pub mod batch;

pub use error::{ConvertError, Result};
pub use options::{ConversionOptions, ResolvedOptions, SAME_AS_INPUT};
pub use config::{ConverterConfig, GpuMode};
pub use progress::{ChannelSink, NullSink, ProgressSink};
pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use ffmpeg::EngineInfo;
pub use batch::{BatchObserver, BatchOrchestrator, InputFile, NoopObserver};
pub use report::{BatchReport, ConversionOutcome, OutcomeStatus};
