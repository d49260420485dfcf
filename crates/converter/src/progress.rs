//! Progress parsing and batch-wide aggregation.
//!
//! The engine prints stats lines such as
//! `frame=  120 fps= 48 q=28.0 size=     256kB time=00:00:05.00 bitrate= 419.4kbits/s speed=1.9x`.
//! [`parse_progress_line`] turns one such line into elapsed seconds, and
//! [`ProgressAggregator`] folds per-file fractions into one value for the whole batch.

use tokio::sync::mpsc::UnboundedSender;

/// Receives progress fractions in `[0, 1]`
pub trait ProgressSink: Send {
    fn accept(&mut self, fraction: f64);
}

impl<F> ProgressSink for F
where
    F: FnMut(f64) + Send,
{
    fn accept(&mut self, fraction: f64) {
        self(fraction)
    }
}

/// Forwards fractions into a channel consumed by a presentation layer
pub struct ChannelSink(pub UnboundedSender<f64>);

impl ProgressSink for ChannelSink {
    fn accept(&mut self, fraction: f64) {
        // receiver gone means nobody is watching; conversion carries on
        let _ = self.0.send(fraction);
    }
}

/// Sink that discards everything
pub struct NullSink;

impl ProgressSink for NullSink {
    fn accept(&mut self, _fraction: f64) {}
}

/// Parse `HH:MM:SS.ss` into seconds
pub fn parse_timestamp(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let all_numeric = parts
        .iter()
        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit() || c == '.'));
    if !all_numeric {
        return None;
    }

    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Elapsed encoded seconds from one line of engine output.
///
/// Only stats lines count: the line must carry `frame=` and a well-formed
/// `time=` value. `time=N/A` and negative times yield `None`.
pub fn parse_progress_line(line: &str) -> Option<f64> {
    if !line.contains("frame=") {
        return None;
    }
    let start = line.find("time=")? + "time=".len();
    let value = line[start..].split_whitespace().next()?;
    parse_timestamp(value)
}

/// Local fraction for a file given elapsed and probed durations.
/// `None` when the duration is unknown (zero or negative).
pub fn local_fraction(elapsed: f64, duration: f64) -> Option<f64> {
    if duration > 0.0 {
        Some(clamp_fraction(elapsed / duration))
    } else {
        None
    }
}

fn clamp_fraction(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Per-request weights, fixed at batch start
#[derive(Debug, Clone, PartialEq)]
pub struct BatchWeights(Vec<f64>);

impl BatchWeights {
    /// `count` equal weights of `1/count`. The last weight absorbs rounding so the sum is 1.0.
    pub fn uniform(count: usize) -> Self {
        if count == 0 {
            return BatchWeights(Vec::new());
        }
        let weight = 1.0 / count as f64;
        let mut weights = vec![weight; count];
        let others: f64 = weights[..count - 1].iter().sum();
        weights[count - 1] = 1.0 - others;
        BatchWeights(weights)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> f64 {
        self.0.get(index).copied().unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }
}

/// Local fraction of every request in the batch
#[derive(Debug, Clone)]
pub struct ProgressState {
    weights: BatchWeights,
    fractions: Vec<f64>,
}

impl ProgressState {
    pub fn new(weights: BatchWeights) -> Self {
        let fractions = vec![0.0; weights.len()];
        Self { weights, fractions }
    }

    /// Store a local fraction; out-of-range indices are ignored
    pub fn set(&mut self, index: usize, fraction: f64) {
        if let Some(slot) = self.fractions.get_mut(index) {
            *slot = clamp_fraction(fraction);
        }
    }

    /// Σ weight × fraction
    pub fn aggregate(&self) -> f64 {
        let sum: f64 = self
            .fractions
            .iter()
            .enumerate()
            .map(|(i, f)| self.weights.get(i) * f)
            .sum();
        clamp_fraction(sum)
    }
}

/// Folds per-file progress into one batch fraction and forwards it to a sink
pub struct ProgressAggregator<'a> {
    state: ProgressState,
    sink: &'a mut dyn ProgressSink,
    monotonic: bool,
    last_emitted: f64,
}

impl<'a> ProgressAggregator<'a> {
    pub fn new(state: ProgressState, sink: &'a mut dyn ProgressSink, monotonic: bool) -> Self {
        Self {
            state,
            sink,
            monotonic,
            last_emitted: 0.0,
        }
    }

    /// Record the active request's local fraction and emit the batch fraction
    pub fn update(&mut self, index: usize, fraction: f64) -> f64 {
        self.state.set(index, fraction);
        self.emit()
    }

    /// Mark a request as finished, whatever its outcome
    pub fn complete(&mut self, index: usize) -> f64 {
        self.update(index, 1.0)
    }

    fn emit(&mut self) -> f64 {
        let mut overall = self.state.aggregate();
        if self.monotonic {
            overall = overall.max(self.last_emitted);
        }
        self.last_emitted = overall;
        self.sink.accept(overall);
        overall
    }
}
