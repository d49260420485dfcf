use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use crate::cancel::CancelToken;
use crate::error::{ConvertError, Result};
use crate::progress::{local_fraction, parse_progress_line, ProgressSink};

/// Lifecycle of one engine process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Spawned,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Lines read from the combined output
    pub lines: usize,
    /// Lines that carried a progress marker
    pub progress_lines: usize,
    /// Last local fraction emitted, if any
    pub last_fraction: Option<f64>,
}

/// Most recent non-progress output lines, kept for failure messages
#[derive(Debug)]
struct DiagnosticTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl DiagnosticTail {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, line: &str) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    fn text(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

/// Spawns the engine and follows it to a terminal state
pub struct ProcessRunner {
    bin: PathBuf,
    tail_lines: usize,
}

impl ProcessRunner {
    pub fn new(bin: &Path, tail_lines: usize) -> Self {
        Self {
            bin: bin.to_path_buf(),
            tail_lines,
        }
    }

    /// Run the engine with `args` until it exits or `cancel` fires.
    ///
    /// When `duration` is positive, every progress line yields one fraction for `sink`.
    /// With a zero duration nothing is emitted; the caller reports completion itself.
    pub async fn run(
        &self,
        args: &[String],
        duration: f64,
        sink: &mut dyn ProgressSink,
        cancel: &mut CancelToken,
    ) -> Result<RunReport> {
        debug!("Executing FFmpeg: {} {}", self.bin.display(), args.join(" "));

        let mut child = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ConvertError::EngineSpawnFailure {
                bin: self.bin.clone(),
                source,
            })?;
        let mut state = RunState::Spawned;
        debug!("FFmpeg state: {:?} (pid {:?})", state, child.id());

        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let readers = [spawn_line_reader(stdout, tx.clone()), spawn_line_reader(stderr, tx)];
        state = transition(state, RunState::Streaming);

        let mut tail = DiagnosticTail::new(self.tail_lines);
        let mut report = RunReport {
            lines: 0,
            progress_lines: 0,
            last_fraction: None,
        };

        loop {
            tokio::select! {
                line = rx.recv() => {
                    let Some(line) = line else { break };
                    report.lines += 1;
                    match parse_progress_line(&line) {
                        Some(elapsed) => {
                            report.progress_lines += 1;
                            if let Some(fraction) = local_fraction(elapsed, duration) {
                                sink.accept(fraction);
                                report.last_fraction = Some(fraction);
                            }
                        }
                        None => tail.push(&line),
                    }
                }
                _ = cancel.cancelled() => return Err(kill_cancelled(&mut child, state).await),
            }
        }

        for reader in readers {
            let read_result = reader
                .await
                .map_err(|e| ConvertError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
            if let Err(e) = read_result {
                transition(state, RunState::Failed);
                return Err(ConvertError::Io(e));
            }
        }

        // both pipes can close before the process exits
        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };
        let status = match waited {
            Some(status) => status.map_err(|e| {
                transition(state, RunState::Failed);
                ConvertError::Io(e)
            })?,
            None => return Err(kill_cancelled(&mut child, state).await),
        };

        if status.success() {
            transition(state, RunState::Completed);
            Ok(report)
        } else {
            transition(state, RunState::Failed);
            Err(ConvertError::EngineNonZeroExit {
                code: status.code().unwrap_or(-1),
                diagnostic: tail.text(),
            })
        }
    }
}

fn transition(from: RunState, to: RunState) -> RunState {
    debug!("FFmpeg state: {:?} -> {:?}", from, to);
    to
}

async fn kill_cancelled(child: &mut Child, state: RunState) -> ConvertError {
    transition(state, RunState::Cancelled);
    if let Err(e) = child.kill().await {
        warn!("Failed to kill FFmpeg process: {}", e);
    }
    ConvertError::Cancelled
}

fn missing_pipe(name: &str) -> ConvertError {
    ConvertError::Io(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        format!("failed to capture FFmpeg {}", name),
    ))
}

/// Forward lines from one output pipe into the combined channel.
///
/// The engine redraws its stats line with `\r`, so both `\r` and `\n` end a line.
fn spawn_line_reader<R>(reader: R, tx: mpsc::UnboundedSender<String>) -> JoinHandle<std::io::Result<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut segments = BufReader::new(reader).split(b'\r');
        while let Some(segment) = segments.next_segment().await? {
            for line in String::from_utf8_lossy(&segment).split('\n') {
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                if tx.send(line.to_string()).is_err() {
                    return Ok(());
                }
            }
        }
        Ok(())
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use crate::progress::NullSink;
    use std::time::Duration;

    /// Run `script` through `/bin/sh` so the test never executes a freshly written file
    async fn run_script(script: &str, duration: f64, sink: &mut dyn ProgressSink) -> Result<RunReport> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.sh");
        std::fs::write(&path, script).unwrap();
        let runner = ProcessRunner::new(Path::new("/bin/sh"), 20);
        let args = vec![path.to_string_lossy().to_string()];
        runner.run(&args, duration, sink, &mut CancelToken::never()).await
    }

    #[test]
    fn test_diagnostic_tail_keeps_last_lines() {
        let mut tail = DiagnosticTail::new(2);
        tail.push("a");
        tail.push("b");
        tail.push("c");
        assert_eq!(tail.text(), "b\nc");

        let mut none = DiagnosticTail::new(0);
        none.push("a");
        assert_eq!(none.text(), "");
    }

    #[tokio::test]
    async fn test_progress_is_emitted_per_marker_line() {
        let script = r#"printf 'Input #0, mov,mp4\n' >&2
printf 'frame=   10 fps=0.0 time=00:00:02.50 bitrate=N/A speed=5x\r' >&2
printf 'frame=   20 fps=0.0 time=00:00:05.00 bitrate=N/A speed=5x\r' >&2
printf 'frame=   40 fps=0.0 time=00:00:12.00 bitrate=N/A speed=5x\n' >&2
exit 0"#;
        let mut seen = Vec::new();
        let mut sink = |f: f64| seen.push(f);
        let report = run_script(script, 10.0, &mut sink).await.unwrap();

        assert_eq!(report.progress_lines, 3);
        assert_eq!(seen, vec![0.25, 0.5, 1.0]);
    }

    #[tokio::test]
    async fn test_zero_duration_emits_nothing() {
        let mut count = 0;
        let mut sink = |_f: f64| count += 1;
        let report = run_script("echo 'frame=  1 time=00:00:01.00' >&2; exit 0", 0.0, &mut sink)
            .await
            .unwrap();
        assert_eq!(report.progress_lines, 1);
        assert_eq!(report.last_fraction, None);
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_code_and_tail() {
        let script = "echo 'first line' >&2; echo 'frame= 1 time=00:00:01.00' >&2; echo 'Unknown encoder' >&2; exit 3";
        let err = run_script(script, 10.0, &mut NullSink).await.unwrap_err();
        match err {
            ConvertError::EngineNonZeroExit { code, diagnostic } => {
                assert_eq!(code, 3);
                assert_eq!(diagnostic, "first line\nUnknown encoder");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stdout_lines_are_part_of_the_stream() {
        let err = run_script("echo 'on stdout'; echo 'on stderr' >&2; exit 1", 0.0, &mut NullSink)
            .await
            .unwrap_err();
        let ConvertError::EngineNonZeroExit { diagnostic, .. } = err else {
            panic!("expected non-zero exit");
        };
        assert!(diagnostic.contains("on stdout"));
        assert!(diagnostic.contains("on stderr"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_failure() {
        let runner = ProcessRunner::new(Path::new("/nonexistent/ffmpeg-binary"), 20);
        let err = runner
            .run(&[], 0.0, &mut NullSink, &mut CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::EngineSpawnFailure { .. }));
    }

    #[tokio::test]
    async fn test_cancel_kills_running_process() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("engine.sh");
        std::fs::write(&script, "echo 'frame= 1 time=00:00:01.00' >&2; exec sleep 30").unwrap();
        let runner = ProcessRunner::new(Path::new("/bin/sh"), 20);
        let args = vec![script.to_string_lossy().to_string()];
        let (handle, mut token) = cancel_pair();

        let cancel_later = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            handle.cancel();
        });
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            runner.run(&args, 10.0, &mut NullSink, &mut token),
        )
        .await
        .expect("runner should stop after cancellation");
        cancel_later.await.unwrap();
        assert!(matches!(result, Err(ConvertError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_after_pipes_close_still_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("engine.sh");
        // closes both pipes, then keeps running
        std::fs::write(&script, "exec >/dev/null 2>&1; exec sleep 30").unwrap();
        let runner = ProcessRunner::new(Path::new("/bin/sh"), 20);
        let args = vec![script.to_string_lossy().to_string()];
        let (handle, mut token) = cancel_pair();

        let cancel_later = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            handle.cancel();
        });
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            runner.run(&args, 10.0, &mut NullSink, &mut token),
        )
        .await
        .expect("runner should stop after cancellation");
        cancel_later.await.unwrap();
        assert!(matches!(result, Err(ConvertError::Cancelled)));
    }
}
