use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::Parser;
use converter::{
    batch::{BatchObserver, BatchOrchestrator, InputFile},
    cancel::{cancel_pair, CancelHandle},
    config::ConverterConfig,
    ffmpeg::EngineInfo,
    progress::ChannelSink,
    options::{ConversionOptions, SAME_AS_INPUT},
    report::{BatchReport, ConversionOutcome, OutcomeStatus},
    scan,
};
use crossterm::event::{KeyCode, KeyModifiers};
use humansize::{format_size, DECIMAL};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io::stdout;
use std::path::PathBuf;
use std::time::Duration;
use sysinfo::System;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Everything the batch task tells the screen
#[derive(Debug)]
enum UiEvent {
    BatchStarted(Vec<InputFile>),
    FileStarted(usize),
    FileFinished(usize, ConversionOutcome),
    Finished(std::result::Result<BatchReport, String>),
}

/// Forwards batch notifications to the UI thread
struct ChannelObserver {
    tx: UnboundedSender<UiEvent>,
}

impl BatchObserver for ChannelObserver {
    fn batch_started(&mut self, files: &[InputFile]) {
        let _ = self.tx.send(UiEvent::BatchStarted(files.to_vec()));
    }

    fn file_started(&mut self, index: usize, _file: &InputFile) {
        let _ = self.tx.send(UiEvent::FileStarted(index));
    }

    fn file_finished(&mut self, index: usize, outcome: &ConversionOutcome) {
        let _ = self.tx.send(UiEvent::FileFinished(index, outcome.clone()));
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FileState {
    Pending,
    Running,
    Done(ConversionOutcome),
}

struct FileRow {
    file: InputFile,
    state: FileState,
    output_bytes: Option<u64>,
}

struct App {
    rows: Vec<FileRow>,
    overall: f64,
    system: System,
    table_state: TableState,
    should_quit: bool,
    cancel_requested: bool,
    started_at: DateTime<Local>,
    finished: Option<std::result::Result<BatchReport, String>>,
    output_dir: PathBuf,
    gpu_available: bool,
    engine_version: String,
}

impl App {
    fn new(output_dir: PathBuf, gpu_available: bool, engine_version: String) -> Self {
        Self {
            rows: Vec::new(),
            overall: 0.0,
            system: System::new(),
            table_state: TableState::default(),
            should_quit: false,
            cancel_requested: false,
            started_at: Local::now(),
            finished: None,
            output_dir,
            gpu_available,
            engine_version,
        }
    }

    fn apply(&mut self, event: UiEvent) {
        match event {
            UiEvent::BatchStarted(files) => {
                self.rows = files
                    .into_iter()
                    .map(|file| FileRow { file, state: FileState::Pending, output_bytes: None })
                    .collect();
            }
            UiEvent::FileStarted(index) => {
                if let Some(row) = self.rows.get_mut(index) {
                    row.state = FileState::Running;
                    self.table_state.select(Some(index));
                }
            }
            UiEvent::FileFinished(index, outcome) => {
                if let Some(row) = self.rows.get_mut(index) {
                    row.output_bytes = outcome
                        .output_path
                        .as_ref()
                        .and_then(|p| std::fs::metadata(p).ok())
                        .map(|m| m.len());
                    row.state = FileState::Done(outcome);
                }
            }
            UiEvent::Finished(result) => self.finished = Some(result),
        }
    }

    fn drain(&mut self, rx: &mut UnboundedReceiver<UiEvent>) {
        while let Ok(event) = rx.try_recv() {
            self.apply(event);
        }
    }

    /// Only the latest batch fraction matters for the gauge
    fn drain_progress(&mut self, rx: &mut UnboundedReceiver<f64>) {
        while let Ok(fraction) = rx.try_recv() {
            self.overall = fraction;
        }
    }

    fn refresh(&mut self) {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
    }

    fn is_running(&self) -> bool {
        self.finished.is_none()
    }

    /// First press cancels a running batch; once it has stopped, the next one quits
    fn on_quit_key(&mut self, cancel: &CancelHandle) {
        if self.is_running() {
            if !self.cancel_requested {
                cancel.cancel();
                self.cancel_requested = true;
            }
        } else {
            self.should_quit = true;
        }
    }

    fn count_by_status(&self, status: OutcomeStatus) -> usize {
        self.rows
            .iter()
            .filter(|r| matches!(&r.state, FileState::Done(o) if o.status == status))
            .count()
    }
}

/// Live monitor for a batch video conversion
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Video files or directories to convert
    #[arg(required = true)]
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

    /// Descend into subdirectories of directory inputs
    #[arg(long)]
    recursive: bool,

    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,
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

fn main() -> Result<()> {
    let args = Args::parse();

    let mut cfg = ConverterConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(dir) = &args.output_dir {
        cfg.output_dir = dir.clone();
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let engine = runtime.block_on(EngineInfo::detect(&cfg));
    let files = scan::collect_inputs(&args.inputs, args.recursive);
    let options = args.conversion_options();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<f64>();
    let (cancel_handle, cancel_token) = cancel_pair();
    let mut app = App::new(cfg.output_dir.clone(), engine.gpu_available, engine.version_label());
    let orchestrator = BatchOrchestrator::new(cfg, engine.gpu_available);

    runtime.spawn(async move {
        let mut sink = ChannelSink(progress_tx);
        let mut observer = ChannelObserver { tx: tx.clone() };
        let result = orchestrator
            .run(&files, &options, &mut sink, &mut observer, cancel_token)
            .await
            .map_err(|e| e.to_string());
        let _ = tx.send(UiEvent::Finished(result));
    });

    // Setup terminal
    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = stdout();
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    loop {
        app.drain(&mut rx);
        app.drain_progress(&mut progress_rx);
        app.refresh();

        terminal.draw(|f| ui(f, &mut app))?;

        if crossterm::event::poll(Duration::from_millis(100))? {
            if let crossterm::event::Event::Key(key) = crossterm::event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.on_quit_key(&cancel_handle),
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        app.on_quit_key(&cancel_handle)
                    }
                    _ => {}
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen
    )?;

    match app.finished.take() {
        Some(Ok(report)) => println!("{}", report.summary_text()),
        Some(Err(message)) => eprintln!("{}", message),
        None => {}
    }

    Ok(())
}

fn ui(f: &mut Frame, app: &mut App) {
    let size = f.size();

    if size.height < 10 || size.width < 80 {
        let error_msg = Paragraph::new("Terminal too small! Please resize to at least 80x10.")
            .block(Block::default().borders(Borders::ALL).title("Error"))
            .style(Style::default().fg(Color::Red));
        f.render_widget(error_msg, size);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .split(size);

    render_top_bar(f, app, chunks[0]);
    render_file_table(f, app, chunks[1]);
    render_status_bar(f, app, chunks[2]);
}

fn render_top_bar(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(50),
            Constraint::Percentage(25),
            Constraint::Percentage(25),
        ])
        .split(area);

    let overall = clamp_percent(app.overall * 100.0);
    let overall_gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Batch"))
        .gauge_style(Style::default().fg(Color::Yellow))
        .percent(overall as u16)
        .label(format!("{:.1}%", overall));
    f.render_widget(overall_gauge, chunks[0]);

    let cpu_usage = clamp_percent(app.system.global_cpu_usage() as f64);
    let cpu_gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("CPU"))
        .gauge_style(Style::default().fg(Color::Cyan))
        .percent(cpu_usage as u16)
        .label(format!("{:.1}%", cpu_usage));
    f.render_widget(cpu_gauge, chunks[1]);

    let total_memory = app.system.total_memory();
    let memory_percent = if total_memory == 0 {
        0.0
    } else {
        clamp_percent(app.system.used_memory() as f64 / total_memory as f64 * 100.0)
    };
    let memory_gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Memory"))
        .gauge_style(Style::default().fg(Color::Green))
        .percent(memory_percent as u16)
        .label(format!("{:.1}%", memory_percent));
    f.render_widget(memory_gauge, chunks[2]);
}

fn render_file_table(f: &mut Frame, app: &mut App, area: Rect) {
    let header = Row::new(vec!["ST", "FILE", "OUTPUT", "MESSAGE"])
        .style(Style::default().add_modifier(Modifier::BOLD))
        .height(1);

    let rows: Vec<Row> = if app.rows.is_empty() {
        vec![Row::new(vec![
            "-".to_string(),
            "Waiting for batch to start".to_string(),
            "-".to_string(),
            "-".to_string(),
        ])]
    } else {
        app.rows
            .iter()
            .map(|row| {
                let (status, color, message) = match &row.state {
                    FileState::Pending => ("PEND", Color::Gray, "-".to_string()),
                    FileState::Running => ("RUN", Color::Yellow, "converting".to_string()),
                    FileState::Done(outcome) => {
                        let first_line = outcome.message.lines().next().unwrap_or_default();
                        match outcome.status {
                            OutcomeStatus::Converted => ("OK", Color::Green, first_line.to_string()),
                            OutcomeStatus::Failed => ("FAIL", Color::Red, first_line.to_string()),
                            OutcomeStatus::Cancelled => ("STOP", Color::Magenta, first_line.to_string()),
                        }
                    }
                };
                let size = row
                    .output_bytes
                    .map(|b| format_size(b, DECIMAL))
                    .unwrap_or_else(|| "-".to_string());

                Row::new(vec![
                    status.to_string(),
                    truncate_string(&row.file.display_name, 50),
                    size,
                    truncate_string(&message, 60),
                ])
                .style(Style::default().fg(color))
                .height(1)
            })
            .collect()
    };

    let widths = [
        Constraint::Length(5),
        Constraint::Percentage(35),
        Constraint::Length(10),
        Constraint::Percentage(55),
    ];

    let done = app.rows.iter().filter(|r| matches!(r.state, FileState::Done(_))).count();
    let title = format!("Files ({}/{})", done, app.rows.len());

    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().add_modifier(Modifier::BOLD))
        .column_spacing(1);

    f.render_stateful_widget(table, area, &mut app.table_state);
}

fn render_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let state = match &app.finished {
        None if app.cancel_requested => "Cancelling".to_string(),
        None => "Running".to_string(),
        Some(Ok(report)) => format!("{}/{} converted", report.success_count(), report.total()),
        Some(Err(message)) => truncate_string(message, 40),
    };
    let elapsed = (Local::now() - app.started_at).num_seconds();
    let keys = if app.is_running() { "q=cancel" } else { "q=quit" };

    let status_text = format!(
        "{} | Converted: {} | Failed: {} | Cancelled: {} | FFmpeg {} | GPU: {} | {}s | Out: {} | {}",
        state,
        app.count_by_status(OutcomeStatus::Converted),
        app.count_by_status(OutcomeStatus::Failed),
        app.count_by_status(OutcomeStatus::Cancelled),
        app.engine_version,
        if app.gpu_available { "yes" } else { "no" },
        elapsed,
        truncate_string(&app.output_dir.display().to_string(), 30),
        keys
    );

    let paragraph = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .wrap(ratatui::widgets::Wrap { trim: true });

    f.render_widget(paragraph, area);
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
