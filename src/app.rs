//! Session runner behind `voxreel speak` and `voxreel download`.
//!
//! Orchestrates the complete flow:
//! split → produce (worker pool) → deliver in order → play
//!
//! The session itself is synchronous; the binary runs it on a blocking task
//! and trips the interrupt token on Ctrl+C.

use crate::audio::codec::{AudioCodec, WavCodec};
use crate::cli::SessionArgs;
use crate::clock::SystemClock;
use crate::config::{CommandSettings, Config};
use crate::controller::{ControllerEvent, PlaybackController};
use crate::defaults;
use crate::error::{Result, VoxreelError};
use crate::pipeline::cancel::CancellationToken;
use crate::pipeline::producer::{CommandProducer, MockProducer, Producer};
use crate::pipeline::types::PipelineEvent;
use crate::player::device::ClockDevice;
use crate::player::state::{PlayerEvent, PlayerState};
use crate::splitter::SplitMode;
use crate::timeline::registry::RegistryStats;
use crossbeam_channel::{Receiver, unbounded};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// What kind of session to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Speak,
    Download,
}

impl Job {
    fn split_mode(self) -> SplitMode {
        match self {
            Job::Speak => SplitMode::Text,
            Job::Download => SplitMode::Lines,
        }
    }

    fn command<'a>(self, config: &'a Config) -> &'a CommandSettings {
        match self {
            Job::Speak => &config.producer,
            Job::Download => &config.downloader,
        }
    }
}

/// How the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub stats: RegistryStats,
    pub interrupted: bool,
}

/// Reads the whole input, `-` meaning stdin.
pub fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        return std::io::read_to_string(std::io::stdin()).map_err(VoxreelError::from);
    }
    fs::read_to_string(path).map_err(|e| VoxreelError::Other(format!("{}: {}", path.display(), e)))
}

/// Progress output on stderr: a bar, or JSON lines on stdout.
struct Reporter {
    json: bool,
    quiet: bool,
    bar: Option<ProgressBar>,
}

impl Reporter {
    fn new(json: bool, quiet: bool, total: usize) -> Self {
        let bar = (!json && !quiet).then(|| {
            let bar = ProgressBar::new(total as u64);
            bar.set_style(
                // SAFETY: hardcoded template string, always valid
                #[allow(clippy::expect_used)]
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .expect("hardcoded progress bar template")
                    .progress_chars("#>-"),
            );
            bar
        });
        Self { json, quiet, bar }
    }

    fn line(&self, message: String) {
        match &self.bar {
            Some(bar) => bar.println(message),
            None if !self.quiet && !self.json => eprintln!("{}", message),
            None => {}
        }
    }

    fn handle(&self, event: &ControllerEvent) {
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => log::warn!("could not serialize event: {}", e),
            }
            return;
        }
        match event {
            ControllerEvent::Pipeline(PipelineEvent::Progress { emitted, .. }) => {
                if let Some(bar) = &self.bar {
                    bar.set_position(*emitted as u64);
                }
            }
            ControllerEvent::Pipeline(PipelineEvent::Error { index, message }) => {
                let what = index.map_or_else(|| "pipeline".to_string(), |i| format!("chunk {}", i));
                self.line(format!("{} {}: {}", "warning".yellow(), what, message));
            }
            ControllerEvent::Pipeline(PipelineEvent::Cancelled { emitted, total }) => {
                self.line(format!(
                    "{} after {}/{} chunks",
                    "cancelled".yellow(),
                    emitted,
                    total
                ));
            }
            ControllerEvent::Player(PlayerEvent::SegmentChanged { index }) => {
                if let Some(bar) = &self.bar {
                    bar.set_message(format!("playing segment {}", index + 1));
                }
            }
            ControllerEvent::Player(PlayerEvent::Status { message }) => {
                log::info!("player: {}", message);
            }
            _ => {}
        }
    }

    fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

fn build_producer(
    settings: &CommandSettings,
    codec: Arc<dyn AudioCodec>,
    dry_run: bool,
) -> Result<Arc<dyn Producer>> {
    if dry_run {
        return Ok(Arc::new(MockProducer::new()));
    }
    Ok(Arc::new(
        CommandProducer::new(settings.command.clone())?.with_codec(codec),
    ))
}

/// Runs one session to completion, or until `interrupt` is cancelled.
pub fn run_session(
    mut config: Config,
    job: Job,
    args: &SessionArgs,
    interrupt: CancellationToken,
    quiet: bool,
) -> Result<SessionSummary> {
    if let Some(workers) = args.workers {
        config.pipeline.workers = workers;
    }
    if args.loop_playback {
        config.player.loop_enabled = true;
    }
    if args.no_play {
        config.player.auto_play = false;
    }
    config.validate()?;

    let content = read_input(&args.input)?;
    let settings = job.command(&config).clone();
    let codec: Arc<dyn AudioCodec> = Arc::new(WavCodec::new(defaults::SAMPLE_RATE));
    let producer = build_producer(&settings, codec.clone(), args.dry_run)?;

    let (events_tx, events_rx) = unbounded();
    let device = ClockDevice::new(SystemClock, codec.clone());
    let mut controller = PlaybackController::new(&config, Box::new(device), SystemClock, codec)
        .with_observer(events_tx)
        .with_extension(&settings.extension);

    let total = controller.start(&content, job.split_mode(), producer)?;
    if !quiet && !args.json {
        eprintln!(
            "{} {} chunk(s) with {} worker(s)",
            "voxreel".green().bold(),
            total,
            config.pipeline.workers.min(total)
        );
    }

    let reporter = Reporter::new(args.json, quiet, total);
    let mut pending_seek = args.start_at;
    let poll = Duration::from_millis(defaults::POLL_INTERVAL_MS);
    let mut interrupted = false;

    loop {
        if interrupt.is_cancelled() {
            interrupted = true;
            controller.stop_all();
            drain(&events_rx, &reporter);
            break;
        }

        controller.pump();
        drain(&events_rx, &reporter);

        if let Some(target) = pending_seek
            && start_at_due(
                controller.player().state(),
                controller.player().total_ms(),
                controller.is_production_done(),
                target,
            )
        {
            controller.player_mut().seek_to(target);
            pending_seek = None;
        }

        let playing = matches!(
            controller.player().state(),
            PlayerState::Playing | PlayerState::Loading
        );
        if controller.is_production_done() && !playing {
            break;
        }
        thread::sleep(poll);
    }
    reporter.finish();

    if let Some(path) = &args.export {
        let written = controller.export(path)?;
        if !quiet && !args.json {
            eprintln!(
                "{} {} ({})",
                "exported".green(),
                path.display(),
                humantime::format_duration(Duration::from_millis(written))
            );
        }
    }
    if let Some(dir) = &args.keep {
        keep_segments(&controller, dir)?;
    }

    let stats = controller.statistics();
    controller.clear();
    Ok(SessionSummary { stats, interrupted })
}

/// A `--start-at` target is applied once playback runs and the timeline
/// reaches it, or once production is over and nothing more will arrive.
fn start_at_due(state: PlayerState, total_ms: u64, production_done: bool, target: u64) -> bool {
    state == PlayerState::Playing && (target < total_ms || production_done)
}

fn drain(events: &Receiver<ControllerEvent>, reporter: &Reporter) {
    for event in events.try_iter() {
        reporter.handle(&event);
    }
}

/// Copies every finished chunk out of the session's temporary directory.
fn keep_segments(controller: &PlaybackController<SystemClock>, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    for segment in controller.registry().valid() {
        let Some(path) = segment.path else { continue };
        let Some(name) = path.file_name() else { continue };
        fs::copy(&path, dir.join(name))?;
    }
    log::info!("kept segments in {}", dir.display());
    Ok(())
}

/// Prints the end-of-session summary to stderr.
pub fn print_summary(summary: &SessionSummary) {
    let stats = &summary.stats;
    let produced = stats.normal + stats.split_parts;
    let headline = if summary.interrupted {
        "interrupted".yellow().to_string()
    } else if stats.missing > 0 {
        "finished with failures".yellow().to_string()
    } else {
        "done".green().to_string()
    };
    eprintln!(
        "{}: {} produced, {} failed, {} pending, {} total",
        headline,
        produced,
        stats.missing,
        stats.pending,
        humantime::format_duration(Duration::from_millis(stats.total_ms))
    );
}
