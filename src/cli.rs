//! Command-line interface for voxreel
//!
//! Provides argument parsing using clap derive macros.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Chunked text-to-speech and batch downloads with seekable playback
#[derive(Parser, Debug)]
#[command(
    name = "voxreel",
    version,
    about = "Chunked text-to-speech and batch downloads with seekable playback"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: lifecycle, -vv: per-chunk diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a duration string into milliseconds.
///
/// Supports any duration format accepted by `humantime`: bare numbers
/// (milliseconds), single-unit (`500ms`, `30s`, `5m`), and compound
/// (`1m30s`).
fn parse_millis(s: &str) -> Result<u64, String> {
    let s = s.trim();
    // Bare number → milliseconds
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(ms);
    }
    humantime::parse_duration(s)
        .map(|d: Duration| d.as_millis() as u64)
        .map_err(|e| e.to_string())
}

/// Options shared by every command that runs a production session
#[derive(Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// Input file, or `-` for stdin
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Number of chunks produced concurrently
    #[arg(long, short = 'w', value_name = "N")]
    pub workers: Option<usize>,

    /// Use silent placeholder audio instead of running the external tool
    #[arg(long)]
    pub dry_run: bool,

    /// Print events as JSON lines instead of a progress bar
    #[arg(long)]
    pub json: bool,

    /// Only produce the files, do not play them
    #[arg(long)]
    pub no_play: bool,

    /// Loop the timeline until interrupted
    #[arg(long = "loop")]
    pub loop_playback: bool,

    /// Start playback at this position (e.g. 90s, 1m30s)
    #[arg(long, value_name = "DURATION", value_parser = parse_millis)]
    pub start_at: Option<u64>,

    /// Concatenate all finished chunks into this file
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Copy every finished chunk into this directory
    #[arg(long, value_name = "DIR")]
    pub keep: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Speak a text file chunk by chunk, playing while later chunks render
    Speak {
        #[command(flatten)]
        session: SessionArgs,

        /// Maximum chunk length in characters
        #[arg(long, short = 'm', value_name = "CHARS")]
        max_chunk_len: Option<usize>,
    },

    /// Download every URL in a list, one chunk per line
    Download {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Show how input would be split into chunks
    Split {
        /// Input file, or `-` for stdin
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Maximum chunk length in characters
        #[arg(long, short = 'm', value_name = "CHARS")]
        max_chunk_len: Option<usize>,

        /// One chunk per line instead of text splitting
        #[arg(long)]
        lines: bool,

        /// Print chunks as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration (file, environment and defaults)
    Show,
    /// Print the configuration file path
    Path,
}
