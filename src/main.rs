use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::LevelFilter;
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use voxreel::app::{Job, print_summary, read_input, run_session};
use voxreel::cli::{Cli, Commands, ConfigAction, SessionArgs};
use voxreel::config::Config;
use voxreel::pipeline::CancellationToken;
use voxreel::splitter::{self, SplitMode};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Speak {
            session,
            max_chunk_len,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(max_len) = max_chunk_len {
                config.pipeline.max_chunk_len = max_len;
            }
            run_session_command(config, Job::Speak, session, cli.quiet).await?;
        }
        Commands::Download { session } => {
            let config = load_config(cli.config.as_deref())?;
            run_session_command(config, Job::Download, session, cli.quiet).await?;
        }
        Commands::Split {
            input,
            max_chunk_len,
            lines,
            json,
        } => {
            let config = load_config(cli.config.as_deref())?;
            handle_split_command(&config, &input, max_chunk_len, lines, json)?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "voxreel",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Level from `-q`/`-v`, overridable with `RUST_LOG`.
fn init_logging(quiet: bool, verbose: u8) {
    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn config_path(custom_path: Option<&Path>) -> Option<PathBuf> {
    custom_path.map(Path::to_path_buf).or_else(Config::default_path)
}

fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        // An explicit path must exist
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => match Config::default_path() {
            Some(path) => Config::load_or_default(&path)?,
            None => Config::default(),
        },
    };
    Ok(config.with_env_overrides())
}

async fn run_session_command(
    config: Config,
    job: Job,
    session: SessionArgs,
    quiet: bool,
) -> Result<()> {
    let interrupt = CancellationToken::new();
    let watcher = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            watcher.cancel();
        }
    });

    let summary =
        tokio::task::spawn_blocking(move || run_session(config, job, &session, interrupt, quiet))
            .await
            .context("session task failed")??;

    if !quiet {
        print_summary(&summary);
    }
    Ok(())
}

fn handle_split_command(
    config: &Config,
    input: &Path,
    max_chunk_len: Option<usize>,
    lines: bool,
    json: bool,
) -> Result<()> {
    let content = read_input(input)?;
    let mode = if lines { SplitMode::Lines } else { SplitMode::Text };
    let max_len = max_chunk_len.unwrap_or(config.pipeline.max_chunk_len);
    let units = splitter::split(&content, mode, max_len)?;

    for unit in &units {
        if json {
            println!("{}", serde_json::to_string(unit)?);
        } else {
            println!(
                "{} {}",
                format!("{:>4}", unit.index).dimmed(),
                unit.payload
            );
        }
    }
    Ok(())
}

fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => match config_path(custom_path) {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("Could not determine config directory"),
        },
    }
    Ok(())
}
