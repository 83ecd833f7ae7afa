use crate::defaults;
use crate::error::{Result, VoxreelError};
use crate::pipeline::pool::PoolConfig;
use crate::player::engine::PlayerConfig;
use crate::timeline::registry::SplitPlacement;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineSettings,
    pub player: PlayerSettings,
    pub producer: CommandSettings,
    pub downloader: CommandSettings,
    pub storage: StorageSettings,
    pub edit: EditSettings,
}

/// Chunking and worker pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    pub workers: usize,
    pub max_chunk_len: usize,
    pub shutdown_grace_ms: u64,
}

/// Timeline player
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerSettings {
    pub seek_debounce_ms: u64,
    pub seek_guard_ms: u64,
    pub loop_enabled: bool,
    /// Start playing as soon as the first chunk is ready.
    pub auto_play: bool,
}

/// External tool run once per chunk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CommandSettings {
    /// Program and arguments. `{text}`, `{output}` and `{index}` are
    /// substituted per chunk.
    pub command: Vec<String>,
    /// Extension of the files the command writes.
    pub extension: String,
}

/// Session working area
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    pub temp_prefix: String,
    /// Parent directory for session folders. System temp dir when unset.
    pub dir: Option<PathBuf>,
}

/// Segment editing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct EditSettings {
    pub split_placement: SplitPlacement,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineSettings::default(),
            player: PlayerSettings::default(),
            producer: CommandSettings::speech(),
            downloader: CommandSettings::download(),
            storage: StorageSettings::default(),
            edit: EditSettings::default(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: defaults::WORKERS,
            max_chunk_len: defaults::MAX_CHUNK_LEN,
            shutdown_grace_ms: defaults::SHUTDOWN_GRACE_MS,
        }
    }
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            seek_debounce_ms: defaults::SEEK_DEBOUNCE_MS,
            seek_guard_ms: defaults::SEEK_GUARD_MS,
            loop_enabled: false,
            auto_play: true,
        }
    }
}

impl CommandSettings {
    fn from_template(template: &[&str]) -> Self {
        Self {
            command: template.iter().map(|s| s.to_string()).collect(),
            extension: defaults::ARTIFACT_EXTENSION.to_string(),
        }
    }

    pub fn speech() -> Self {
        Self::from_template(defaults::SPEECH_COMMAND)
    }

    pub fn download() -> Self {
        Self::from_template(defaults::DOWNLOAD_COMMAND)
    }
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            extension: defaults::ARTIFACT_EXTENSION.to_string(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            temp_prefix: defaults::TEMP_PREFIX.to_string(),
            dir: None,
        }
    }
}

/// Parses a boolean environment value.
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        // A section that sets only the extension keeps the stock command.
        if config.producer.command.is_empty() {
            config.producer.command = CommandSettings::speech().command;
        }
        if config.downloader.command.is_empty() {
            config.downloader.command = CommandSettings::download().command;
        }
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                log::debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXREEL_WORKERS → pipeline.workers
    /// - VOXREEL_MAX_CHUNK_LEN → pipeline.max_chunk_len
    /// - VOXREEL_LOOP → player.loop_enabled
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(workers) = std::env::var("VOXREEL_WORKERS")
            && !workers.is_empty()
        {
            match workers.trim().parse() {
                Ok(n) => self.pipeline.workers = n,
                Err(_) => log::warn!("ignoring VOXREEL_WORKERS={:?}: not a number", workers),
            }
        }

        if let Ok(max_len) = std::env::var("VOXREEL_MAX_CHUNK_LEN")
            && !max_len.is_empty()
        {
            match max_len.trim().parse() {
                Ok(n) => self.pipeline.max_chunk_len = n,
                Err(_) => log::warn!("ignoring VOXREEL_MAX_CHUNK_LEN={:?}: not a number", max_len),
            }
        }

        if let Ok(looping) = std::env::var("VOXREEL_LOOP")
            && !looping.is_empty()
        {
            match parse_flag(&looping) {
                Some(enabled) => self.player.loop_enabled = enabled,
                None => log::warn!("ignoring VOXREEL_LOOP={:?}: not a boolean", looping),
            }
        }

        self
    }

    /// Checks values that have no sensible interpretation.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.workers == 0 {
            return Err(VoxreelError::ConfigInvalidValue {
                key: "pipeline.workers".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.pipeline.max_chunk_len == 0 {
            return Err(VoxreelError::ConfigInvalidValue {
                key: "pipeline.max_chunk_len".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        for (key, settings) in [("producer", &self.producer), ("downloader", &self.downloader)] {
            if settings.command.is_empty() {
                return Err(VoxreelError::ConfigInvalidValue {
                    key: format!("{}.command", key),
                    message: "command must not be empty".to_string(),
                });
            }
            if !settings.command.iter().any(|arg| arg.contains("{output}")) {
                return Err(VoxreelError::ConfigInvalidValue {
                    key: format!("{}.command", key),
                    message: "command must reference {output}".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.pipeline.workers,
            grace: Duration::from_millis(self.pipeline.shutdown_grace_ms),
            ..PoolConfig::default()
        }
    }

    pub fn player_config(&self) -> PlayerConfig {
        PlayerConfig {
            seek_debounce: Duration::from_millis(self.player.seek_debounce_ms),
            seek_guard: Duration::from_millis(self.player.seek_guard_ms),
            loop_enabled: self.player.loop_enabled,
        }
    }

    /// Serialized form, as printed by `config show`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| VoxreelError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxreel/config.toml on Linux
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("voxreel").join("config.toml"))
    }
}
