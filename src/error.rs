//! Error types for voxreel.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxreelError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Input errors
    #[error("Nothing to process: input is empty")]
    EmptyInput,

    // Production errors
    #[error("Chunk {index} failed: {message}")]
    Production { index: usize, message: String },

    #[error("Producer tool not found: {tool}")]
    ProducerToolNotFound { tool: String },

    #[error("Production cancelled")]
    Cancelled,

    #[error("Delivery error: {message}")]
    Delivery { message: String },

    // Fatal session errors
    #[error("Failed to create working area: {message}")]
    WorkArea { message: String },

    #[error("Failed to start worker pool: {message}")]
    PoolStart { message: String },

    // Codec errors
    #[error("Audio codec error: {message}")]
    Codec { message: String },

    // Registry errors
    #[error("Segment index {index} out of range (have {len})")]
    SegmentOutOfRange { index: usize, len: usize },

    #[error("Segment {index} has no media yet")]
    SegmentNotReady { index: usize },

    #[error("Invalid split point {at_ms}ms for segment of {duration_ms}ms")]
    InvalidSplitPoint { at_ms: u64, duration_ms: u64 },

    #[error("Invalid segment order: {message}")]
    InvalidPermutation { message: String },

    #[error("No active session")]
    NoSession,

    // Playback errors
    #[error("Output device error: {message}")]
    Device { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxreelError>;

impl From<hound::Error> for VoxreelError {
    fn from(err: hound::Error) -> Self {
        VoxreelError::Codec {
            message: err.to_string(),
        }
    }
}
