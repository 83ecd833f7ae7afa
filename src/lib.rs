//! voxreel - Chunked text-to-speech and batch downloads with seekable playback
//!
//! Long input is split into chunks, produced on a bounded worker pool,
//! delivered strictly in order, and played back as one continuous timeline
//! while later chunks are still being produced.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod app;
pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod clock;
pub mod config;
pub mod controller;
pub mod defaults;
pub mod error;
pub mod pipeline;
pub mod player;
pub mod splitter;
pub mod storage;
pub mod timeline;

// Collaborator traits
pub use audio::codec::{AudioCodec, WavCodec};
pub use clock::{Clock, MockClock, SystemClock};
pub use pipeline::producer::{CommandProducer, MockProducer, Producer};
pub use player::device::{ClockDevice, MockDevice, OutputDevice};

// Pipeline
pub use pipeline::pool::{PoolConfig, PoolHandle, ProducerPool};
pub use pipeline::types::{Artifact, PipelineEvent, WorkUnit};
pub use pipeline::{CancellationToken, DeliveryBuffer, ErrorReporter};
pub use splitter::SplitMode;

// Timeline and playback
pub use controller::{ControllerEvent, PlaybackController};
pub use player::engine::{PlayerConfig, TimelinePlayer};
pub use player::state::{PlaybackState, PlayerEvent, PlayerState};
pub use timeline::{GapPlacement, Segment, SegmentKind, SegmentRegistry, SplitPlacement, Timeline};

// Error handling
pub use error::{Result, VoxreelError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
