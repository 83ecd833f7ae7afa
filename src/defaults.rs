//! Default configuration constants for voxreel.
//!
//! Shared between the TOML config, the CLI and the library builders so the
//! same numbers are used everywhere.

/// Default number of concurrent producer workers.
pub const WORKERS: usize = 4;

/// Default maximum chunk length in characters.
///
/// Most speech services accept a few thousand characters per request; 500
/// keeps the first chunk short so playback can start early.
pub const MAX_CHUNK_LEN: usize = 500;

/// Grace period for in-flight jobs after cancellation, in milliseconds.
pub const SHUTDOWN_GRACE_MS: u64 = 3000;

/// How long drag-style seek input is coalesced before being applied.
pub const SEEK_DEBOUNCE_MS: u64 = 150;

/// How long device position updates are ignored after a seek.
pub const SEEK_GUARD_MS: u64 = 900;

/// Sample rate for generated audio (silence, test artifacts).
pub const SAMPLE_RATE: u32 = 16000;

/// Minimum digits used when naming artifact files.
pub const INDEX_PAD_WIDTH: usize = 4;

/// Prefix for per-session temporary directories.
pub const TEMP_PREFIX: &str = "voxreel-";

/// Extension of artifacts written by producers.
pub const ARTIFACT_EXTENSION: &str = "wav";

/// Driver poll interval while waiting for completions.
pub const POLL_INTERVAL_MS: u64 = 50;

/// Default speech command. `{text}` and `{output}` are substituted per chunk.
pub const SPEECH_COMMAND: &[&str] = &["espeak-ng", "-w", "{output}", "{text}"];

/// Default download command. `{text}` is the URL, `{output}` the target file.
pub const DOWNLOAD_COMMAND: &[&str] = &[
    "yt-dlp",
    "-x",
    "--audio-format",
    "wav",
    "-o",
    "{output}",
    "{text}",
];
