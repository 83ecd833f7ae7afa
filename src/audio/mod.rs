//! Audio file handling.

pub mod codec;

pub use codec::{AudioCodec, WavCodec};
