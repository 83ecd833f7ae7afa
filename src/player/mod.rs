//! Continuous playback over a list of segment files.

pub mod device;
pub mod engine;
pub mod seek;
pub mod state;

pub use device::{ClockDevice, DeviceEvent, MockDevice, OutputDevice};
pub use engine::{PlayerConfig, TimelinePlayer};
pub use seek::SeekDebouncer;
pub use state::{PlaybackState, PlayerEvent, PlayerState};
