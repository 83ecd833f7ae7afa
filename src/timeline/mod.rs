//! Ordered segment list and its virtual timeline.

pub mod map;
pub mod registry;
pub mod segment;

pub use map::Timeline;
pub use registry::{GapPlacement, RegistryStats, SegmentRegistry, SplitPlacement};
pub use segment::{Segment, SegmentKind};
