//! Segment records held by the registry.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What a slot in the segment list holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    /// A produced artifact.
    Normal,
    /// Generated silence.
    Gap,
    /// One half of a split segment.
    SplitPart,
    /// Reserved for an artifact that has not arrived yet.
    Pending,
    /// Reserved for an artifact that will never arrive.
    Missing,
}

/// One entry in the ordered playback list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub path: Option<PathBuf>,
    pub duration_ms: Option<u64>,
    pub kind: SegmentKind,
    /// Work unit this slot was reserved for, if any.
    pub unit_index: Option<usize>,
}

impl Segment {
    /// An empty slot waiting for unit `unit_index`.
    pub fn pending(unit_index: usize) -> Self {
        Self {
            path: None,
            duration_ms: None,
            kind: SegmentKind::Pending,
            unit_index: Some(unit_index),
        }
    }

    /// A segment backed by a file.
    pub fn with_media(path: PathBuf, duration_ms: Option<u64>, kind: SegmentKind) -> Self {
        Self {
            path: Some(path),
            duration_ms,
            kind,
            unit_index: None,
        }
    }

    /// Has a file to play.
    pub fn is_playable(&self) -> bool {
        self.path.is_some()
    }

    /// Has both a file and a known duration.
    pub fn is_valid(&self) -> bool {
        self.path.is_some() && self.duration_ms.is_some()
    }
}
