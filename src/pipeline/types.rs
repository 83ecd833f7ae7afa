//! Core data types flowing through the production pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One indexed piece of input submitted to the producer pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnit {
    /// 1-based position in the original input.
    pub index: usize,
    /// Text to synthesize, URL to download, etc.
    pub payload: String,
}

impl WorkUnit {
    pub fn new(index: usize, payload: impl Into<String>) -> Self {
        Self {
            index,
            payload: payload.into(),
        }
    }
}

/// Output of successfully processing a work unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Index of the unit that produced this artifact.
    pub index: usize,
    /// Owned file in the session's work area.
    pub path: PathBuf,
    /// Media duration, if the producer could determine it.
    pub duration_ms: Option<u64>,
}

/// Events emitted by the pipeline, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A unit's artifact is ready. `index` is strictly increasing.
    SegmentReady {
        index: usize,
        path: PathBuf,
        duration_ms: Option<u64>,
    },
    /// A unit will never produce an artifact.
    Missing { index: usize, reason: String },
    /// Resolved units so far. Follows every `SegmentReady` and `Missing`.
    Progress { emitted: usize, total: usize },
    /// Advisory message.
    Status { message: String },
    /// Per-unit or pipeline error. Does not stop delivery.
    Error {
        index: Option<usize>,
        message: String,
    },
    /// Every unit has been resolved and delivered. Sent exactly once.
    AllDone,
    /// Production was cancelled before all units were resolved.
    Cancelled { emitted: usize, total: usize },
}

impl PipelineEvent {
    /// Serialize event to a JSON line.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// True for events after which the pipeline sends nothing more.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineEvent::AllDone | PipelineEvent::Cancelled { .. }
        )
    }
}
