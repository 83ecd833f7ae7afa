//! Reporting of per-unit failures.
//!
//! A failing unit never stops the pool; it is handed to an [`ErrorReporter`]
//! and tombstoned.

use crate::error::VoxreelError;
use std::sync::Mutex;

/// Trait for reporting unit failures.
pub trait ErrorReporter: Send + Sync {
    /// Reports that unit `index` failed.
    fn report(&self, index: usize, error: &VoxreelError);
}

/// Reporter that writes failures to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, index: usize, error: &VoxreelError) {
        log::warn!("chunk {}: {}", index, error);
    }
}

/// Reporter that keeps every failure in memory.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    failures: Mutex<Vec<(usize, String)>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `(index, message)` for every failure reported so far.
    pub fn failures(&self) -> Vec<(usize, String)> {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, index: usize, error: &VoxreelError) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((index, error.to_string()));
    }
}
