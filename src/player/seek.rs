//! Debounced seek requests.
//!
//! Drag input produces a stream of targets; only the last one inside the
//! debounce window is applied. Explicit seeks bypass the window.

use crate::clock::Clock;
use std::time::{Duration, Instant};

/// Coalesces seek targets until they have been stable for `window`.
#[derive(Debug)]
pub struct SeekDebouncer<C: Clock> {
    clock: C,
    window: Duration,
    pending: Option<(u64, Instant)>,
}

impl<C: Clock> SeekDebouncer<C> {
    pub fn new(clock: C, window: Duration) -> Self {
        Self {
            clock,
            window,
            pending: None,
        }
    }

    /// Records a drag target. Replaces any earlier pending target and
    /// restarts the window.
    pub fn request(&mut self, target_ms: u64) {
        self.pending = Some((target_ms, self.clock.now()));
    }

    /// Returns the pending target once the window has elapsed since the last
    /// request, clearing it.
    pub fn take_due(&mut self) -> Option<u64> {
        let (target, requested_at) = self.pending?;
        if self.clock.now().duration_since(requested_at) >= self.window {
            self.pending = None;
            Some(target)
        } else {
            None
        }
    }

    /// Returns the pending target regardless of the window.
    pub fn take_now(&mut self) -> Option<u64> {
        self.pending.take().map(|(target, _)| target)
    }

    /// Drops any pending target.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
