//! Audio output devices.
//!
//! The player drives exactly one source at a time through [`OutputDevice`].
//! [`ClockDevice`] is a headless device whose position follows a clock;
//! [`MockDevice`] is scripted by tests.

use crate::audio::codec::AudioCodec;
use crate::clock::Clock;
use crate::error::{Result, VoxreelError};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Something the device reports back to the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The current source played to its end.
    EndOfMedia,
    /// The current source could not be decoded.
    Error(String),
    /// Periodic position update, local to the current source.
    Position(u64),
}

/// Single-source audio output.
pub trait OutputDevice: Send {
    /// Opens `path` as the current source, positioned at 0 and paused.
    fn set_source(&mut self, path: &Path) -> Result<()>;

    fn play(&mut self);

    fn pause(&mut self);

    /// Stops playback and rewinds the current source.
    fn stop(&mut self);

    /// Moves within the current source.
    fn seek(&mut self, local_ms: u64);

    fn position_ms(&self) -> u64;

    /// Drains events produced since the last call.
    fn poll_events(&mut self) -> Vec<DeviceEvent>;
}

/// Device that "plays" by letting a clock run over the source's duration.
pub struct ClockDevice<C: Clock> {
    clock: C,
    codec: Arc<dyn AudioCodec>,
    source: Option<PathBuf>,
    duration_ms: u64,
    base_ms: u64,
    started_at: Option<Instant>,
    ended: bool,
}

impl<C: Clock> ClockDevice<C> {
    pub fn new(clock: C, codec: Arc<dyn AudioCodec>) -> Self {
        Self {
            clock,
            codec,
            source: None,
            duration_ms: 0,
            base_ms: 0,
            started_at: None,
            ended: false,
        }
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

impl<C: Clock> OutputDevice for ClockDevice<C> {
    fn set_source(&mut self, path: &Path) -> Result<()> {
        let duration_ms = self
            .codec
            .duration_ms(path)
            .map_err(|e| VoxreelError::Device {
                message: format!("cannot open {}: {}", path.display(), e),
            })?;
        self.source = Some(path.to_path_buf());
        self.duration_ms = duration_ms;
        self.base_ms = 0;
        self.started_at = None;
        self.ended = false;
        Ok(())
    }

    fn play(&mut self) {
        if self.source.is_some() && self.started_at.is_none() && !self.ended {
            self.started_at = Some(self.clock.now());
        }
    }

    fn pause(&mut self) {
        self.base_ms = self.position_ms();
        self.started_at = None;
    }

    fn stop(&mut self) {
        self.base_ms = 0;
        self.started_at = None;
        self.ended = false;
    }

    fn seek(&mut self, local_ms: u64) {
        self.base_ms = local_ms.min(self.duration_ms);
        self.ended = false;
        if self.started_at.is_some() {
            self.started_at = Some(self.clock.now());
        }
    }

    fn position_ms(&self) -> u64 {
        let elapsed = self
            .started_at
            .map(|t| self.clock.now().duration_since(t).as_millis() as u64)
            .unwrap_or(0);
        (self.base_ms + elapsed).min(self.duration_ms)
    }

    fn poll_events(&mut self) -> Vec<DeviceEvent> {
        if self.started_at.is_none() {
            return Vec::new();
        }
        let position = self.position_ms();
        if position >= self.duration_ms {
            self.base_ms = self.duration_ms;
            self.started_at = None;
            self.ended = true;
            vec![DeviceEvent::Position(position), DeviceEvent::EndOfMedia]
        } else {
            vec![DeviceEvent::Position(position)]
        }
    }
}

#[derive(Debug, Default)]
struct MockDeviceState {
    source: Option<PathBuf>,
    sources: Vec<PathBuf>,
    seeks: Vec<u64>,
    playing: bool,
    position_ms: u64,
    queued: VecDeque<DeviceEvent>,
    failing: HashSet<PathBuf>,
}

/// Scriptable device for tests.
///
/// Clones share state: keep one handle in the test and give another to the
/// player, then push events and inspect what the player asked for.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<MockDeviceState>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockDeviceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes `set_source` fail for `path`.
    pub fn fail_source(&self, path: impl Into<PathBuf>) {
        self.lock().failing.insert(path.into());
    }

    pub fn push_event(&self, event: DeviceEvent) {
        self.lock().queued.push_back(event);
    }

    /// Queues the end of the current source.
    pub fn finish_source(&self) {
        self.push_event(DeviceEvent::EndOfMedia);
    }

    /// Queues a position update and moves the reported position.
    pub fn report_position(&self, local_ms: u64) {
        let mut state = self.lock();
        state.position_ms = local_ms;
        state.queued.push_back(DeviceEvent::Position(local_ms));
    }

    /// Every source opened so far, in order.
    pub fn sources(&self) -> Vec<PathBuf> {
        self.lock().sources.clone()
    }

    pub fn current_source(&self) -> Option<PathBuf> {
        self.lock().source.clone()
    }

    /// Every seek applied so far, local to the source at the time.
    pub fn seeks(&self) -> Vec<u64> {
        self.lock().seeks.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }
}

impl OutputDevice for MockDevice {
    fn set_source(&mut self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        if state.failing.contains(path) {
            return Err(VoxreelError::Device {
                message: format!("cannot open {}", path.display()),
            });
        }
        state.source = Some(path.to_path_buf());
        state.sources.push(path.to_path_buf());
        state.position_ms = 0;
        state.playing = false;
        Ok(())
    }

    fn play(&mut self) {
        let mut state = self.lock();
        state.playing = state.source.is_some();
    }

    fn pause(&mut self) {
        self.lock().playing = false;
    }

    fn stop(&mut self) {
        let mut state = self.lock();
        state.playing = false;
        state.position_ms = 0;
    }

    fn seek(&mut self, local_ms: u64) {
        let mut state = self.lock();
        state.seeks.push(local_ms);
        state.position_ms = local_ms;
    }

    fn position_ms(&self) -> u64 {
        self.lock().position_ms
    }

    fn poll_events(&mut self) -> Vec<DeviceEvent> {
        self.lock().queued.drain(..).collect()
    }
}
