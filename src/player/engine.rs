//! The virtual timeline player.
//!
//! Presents an ordered list of segment files as one continuous timeline.
//! Only one segment is ever open on the device; crossing a boundary always
//! means switching the device source. The player is driven by `tick()`,
//! which applies due seeks and consumes the device's event feed.

use crate::clock::Clock;
use crate::defaults;
use crate::error::{Result, VoxreelError};
use crate::player::device::{DeviceEvent, OutputDevice};
use crate::player::seek::SeekDebouncer;
use crate::player::state::{PlaybackState, PlayerEvent, PlayerState};
use crate::timeline::map::Timeline;
use crate::timeline::segment::Segment;
use crossbeam_channel::Sender;
use std::time::{Duration, Instant};

/// Timing and looping options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerConfig {
    pub seek_debounce: Duration,
    pub seek_guard: Duration,
    pub loop_enabled: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            seek_debounce: Duration::from_millis(defaults::SEEK_DEBOUNCE_MS),
            seek_guard: Duration::from_millis(defaults::SEEK_GUARD_MS),
            loop_enabled: false,
        }
    }
}

pub struct TimelinePlayer<C: Clock + Clone> {
    device: Box<dyn OutputDevice>,
    clock: C,
    config: PlayerConfig,
    debouncer: SeekDebouncer<C>,
    guard_until: Option<Instant>,
    segments: Vec<Segment>,
    timeline: Timeline,
    state: PlayerState,
    current: Option<usize>,
    local_ms: u64,
    last_position: Option<u64>,
    /// Device errors since the last segment that played normally.
    failures: usize,
    /// More segments are expected; running out means waiting, not stopping.
    awaiting_media: bool,
    events: Option<Sender<PlayerEvent>>,
}

impl<C: Clock + Clone> TimelinePlayer<C> {
    pub fn new(device: Box<dyn OutputDevice>, clock: C, config: PlayerConfig) -> Self {
        let debouncer = SeekDebouncer::new(clock.clone(), config.seek_debounce);
        Self {
            device,
            clock,
            config,
            debouncer,
            guard_until: None,
            segments: Vec::new(),
            timeline: Timeline::default(),
            state: PlayerState::Idle,
            current: None,
            local_ms: 0,
            last_position: None,
            failures: 0,
            awaiting_media: false,
            events: None,
        }
    }

    pub fn with_event_sender(mut self, sender: Sender<PlayerEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn total_ms(&self) -> u64 {
        self.timeline.total_ms()
    }

    pub fn current_segment(&self) -> Option<usize> {
        self.current
    }

    /// Global position on the timeline.
    pub fn position_ms(&self) -> u64 {
        self.current
            .and_then(|i| self.timeline.to_global(i, self.local_ms))
            .unwrap_or(0)
    }

    pub fn playback_state(&self) -> PlaybackState {
        PlaybackState {
            current_segment_index: self.current,
            position_within_segment_ms: self.local_ms,
            is_playing: self.state.is_playing(),
            is_seeking: self.debouncer.is_pending() || self.guard_active(),
            loop_enabled: self.config.loop_enabled,
        }
    }

    pub fn loop_enabled(&self) -> bool {
        self.config.loop_enabled
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.config.loop_enabled = enabled;
    }

    /// Whether running out of segments should wait for more instead of
    /// stopping. Set while production is still running.
    pub fn set_awaiting_media(&mut self, awaiting: bool) {
        self.awaiting_media = awaiting;
        if !awaiting && self.state == PlayerState::Loading && self.current.is_some() {
            if self.config.loop_enabled && self.play_from(0, true) {
                return;
            }
            self.finish_at_end();
        }
    }

    /// Replaces the segment list without interrupting playback.
    pub fn set_segments(&mut self, segments: Vec<Segment>) {
        let current_path = self
            .current
            .and_then(|i| self.segments.get(i))
            .and_then(|s| s.path.clone());

        self.timeline = Timeline::from_durations(segments.iter().map(|s| s.duration_ms));
        self.segments = segments;

        if let Some(path) = current_path {
            match self
                .segments
                .iter()
                .position(|s| s.path.as_ref() == Some(&path))
            {
                Some(index) => {
                    if self.current != Some(index) {
                        self.current = Some(index);
                        self.emit(PlayerEvent::SegmentChanged { index });
                    }
                }
                None => {
                    self.current = None;
                    self.local_ms = 0;
                    if matches!(self.state, PlayerState::Playing | PlayerState::Paused) {
                        self.device.stop();
                        self.status("current segment was removed, playback stopped");
                        self.set_state(PlayerState::Stopped);
                    }
                }
            }
        }

        if self.state == PlayerState::Loading {
            let start = self.current.map_or(0, |i| i + 1);
            if !self.play_from(start, false) {
                log::debug!("still waiting for playable media");
            }
        }
    }

    pub fn play(&mut self) {
        match self.state {
            PlayerState::Playing | PlayerState::Loading => {}
            PlayerState::Paused if self.current.is_some() => {
                self.device.play();
                self.set_state(PlayerState::Playing);
            }
            _ => {
                self.failures = 0;
                if !self.play_from(0, false) {
                    self.current = None;
                    self.local_ms = 0;
                    self.status("waiting for media");
                    self.set_state(PlayerState::Loading);
                }
            }
        }
    }

    pub fn pause(&mut self) {
        match self.state {
            PlayerState::Playing => {
                self.device.pause();
                self.local_ms = self.device.position_ms();
                self.set_state(PlayerState::Paused);
            }
            PlayerState::Loading => self.set_state(PlayerState::Idle),
            _ => {}
        }
    }

    pub fn toggle(&mut self) {
        if matches!(self.state, PlayerState::Playing | PlayerState::Loading) {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Stops and rewinds to the start of the timeline.
    pub fn stop(&mut self) {
        self.device.stop();
        self.debouncer.cancel();
        self.guard_until = None;
        self.current = None;
        self.local_ms = 0;
        self.emit_position();
        self.set_state(PlayerState::Stopped);
    }

    /// Stops and forgets all segments.
    pub fn reset(&mut self) {
        self.stop();
        self.segments.clear();
        self.timeline = Timeline::default();
        self.last_position = None;
        self.failures = 0;
        self.awaiting_media = false;
        self.state = PlayerState::Idle;
    }

    /// Drag-style seek: coalesced until the debounce window passes.
    pub fn seek_drag(&mut self, global_ms: u64) {
        self.debouncer.request(global_ms);
    }

    /// Explicit seek: applied immediately, dropping any pending drag target.
    pub fn seek_to(&mut self, global_ms: u64) {
        self.debouncer.cancel();
        self.apply_seek(global_ms);
    }

    /// Applies due seeks and handles device events.
    pub fn tick(&mut self) {
        if let Some(target) = self.debouncer.take_due() {
            self.apply_seek(target);
        }

        for event in self.device.poll_events() {
            match event {
                DeviceEvent::Position(local_ms) => {
                    if self.guard_active() || self.state != PlayerState::Playing {
                        continue;
                    }
                    self.local_ms = local_ms;
                    if local_ms > 0 {
                        self.failures = 0;
                    }
                    self.emit_position();
                }
                DeviceEvent::EndOfMedia => {
                    self.failures = 0;
                    self.on_segment_end();
                }
                DeviceEvent::Error(message) => {
                    log::warn!("playback error on segment {:?}: {}", self.current, message);
                    self.status(&format!("playback error: {}", message));
                    self.failures += 1;
                    // Only give up once the segment list is final.
                    if !self.awaiting_media && self.failures >= self.segments.len().max(1) {
                        self.device.stop();
                        self.status("every segment failed to play, stopping");
                        self.set_state(PlayerState::Stopped);
                    } else {
                        self.on_segment_end();
                    }
                }
            }
        }
    }

    fn guard_active(&self) -> bool {
        self.guard_until
            .is_some_and(|until| self.clock.now() < until)
    }

    fn apply_seek(&mut self, global_ms: u64) {
        let Some((index, local_ms)) = self.timeline.locate(global_ms) else {
            log::debug!("seek to {}ms ignored, timeline is empty", global_ms);
            return;
        };
        if self.current != Some(index) || self.state == PlayerState::Stopped {
            if let Err(e) = self.open(index) {
                log::warn!("seek target segment {} failed to open: {}", index, e);
                self.status(&format!("cannot open segment {}: {}", index + 1, e));
                return;
            }
            if self.state == PlayerState::Playing {
                self.device.play();
            }
        }
        self.device.seek(local_ms);
        self.local_ms = local_ms;
        self.guard_until = Some(self.clock.now() + self.config.seek_guard);
        self.emit_position();

        if matches!(
            self.state,
            PlayerState::Idle | PlayerState::Stopped | PlayerState::Loading
        ) {
            self.set_state(PlayerState::Paused);
        }
    }

    /// Opens segment `index` on the device at local position 0.
    fn open(&mut self, index: usize) -> Result<()> {
        let path = self.segments[index]
            .path
            .clone()
            .ok_or(VoxreelError::SegmentNotReady { index })?;
        self.device.set_source(&path)?;
        self.local_ms = 0;
        if self.current != Some(index) {
            self.current = Some(index);
            self.emit(PlayerEvent::SegmentChanged { index });
        }
        Ok(())
    }

    /// Starts playing the first playable segment at or after `start`,
    /// wrapping to the front when `wrap` is set. Segments that fail to open
    /// are skipped; each is tried at most once.
    fn play_from(&mut self, start: usize, wrap: bool) -> bool {
        let len = self.segments.len();
        for step in 0..len {
            let mut index = start + step;
            if index >= len {
                if !wrap {
                    break;
                }
                index -= len;
            }
            if !self.segments[index].is_playable() {
                continue;
            }
            match self.open(index) {
                Ok(()) => {
                    self.device.play();
                    self.emit_position();
                    self.set_state(PlayerState::Playing);
                    return true;
                }
                Err(e) => {
                    log::warn!("segment {} failed to open: {}", index, e);
                    self.status(&format!("skipping segment {}: {}", index + 1, e));
                }
            }
        }
        false
    }

    fn on_segment_end(&mut self) {
        let Some(current) = self.current else {
            return;
        };
        let wrap = self.config.loop_enabled && !self.awaiting_media;
        if self.play_from(current + 1, wrap) {
            return;
        }
        if self.awaiting_media {
            self.local_ms = self.timeline.duration_of(current).unwrap_or(self.local_ms);
            self.set_state(PlayerState::Loading);
            return;
        }
        if wrap {
            self.status("no segment could be played, stopping");
        }
        self.finish_at_end();
    }

    /// Stops with the position left at the end of the current segment.
    fn finish_at_end(&mut self) {
        self.device.stop();
        if let Some(current) = self.current {
            self.local_ms = self.timeline.duration_of(current).unwrap_or(self.local_ms);
        }
        self.emit_position();
        self.set_state(PlayerState::Stopped);
    }

    fn set_state(&mut self, state: PlayerState) {
        let was_playing = self.state.is_playing();
        self.state = state;
        if state.is_playing() != was_playing {
            self.emit(PlayerEvent::PlaybackStateChanged {
                is_playing: state.is_playing(),
            });
        }
    }

    fn emit_position(&mut self) {
        let ms = self.position_ms();
        if self.last_position != Some(ms) {
            self.last_position = Some(ms);
            self.emit(PlayerEvent::PositionChanged { ms });
        }
    }

    fn status(&mut self, message: &str) {
        self.emit(PlayerEvent::Status {
            message: message.to_string(),
        });
    }

    fn emit(&mut self, event: PlayerEvent) {
        if let Some(sender) = &self.events
            && sender.send(event).is_err()
        {
            log::debug!("player event receiver dropped");
            self.events = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::player::device::MockDevice;
    use crate::timeline::segment::SegmentKind;
    use crossbeam_channel::{Receiver, unbounded};
    use std::path::PathBuf;

    struct Harness {
        player: TimelinePlayer<MockClock>,
        device: MockDevice,
        clock: MockClock,
        events: Receiver<PlayerEvent>,
    }

    impl Harness {
        fn new(durations: &[u64]) -> Self {
            let device = MockDevice::new();
            let clock = MockClock::new();
            let (tx, rx) = unbounded();
            let mut player = TimelinePlayer::new(
                Box::new(device.clone()),
                clock.clone(),
                PlayerConfig::default(),
            )
            .with_event_sender(tx);
            player.set_segments(segments(durations));
            Self {
                player,
                device,
                clock,
                events: rx,
            }
        }

        fn drain(&self) -> Vec<PlayerEvent> {
            self.events.try_iter().collect()
        }

        fn positions(&self) -> Vec<u64> {
            self.drain()
                .into_iter()
                .filter_map(|e| match e {
                    PlayerEvent::PositionChanged { ms } => Some(ms),
                    _ => None,
                })
                .collect()
        }
    }

    fn path(i: usize) -> PathBuf {
        PathBuf::from(format!("seg_{}.wav", i))
    }

    fn segments(durations: &[u64]) -> Vec<Segment> {
        durations
            .iter()
            .enumerate()
            .map(|(i, &ms)| Segment::with_media(path(i), Some(ms), SegmentKind::Normal))
            .collect()
    }

    #[test]
    fn test_play_opens_first_segment() {
        let mut h = Harness::new(&[1000, 2000]);
        h.player.play();
        assert_eq!(h.player.state(), PlayerState::Playing);
        assert_eq!(h.device.sources(), vec![path(0)]);
        assert!(h.device.is_playing());
        let events = h.drain();
        assert!(events.contains(&PlayerEvent::SegmentChanged { index: 0 }));
        assert!(events.contains(&PlayerEvent::PlaybackStateChanged { is_playing: true }));
    }

    #[test]
    fn test_auto_advance_moves_to_next_segment() {
        let mut h = Harness::new(&[1000, 2000, 1500]);
        h.player.play();
        h.device.report_position(600);
        h.player.tick();
        assert_eq!(h.player.position_ms(), 600);

        h.device.finish_source();
        h.player.tick();
        assert_eq!(h.player.current_segment(), Some(1));
        assert_eq!(h.player.position_ms(), 1000);
        assert_eq!(h.device.current_source(), Some(path(1)));
    }

    #[test]
    fn test_auto_advance_skips_holes() {
        let mut h = Harness::new(&[]);
        let mut list = segments(&[1000]);
        list.push(Segment::pending(2));
        list.push(Segment::with_media(path(2), Some(500), SegmentKind::Normal));
        h.player.set_segments(list);

        h.player.play();
        h.device.finish_source();
        h.player.tick();
        assert_eq!(h.player.current_segment(), Some(2));
        assert_eq!(h.device.sources(), vec![path(0), path(2)]);
    }

    #[test]
    fn test_loop_off_stops_at_end_without_wrapping() {
        let mut h = Harness::new(&[1000, 2000]);
        h.player.play();
        h.device.finish_source();
        h.player.tick();
        h.device.report_position(1500);
        h.player.tick();
        h.drain();

        h.device.finish_source();
        h.player.tick();

        assert_eq!(h.player.state(), PlayerState::Stopped);
        assert_eq!(h.player.position_ms(), 3000);
        let positions = h.positions();
        assert!(!positions.contains(&0));
        assert_eq!(positions.last(), Some(&3000));
        assert!(!h.device.is_playing());
    }

    #[test]
    fn test_loop_on_wraps_to_first_segment() {
        let mut h = Harness::new(&[1000, 2000]);
        h.player.set_loop(true);
        h.player.play();
        h.device.finish_source();
        h.player.tick();
        h.device.finish_source();
        h.player.tick();

        assert_eq!(h.player.state(), PlayerState::Playing);
        assert_eq!(h.player.current_segment(), Some(0));
        assert_eq!(h.device.sources(), vec![path(0), path(1), path(0)]);
        assert!(h.player.playback_state().loop_enabled);
    }

    #[test]
    fn test_drag_seeks_are_debounced() {
        let mut h = Harness::new(&[1000, 2000, 1500]);
        h.player.play();

        h.player.seek_drag(500);
        h.clock.advance_ms(50);
        h.player.tick();
        h.player.seek_drag(1200);
        h.clock.advance_ms(50);
        h.player.tick();
        h.player.seek_drag(2500);
        assert!(h.player.playback_state().is_seeking);
        h.player.tick();
        assert!(h.device.seeks().is_empty());

        h.clock.advance_ms(200);
        h.player.tick();
        h.player.tick();

        assert_eq!(h.device.seeks(), vec![1500]);
        assert_eq!(h.player.current_segment(), Some(1));
        assert_eq!(h.player.position_ms(), 2500);
    }

    #[test]
    fn test_seek_to_applies_immediately_and_cancels_drag() {
        let mut h = Harness::new(&[1000, 2000]);
        h.player.play();
        h.player.seek_drag(200);
        h.player.seek_to(1800);

        assert_eq!(h.device.seeks(), vec![800]);
        h.clock.advance_ms(500);
        h.player.tick();
        assert_eq!(h.device.seeks(), vec![800]);
        assert_eq!(h.player.position_ms(), 1800);
    }

    #[test]
    fn test_guard_window_ignores_stale_positions() {
        let mut h = Harness::new(&[1000, 2000]);
        h.player.play();
        h.player.seek_to(1500);

        h.device.report_position(100);
        h.player.tick();
        assert_eq!(h.player.position_ms(), 1500);

        h.clock.advance_ms(defaults::SEEK_GUARD_MS);
        h.device.report_position(700);
        h.player.tick();
        assert_eq!(h.player.position_ms(), 1700);
    }

    #[test]
    fn test_seek_on_empty_timeline_is_ignored() {
        let mut h = Harness::new(&[]);
        h.player.seek_to(1000);
        assert!(h.device.seeks().is_empty());
        assert_eq!(h.player.state(), PlayerState::Idle);
    }

    #[test]
    fn test_play_without_media_waits_then_starts() {
        let mut h = Harness::new(&[]);
        h.player.set_segments(vec![Segment::pending(1)]);
        h.player.play();
        assert_eq!(h.player.state(), PlayerState::Loading);

        h.player.set_segments(segments(&[1000]));
        assert_eq!(h.player.state(), PlayerState::Playing);
        assert_eq!(h.device.sources(), vec![path(0)]);
    }

    #[test]
    fn test_refresh_keeps_playback_and_follows_path() {
        let mut h = Harness::new(&[1000, 2000]);
        h.player.play();
        h.device.finish_source();
        h.player.tick();
        assert_eq!(h.player.current_segment(), Some(1));

        let mut list = segments(&[1000, 2000]);
        list.insert(0, Segment::with_media(PathBuf::from("gap.wav"), Some(300), SegmentKind::Gap));
        h.player.set_segments(list);

        assert_eq!(h.player.state(), PlayerState::Playing);
        assert_eq!(h.player.current_segment(), Some(2));
        assert_eq!(h.device.sources(), vec![path(0), path(1)]);
    }

    #[test]
    fn test_refresh_without_current_segment_stops() {
        let mut h = Harness::new(&[1000, 2000]);
        h.player.play();
        h.player.set_segments(segments(&[1000, 2000]).split_off(1));

        assert_eq!(h.player.state(), PlayerState::Stopped);
        assert_eq!(h.player.current_segment(), None);
        assert!(h.drain().iter().any(|e| matches!(e, PlayerEvent::Status { .. })));
    }

    #[test]
    fn test_open_failure_is_treated_as_end_of_segment() {
        let mut h = Harness::new(&[1000, 2000, 500]);
        h.device.fail_source(path(1));
        h.player.play();
        h.device.finish_source();
        h.player.tick();

        assert_eq!(h.player.current_segment(), Some(2));
        assert_eq!(h.device.sources(), vec![path(0), path(2)]);
    }

    #[test]
    fn test_decode_errors_in_loop_stop_instead_of_spinning() {
        let mut h = Harness::new(&[1000, 1000]);
        h.player.set_loop(true);
        h.player.play();
        for _ in 0..2 {
            h.device.push_event(DeviceEvent::Error("corrupt".to_string()));
            h.player.tick();
        }
        assert_eq!(h.player.state(), PlayerState::Stopped);

        h.device.push_event(DeviceEvent::Error("corrupt".to_string()));
        h.player.tick();
        assert_eq!(h.player.state(), PlayerState::Stopped);
    }

    #[test]
    fn test_awaiting_media_waits_at_end_then_resumes() {
        let mut h = Harness::new(&[1000]);
        h.player.set_awaiting_media(true);
        h.player.play();
        h.device.finish_source();
        h.player.tick();
        assert_eq!(h.player.state(), PlayerState::Loading);
        assert_eq!(h.player.position_ms(), 1000);

        h.player.set_segments(segments(&[1000, 800]));
        assert_eq!(h.player.state(), PlayerState::Playing);
        assert_eq!(h.player.current_segment(), Some(1));
    }

    #[test]
    fn test_decode_error_while_awaiting_media_waits_for_next_segment() {
        let mut h = Harness::new(&[1000]);
        h.player.set_awaiting_media(true);
        h.player.play();
        h.device.push_event(DeviceEvent::Error("corrupt".to_string()));
        h.player.tick();
        assert_eq!(h.player.state(), PlayerState::Loading);

        h.player.set_segments(segments(&[1000, 800]));
        assert_eq!(h.player.state(), PlayerState::Playing);
        assert_eq!(h.player.current_segment(), Some(1));
        assert_eq!(h.device.current_source(), Some(path(1)));
    }

    #[test]
    fn test_production_end_while_waiting_wraps_when_looping() {
        let mut h = Harness::new(&[1000, 2000]);
        h.player.set_loop(true);
        h.player.set_awaiting_media(true);
        h.player.play();
        h.device.finish_source();
        h.player.tick();
        h.device.finish_source();
        h.player.tick();
        assert_eq!(h.player.state(), PlayerState::Loading);

        h.player.set_awaiting_media(false);
        assert_eq!(h.player.state(), PlayerState::Playing);
        assert_eq!(h.player.current_segment(), Some(0));
        assert_eq!(h.device.current_source(), Some(path(0)));
    }

    #[test]
    fn test_production_end_while_waiting_stops_without_loop() {
        let mut h = Harness::new(&[1000]);
        h.player.set_awaiting_media(true);
        h.player.play();
        h.device.finish_source();
        h.player.tick();

        h.player.set_awaiting_media(false);
        assert_eq!(h.player.state(), PlayerState::Stopped);
        assert_eq!(h.player.position_ms(), 1000);
    }

    #[test]
    fn test_pause_toggle_and_stop() {
        let mut h = Harness::new(&[1000]);
        h.player.toggle();
        assert_eq!(h.player.state(), PlayerState::Playing);
        h.device.report_position(300);
        h.player.tick();
        h.player.toggle();
        assert_eq!(h.player.state(), PlayerState::Paused);
        assert!(!h.device.is_playing());
        assert_eq!(h.player.playback_state().position_within_segment_ms, 300);

        h.player.stop();
        assert_eq!(h.player.state(), PlayerState::Stopped);
        assert_eq!(h.player.position_ms(), 0);

        h.player.reset();
        assert_eq!(h.player.state(), PlayerState::Idle);
        assert_eq!(h.player.total_ms(), 0);
    }
}
