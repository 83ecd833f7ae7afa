//! Ties production, the segment registry and the player together.
//!
//! The controller is the single owner of the registry and the player. The
//! pool runs on its own threads and only talks to the controller through
//! the pipeline event channel, which `pump()` drains. User edits go through
//! the same object, so every mutation happens on one thread.
//!
//! Edit operations take registry indices, which include slots still waiting
//! for their chunk. The player only sees segments that have media, so its
//! indices can differ.

use crate::audio::codec::AudioCodec;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{Result, VoxreelError};
use crate::pipeline::cancel::CancellationToken;
use crate::pipeline::error::{ErrorReporter, LogReporter};
use crate::pipeline::pool::{PoolConfig, PoolHandle, ProducerPool};
use crate::pipeline::producer::Producer;
use crate::pipeline::types::PipelineEvent;
use crate::player::device::OutputDevice;
use crate::player::engine::TimelinePlayer;
use crate::player::state::PlayerEvent;
use crate::splitter::{self, SplitMode};
use crate::storage::ArtifactStore;
use crate::timeline::registry::{GapPlacement, RegistryStats, SegmentRegistry, SplitPlacement};
use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything the controller reports to its observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ControllerEvent {
    Pipeline(PipelineEvent),
    Player(PlayerEvent),
}

#[derive(Debug, Clone)]
struct SessionSettings {
    pool: PoolConfig,
    max_chunk_len: usize,
    auto_play: bool,
    split_placement: SplitPlacement,
    temp_prefix: String,
    storage_dir: Option<PathBuf>,
    extension: String,
}

impl SessionSettings {
    fn from_config(config: &Config, extension: &str) -> Self {
        Self {
            pool: config.pool_config(),
            max_chunk_len: config.pipeline.max_chunk_len,
            auto_play: config.player.auto_play,
            split_placement: config.edit.split_placement,
            temp_prefix: config.storage.temp_prefix.clone(),
            storage_dir: config.storage.dir.clone(),
            extension: extension.to_string(),
        }
    }
}

pub struct PlaybackController<C: Clock + Clone> {
    settings: SessionSettings,
    codec: Arc<dyn AudioCodec>,
    registry: SegmentRegistry,
    player: TimelinePlayer<C>,
    player_rx: Receiver<PlayerEvent>,
    pipeline_rx: Option<Receiver<PipelineEvent>>,
    pool: Option<PoolHandle>,
    cancel: CancellationToken,
    store: Option<Arc<ArtifactStore>>,
    reporter: Arc<dyn ErrorReporter>,
    observer: Option<Sender<ControllerEvent>>,
    auto_played: bool,
    production_done: bool,
    progress: (usize, usize),
}

impl<C: Clock + Clone> PlaybackController<C> {
    pub fn new(
        config: &Config,
        device: Box<dyn OutputDevice>,
        clock: C,
        codec: Arc<dyn AudioCodec>,
    ) -> Self {
        let (player_tx, player_rx) = unbounded();
        let player =
            TimelinePlayer::new(device, clock, config.player_config()).with_event_sender(player_tx);
        Self {
            settings: SessionSettings::from_config(config, &config.producer.extension),
            codec,
            registry: SegmentRegistry::new(),
            player,
            player_rx,
            pipeline_rx: None,
            pool: None,
            cancel: CancellationToken::new(),
            store: None,
            reporter: Arc::new(LogReporter),
            observer: None,
            auto_played: false,
            production_done: true,
            progress: (0, 0),
        }
    }

    pub fn with_observer(mut self, observer: Sender<ControllerEvent>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Extension producers write, used for artifact names.
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.settings.extension = extension.to_string();
        self
    }

    /// Starts a new session, discarding any previous one.
    ///
    /// Returns the number of chunks queued.
    pub fn start(
        &mut self,
        content: &str,
        mode: SplitMode,
        producer: Arc<dyn Producer>,
    ) -> Result<usize> {
        self.clear();

        let units = splitter::split(content, mode, self.settings.max_chunk_len)?;
        let total = units.len();
        let store = match &self.settings.storage_dir {
            Some(dir) => ArtifactStore::create_in(dir, &self.settings.temp_prefix, total)?,
            None => ArtifactStore::create(&self.settings.temp_prefix, total)?,
        };
        let store = Arc::new(store.with_extension(&self.settings.extension));

        self.registry.reserve(total);
        self.cancel = CancellationToken::new();
        let (events_tx, events_rx) = unbounded();
        let name = producer.name().to_string();

        let pool = ProducerPool::new(self.settings.pool.clone())
            .with_error_reporter(self.reporter.clone())
            .start(units, producer, store.clone(), self.cancel.clone(), events_tx);
        let pool = match pool {
            Ok(pool) => pool,
            Err(e) => {
                self.registry.clear();
                return Err(e);
            }
        };

        log::info!(
            "started {} chunk(s) with {} in {}",
            total,
            name,
            store.path().display()
        );
        self.pool = Some(pool);
        self.pipeline_rx = Some(events_rx);
        self.store = Some(store);
        self.production_done = false;
        self.progress = (0, total);
        self.player.set_awaiting_media(true);
        self.publish();
        Ok(total)
    }

    /// Applies pending pipeline events, advances the player and relays
    /// everything to the observer. Never blocks.
    ///
    /// Returns the number of pipeline events applied.
    pub fn pump(&mut self) -> usize {
        let events: Vec<PipelineEvent> = self
            .pipeline_rx
            .as_ref()
            .map(|rx| rx.try_iter().collect())
            .unwrap_or_default();
        let applied = events.len();
        for event in events {
            self.apply(event);
        }

        self.player.tick();
        self.relay_player_events();
        applied
    }

    fn apply(&mut self, event: PipelineEvent) {
        match &event {
            PipelineEvent::SegmentReady {
                index,
                path,
                duration_ms,
            } => {
                match self.registry.position_of_unit(*index) {
                    Some(slot) => {
                        if let Err(e) = self.registry.set_at(slot, path.clone(), *duration_ms) {
                            log::warn!("chunk {} could not be placed: {}", index, e);
                        }
                    }
                    None => {
                        log::debug!("slot for chunk {} was removed, discarding", index);
                        remove_file_quietly(path);
                    }
                }
                self.publish();
                if self.settings.auto_play && !self.auto_played {
                    self.auto_played = true;
                    self.player.play();
                }
            }
            PipelineEvent::Missing { index, reason } => {
                log::debug!("chunk {} missing: {}", index, reason);
                if let Some(slot) = self.registry.position_of_unit(*index)
                    && let Err(e) = self.registry.mark_missing(slot)
                {
                    log::warn!("chunk {} could not be marked missing: {}", index, e);
                }
            }
            PipelineEvent::Progress { emitted, total } => {
                self.progress = (*emitted, *total);
            }
            PipelineEvent::AllDone | PipelineEvent::Cancelled { .. } => {
                self.finish_production();
            }
            PipelineEvent::Status { .. } | PipelineEvent::Error { .. } => {}
        }
        self.notify(ControllerEvent::Pipeline(event));
    }

    fn finish_production(&mut self) {
        self.production_done = true;
        self.pipeline_rx = None;
        if let Some(pool) = self.pool.take() {
            pool.stop();
        }
        self.player.set_awaiting_media(false);
        log::info!("production finished: {:?}", self.registry.statistics());
    }

    /// Cancels production (bounded wait) and stops the player.
    pub fn stop_all(&mut self) {
        self.cancel.cancel();
        if let Some(pool) = self.pool.take() {
            pool.stop();
        }
        // Deliver what made it out before the pool stopped.
        if let Some(rx) = self.pipeline_rx.take() {
            let events: Vec<PipelineEvent> = rx.try_iter().collect();
            for event in events {
                self.apply(event);
            }
        }
        self.production_done = true;
        self.player.set_awaiting_media(false);
        self.player.stop();
        self.relay_player_events();
    }

    /// Ends the session: stops everything and deletes every artifact.
    pub fn clear(&mut self) {
        self.stop_all();
        self.registry.clear();
        self.player.reset();
        self.relay_player_events();
        self.store = None;
        self.auto_played = false;
        self.progress = (0, 0);
    }

    fn session_store(&self) -> Result<Arc<ArtifactStore>> {
        self.store.clone().ok_or(VoxreelError::NoSession)
    }

    /// Splits registry slot `index` at `local_ms`.
    pub fn split_segment(&mut self, index: usize, local_ms: u64) -> Result<(usize, usize)> {
        let store = self.session_store()?;
        let parts = self.registry.split(
            index,
            local_ms,
            self.settings.split_placement,
            self.codec.as_ref(),
            &store,
        )?;
        self.publish();
        Ok(parts)
    }

    /// Removes registry slot `index` and deletes its file.
    pub fn remove_segment(&mut self, index: usize) -> Result<()> {
        let removed = self.registry.remove(index)?;
        self.publish();
        if let Some(path) = removed.path {
            remove_file_quietly(&path);
        }
        Ok(())
    }

    /// Inserts silence next to registry slot `index`.
    pub fn insert_gap(
        &mut self,
        index: usize,
        duration_ms: u64,
        placement: GapPlacement,
    ) -> Result<usize> {
        let store = self.session_store()?;
        let at = self.registry.insert_gap(
            index,
            duration_ms,
            placement,
            self.codec.as_ref(),
            &store,
        )?;
        self.publish();
        Ok(at)
    }

    pub fn reorder_segments(&mut self, permutation: &[usize]) -> Result<()> {
        self.registry.reorder(permutation)?;
        self.publish();
        Ok(())
    }

    /// Writes every segment with media, in order, into one file.
    ///
    /// Returns the duration written.
    pub fn export(&self, output: &Path) -> Result<u64> {
        let inputs: Vec<PathBuf> = self
            .registry
            .valid()
            .into_iter()
            .filter_map(|s| s.path)
            .collect();
        if inputs.is_empty() {
            return Err(VoxreelError::Other("no segments ready to export".to_string()));
        }
        let written = self.codec.concat(&inputs, output)?;
        log::info!(
            "exported {} segment(s), {}ms to {}",
            inputs.len(),
            written,
            output.display()
        );
        Ok(written)
    }

    pub fn is_production_done(&self) -> bool {
        self.production_done
    }

    /// Last progress reported by the pipeline, as `(emitted, total)`.
    pub fn progress(&self) -> (usize, usize) {
        self.progress
    }

    pub fn statistics(&self) -> RegistryStats {
        self.registry.statistics()
    }

    pub fn registry(&self) -> &SegmentRegistry {
        &self.registry
    }

    pub fn player(&self) -> &TimelinePlayer<C> {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut TimelinePlayer<C> {
        &mut self.player
    }

    /// Directory holding this session's files.
    pub fn work_dir(&self) -> Option<&Path> {
        self.store.as_deref().map(ArtifactStore::path)
    }

    fn publish(&mut self) {
        self.player.set_segments(self.registry.valid());
    }

    fn relay_player_events(&mut self) {
        let events: Vec<PlayerEvent> = self.player_rx.try_iter().collect();
        for event in events {
            self.notify(ControllerEvent::Player(event));
        }
    }

    fn notify(&mut self, event: ControllerEvent) {
        if let Some(observer) = &self.observer
            && observer.send(event).is_err()
        {
            log::debug!("controller observer dropped");
            self.observer = None;
        }
    }
}

impl<C: Clock + Clone> Drop for PlaybackController<C> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn remove_file_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        log::warn!("could not remove {}: {}", path.display(), e);
    }
}
