//! The authoritative ordered segment list.
//!
//! Every mutation recomputes the cumulative timeline before returning, and a
//! rejected mutation leaves the list untouched. The registry owns the files
//! it references: `clear` deletes them.

use crate::audio::codec::AudioCodec;
use crate::error::{Result, VoxreelError};
use crate::storage::ArtifactStore;
use crate::timeline::map::Timeline;
use crate::timeline::segment::{Segment, SegmentKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Which side of a segment a gap is inserted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapPlacement {
    Before,
    After,
}

/// Where the second half of a split segment goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitPlacement {
    /// Right after the first half.
    #[default]
    Adjacent,
    /// At the end of the list.
    AppendAtEnd,
}

/// Counts by kind and total known duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistryStats {
    pub normal: usize,
    pub gaps: usize,
    pub split_parts: usize,
    pub pending: usize,
    pub missing: usize,
    pub total: usize,
    pub total_ms: u64,
}

/// Ordered list of segments with derived timeline.
#[derive(Debug, Default)]
pub struct SegmentRegistry {
    segments: Vec<Segment>,
    timeline: Timeline,
}

impl SegmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn recompute(&mut self) {
        self.timeline = Timeline::from_durations(self.segments.iter().map(|s| s.duration_ms));
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.segments.len() {
            Ok(())
        } else {
            Err(VoxreelError::SegmentOutOfRange {
                index,
                len: self.segments.len(),
            })
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn total_ms(&self) -> u64 {
        self.timeline.total_ms()
    }

    pub fn cumulative_ms(&self) -> &[u64] {
        self.timeline.cumulative_ms()
    }

    /// Appends pending slots for units `1..=count`.
    pub fn reserve(&mut self, count: usize) {
        let first = self.segments.len() + 1;
        self.segments
            .extend((first..first + count).map(Segment::pending));
        self.recompute();
    }

    /// Appends a produced segment.
    pub fn append(&mut self, path: PathBuf, duration_ms: Option<u64>) -> usize {
        self.segments
            .push(Segment::with_media(path, duration_ms, SegmentKind::Normal));
        self.recompute();
        self.segments.len() - 1
    }

    /// Fills slot `index` with produced media. The list length is unchanged.
    pub fn set_at(&mut self, index: usize, path: PathBuf, duration_ms: Option<u64>) -> Result<()> {
        self.check_index(index)?;
        let slot = &mut self.segments[index];
        slot.path = Some(path);
        slot.duration_ms = duration_ms;
        slot.kind = SegmentKind::Normal;
        self.recompute();
        Ok(())
    }

    /// Marks slot `index` as permanently without media.
    pub fn mark_missing(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        let slot = &mut self.segments[index];
        if slot.path.is_none() {
            slot.kind = SegmentKind::Missing;
            slot.duration_ms = None;
        }
        self.recompute();
        Ok(())
    }

    /// Current position of the pending slot reserved for `unit_index`.
    pub fn position_of_unit(&self, unit_index: usize) -> Option<usize> {
        self.segments.iter().position(|s| {
            s.unit_index == Some(unit_index) && s.kind == SegmentKind::Pending
        })
    }

    /// Removes slot `index`, shifting later slots down, and hands back the
    /// removed segment along with ownership of its file.
    pub fn remove(&mut self, index: usize) -> Result<Segment> {
        self.check_index(index)?;
        let removed = self.segments.remove(index);
        self.recompute();
        Ok(removed)
    }

    /// Inserts `duration_ms` of generated silence next to slot `index`.
    ///
    /// Returns the position of the new gap.
    pub fn insert_gap(
        &mut self,
        index: usize,
        duration_ms: u64,
        placement: GapPlacement,
        codec: &dyn AudioCodec,
        store: &ArtifactStore,
    ) -> Result<usize> {
        self.check_index(index)?;
        if duration_ms == 0 {
            return Err(VoxreelError::Other(
                "gap duration must be positive".to_string(),
            ));
        }

        let path = store.derived_path("gap");
        let written = codec.silence(duration_ms, &path).inspect_err(|_| {
            remove_quietly(&path);
        })?;

        let at = match placement {
            GapPlacement::Before => index,
            GapPlacement::After => index + 1,
        };
        self.segments
            .insert(at, Segment::with_media(path, Some(written), SegmentKind::Gap));
        self.recompute();
        Ok(at)
    }

    /// Cuts slot `index` at `local_ms` into two new files.
    ///
    /// Slot `index` becomes the first part; the second part is placed per
    /// `placement`. Returns the positions of both parts. The original file
    /// is deleted.
    pub fn split(
        &mut self,
        index: usize,
        local_ms: u64,
        placement: SplitPlacement,
        codec: &dyn AudioCodec,
        store: &ArtifactStore,
    ) -> Result<(usize, usize)> {
        self.check_index(index)?;
        let segment = &self.segments[index];
        let (Some(source), Some(duration_ms)) = (segment.path.clone(), segment.duration_ms) else {
            return Err(VoxreelError::SegmentNotReady { index });
        };
        if local_ms == 0 || local_ms >= duration_ms {
            return Err(VoxreelError::InvalidSplitPoint {
                at_ms: local_ms,
                duration_ms,
            });
        }

        let first = store.derived_path("split");
        let second = store.derived_path("split");
        let (first_ms, second_ms) = codec
            .cut(&source, local_ms, &first, &second)
            .inspect_err(|_| {
                remove_quietly(&first);
                remove_quietly(&second);
            })?;

        let unit_index = self.segments[index].unit_index;
        self.segments[index] = Segment {
            path: Some(first),
            duration_ms: Some(first_ms),
            kind: SegmentKind::SplitPart,
            unit_index,
        };
        let tail = Segment::with_media(second, Some(second_ms), SegmentKind::SplitPart);
        let second_at = match placement {
            SplitPlacement::Adjacent => {
                self.segments.insert(index + 1, tail);
                index + 1
            }
            SplitPlacement::AppendAtEnd => {
                self.segments.push(tail);
                self.segments.len() - 1
            }
        };
        self.recompute();
        remove_quietly(&source);

        Ok((index, second_at))
    }

    /// Replaces the order: the segment at `permutation[i]` moves to `i`.
    pub fn reorder(&mut self, permutation: &[usize]) -> Result<()> {
        let len = self.segments.len();
        if permutation.len() != len {
            return Err(VoxreelError::InvalidPermutation {
                message: format!("expected {} positions, got {}", len, permutation.len()),
            });
        }
        let mut seen = vec![false; len];
        for &old in permutation {
            if old >= len {
                return Err(VoxreelError::InvalidPermutation {
                    message: format!("position {} out of range", old),
                });
            }
            if std::mem::replace(&mut seen[old], true) {
                return Err(VoxreelError::InvalidPermutation {
                    message: format!("position {} used twice", old),
                });
            }
        }

        let mut slots: Vec<Option<Segment>> = self.segments.drain(..).map(Some).collect();
        self.segments = permutation
            .iter()
            .filter_map(|&old| slots[old].take())
            .collect();
        self.recompute();
        Ok(())
    }

    /// Segments with both a file and a duration, in order.
    pub fn valid(&self) -> Vec<Segment> {
        self.segments
            .iter()
            .filter(|s| s.is_valid())
            .cloned()
            .collect()
    }

    pub fn statistics(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: self.segments.len(),
            total_ms: self.timeline.total_ms(),
            ..RegistryStats::default()
        };
        for segment in &self.segments {
            match segment.kind {
                SegmentKind::Normal => stats.normal += 1,
                SegmentKind::Gap => stats.gaps += 1,
                SegmentKind::SplitPart => stats.split_parts += 1,
                SegmentKind::Pending => stats.pending += 1,
                SegmentKind::Missing => stats.missing += 1,
            }
        }
        stats
    }

    /// Empties the list and deletes every file it referenced.
    pub fn clear(&mut self) {
        for segment in self.segments.drain(..) {
            if let Some(path) = segment.path {
                remove_quietly(&path);
            }
        }
        self.recompute();
    }
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("could not remove {}: {}", path.display(), e),
    }
}
