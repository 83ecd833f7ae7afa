//! Mapping between global timeline positions and segment-local positions.

/// Cumulative offsets of a segment list.
///
/// `cumulative_ms[i]` is the sum of the durations before segment `i`;
/// `cumulative_ms[n]` is the total. Unknown durations count as zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    cumulative_ms: Vec<u64>,
}

impl Default for Timeline {
    fn default() -> Self {
        Self {
            cumulative_ms: vec![0],
        }
    }
}

impl Timeline {
    pub fn from_durations<I>(durations: I) -> Self
    where
        I: IntoIterator<Item = Option<u64>>,
    {
        let mut cumulative_ms = vec![0];
        let mut acc = 0u64;
        for duration in durations {
            acc += duration.unwrap_or(0);
            cumulative_ms.push(acc);
        }
        Self { cumulative_ms }
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.cumulative_ms.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_ms(&self) -> u64 {
        self.cumulative_ms[self.len()]
    }

    /// Offsets including the trailing total (`len() + 1` entries).
    pub fn cumulative_ms(&self) -> &[u64] {
        &self.cumulative_ms
    }

    /// Start of segment `index` on the global timeline.
    pub fn offset_of(&self, index: usize) -> Option<u64> {
        (index < self.len()).then(|| self.cumulative_ms[index])
    }

    /// Duration of segment `index` as counted by the timeline.
    pub fn duration_of(&self, index: usize) -> Option<u64> {
        (index < self.len()).then(|| self.cumulative_ms[index + 1] - self.cumulative_ms[index])
    }

    /// Finds the segment containing `global_ms` and the position inside it.
    ///
    /// The position is clamped to `[0, total - 1]`. Returns `None` when the
    /// timeline has no duration at all.
    pub fn locate(&self, global_ms: u64) -> Option<(usize, u64)> {
        let total = self.total_ms();
        if total == 0 {
            return None;
        }
        let global = global_ms.min(total - 1);
        (0..self.len()).find_map(|i| {
            let start = self.cumulative_ms[i];
            let end = self.cumulative_ms[i + 1];
            (global >= start && global < end).then(|| (i, global - start))
        })
    }

    /// Global position of `local_ms` inside segment `index`.
    pub fn to_global(&self, index: usize, local_ms: u64) -> Option<u64> {
        self.offset_of(index).map(|offset| offset + local_ms)
    }
}
