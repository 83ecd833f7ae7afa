//! Ordered delivery buffer.
//!
//! Completions arrive in any order; the buffer holds them until every lower
//! index has been resolved and then releases them in strictly increasing
//! index order. A failed unit is resolved with a tombstone so later units are
//! never blocked behind it.

use crate::error::{Result, VoxreelError};
use std::collections::BTreeMap;

/// Outcome of a single unit as fed into the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    /// The unit produced a result.
    Ready(T),
    /// The unit will never produce a result.
    Missing(String),
}

/// An in-order emission from the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered<T> {
    pub index: usize,
    pub resolution: Resolution<T>,
}

/// Reorders out-of-order completions for indices `1..=total`.
#[derive(Debug)]
pub struct DeliveryBuffer<T> {
    total: usize,
    next_expected: usize,
    pending: BTreeMap<usize, Resolution<T>>,
    all_done_taken: bool,
}

impl<T> DeliveryBuffer<T> {
    /// Creates a buffer expecting indices `1..=total`.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            next_expected: 1,
            pending: BTreeMap::new(),
            all_done_taken: false,
        }
    }

    /// Records the outcome of `index` and returns everything that became
    /// deliverable, in index order.
    ///
    /// Rejects indices outside `1..=total` and indices already resolved;
    /// a rejected call leaves the buffer unchanged.
    pub fn resolve(&mut self, index: usize, resolution: Resolution<T>) -> Result<Vec<Delivered<T>>> {
        if index == 0 || index > self.total {
            return Err(VoxreelError::Delivery {
                message: format!("index {} outside 1..={}", index, self.total),
            });
        }
        if index < self.next_expected || self.pending.contains_key(&index) {
            return Err(VoxreelError::Delivery {
                message: format!("index {} resolved twice", index),
            });
        }

        self.pending.insert(index, resolution);

        let mut out = Vec::new();
        while let Some(resolution) = self.pending.remove(&self.next_expected) {
            out.push(Delivered {
                index: self.next_expected,
                resolution,
            });
            self.next_expected += 1;
        }
        Ok(out)
    }

    /// `(emitted, total)`; tombstones count as emitted.
    pub fn progress(&self) -> (usize, usize) {
        (self.next_expected - 1, self.total)
    }

    /// Number of resolved units still waiting on a lower index.
    pub fn held(&self) -> usize {
        self.pending.len()
    }

    /// True once every index has been resolved and released.
    pub fn is_complete(&self) -> bool {
        self.next_expected > self.total
    }

    /// Returns true exactly once, the first time it is called after the
    /// buffer completed.
    pub fn take_all_done(&mut self) -> bool {
        if self.is_complete() && !self.all_done_taken {
            self.all_done_taken = true;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(order: &[usize]) -> Vec<usize> {
        let mut buffer = DeliveryBuffer::new(order.len());
        let mut emitted = Vec::new();
        for &index in order {
            for d in buffer.resolve(index, Resolution::Ready(index * 10)).unwrap() {
                emitted.push(d.index);
            }
        }
        emitted
    }

    #[test]
    fn test_in_order_completions_pass_straight_through() {
        let mut buffer = DeliveryBuffer::new(3);
        let out = buffer.resolve(1, Resolution::Ready("a")).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].index, 1);
        assert_eq!(out[0].resolution, Resolution::Ready("a"));
        assert_eq!(buffer.progress(), (1, 3));
    }

    #[test]
    fn test_out_of_order_completions_are_held() {
        let mut buffer = DeliveryBuffer::new(5);
        assert!(buffer.resolve(3, Resolution::Ready(3)).unwrap().is_empty());
        assert_eq!(buffer.held(), 1);

        let out = buffer.resolve(1, Resolution::Ready(1)).unwrap();
        assert_eq!(out.iter().map(|d| d.index).collect::<Vec<_>>(), vec![1]);

        let out = buffer.resolve(2, Resolution::Ready(2)).unwrap();
        assert_eq!(out.iter().map(|d| d.index).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(buffer.progress(), (3, 5));
    }

    #[test]
    fn test_completion_order_3_1_5_2_4() {
        assert_eq!(feed(&[3, 1, 5, 2, 4]), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_reverse_completion_order() {
        let order: Vec<usize> = (1..=50).rev().collect();
        assert_eq!(feed(&order), (1..=50).collect::<Vec<_>>());
    }

    #[test]
    fn test_every_permutation_of_four_emits_in_order() {
        let base = [1usize, 2, 3, 4];
        let mut count = 0;
        for a in 0..4 {
            for b in 0..4 {
                for c in 0..4 {
                    for d in 0..4 {
                        let idx = [a, b, c, d];
                        let mut seen = idx.to_vec();
                        seen.sort_unstable();
                        seen.dedup();
                        if seen.len() != 4 {
                            continue;
                        }
                        let order: Vec<usize> = idx.iter().map(|&i| base[i]).collect();
                        assert_eq!(feed(&order), vec![1, 2, 3, 4], "order {:?}", order);
                        count += 1;
                    }
                }
            }
        }
        assert_eq!(count, 24);
    }

    #[test]
    fn test_tombstone_unblocks_later_units() {
        let mut buffer: DeliveryBuffer<&str> = DeliveryBuffer::new(3);
        assert!(buffer.resolve(2, Resolution::Ready("b")).unwrap().is_empty());
        assert!(buffer.resolve(3, Resolution::Ready("c")).unwrap().is_empty());

        let out = buffer
            .resolve(1, Resolution::Missing("timeout".into()))
            .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].resolution, Resolution::Missing("timeout".into()));
        assert_eq!(out[2].resolution, Resolution::Ready("c"));
        assert_eq!(buffer.progress(), (3, 3));
    }

    #[test]
    fn test_all_done_fires_exactly_once() {
        let mut buffer = DeliveryBuffer::new(2);
        buffer.resolve(2, Resolution::Ready(())).unwrap();
        assert!(!buffer.take_all_done());
        buffer.resolve(1, Resolution::Ready(())).unwrap();
        assert!(buffer.is_complete());
        assert!(buffer.take_all_done());
        assert!(!buffer.take_all_done());
    }

    #[test]
    fn test_rejects_out_of_range_index() {
        let mut buffer = DeliveryBuffer::new(2);
        assert!(buffer.resolve(0, Resolution::Ready(())).is_err());
        assert!(buffer.resolve(3, Resolution::Ready(())).is_err());
        assert_eq!(buffer.progress(), (0, 2));
    }

    #[test]
    fn test_rejects_duplicate_resolution() {
        let mut buffer = DeliveryBuffer::new(3);
        buffer.resolve(2, Resolution::Ready(2)).unwrap();
        assert!(buffer.resolve(2, Resolution::Ready(2)).is_err());

        buffer.resolve(1, Resolution::Ready(1)).unwrap();
        assert!(buffer.resolve(1, Resolution::Ready(1)).is_err());
        assert_eq!(buffer.progress(), (2, 3));
    }

    #[test]
    fn test_empty_buffer_is_complete() {
        let mut buffer: DeliveryBuffer<()> = DeliveryBuffer::new(0);
        assert!(buffer.is_complete());
        assert!(buffer.take_all_done());
    }
}
