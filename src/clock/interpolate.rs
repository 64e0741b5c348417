//! Per-sample timestamps across a locked block interval

use super::dll::LockedInterval;
use super::source::Nanos;
use crate::constants::NANOS_PER_SEC;

/// Evenly spaced frame timestamps for one block.
///
/// Yields `block_size` values, `round_ns(t0 + k * (t1 - t0) / block_size) + epoch`
/// for `k` in `0..block_size`. Consumed once.
#[derive(Debug, Clone)]
pub struct BlockTimeline {
    t0: f64,
    step: f64,
    epoch: Nanos,
    index: usize,
    len: usize,
}

impl BlockTimeline {
    pub fn new(t0: f64, t1: f64, block_size: usize, epoch: Nanos) -> Self {
        let step = if block_size == 0 {
            0.0
        } else {
            (t1 - t0) / block_size as f64
        };
        Self {
            t0,
            step,
            epoch,
            index: 0,
            len: block_size,
        }
    }

    pub fn from_interval(interval: LockedInterval, block_size: usize, epoch: Nanos) -> Self {
        Self::new(interval.t0, interval.t1, block_size, epoch)
    }

    /// Timeline between two absolute block-start markers, e.g. the audible
    /// times of two consecutive packets.
    pub fn between(start: Nanos, end: Nanos, block_size: usize) -> Self {
        let span = (end - start) as f64 / NANOS_PER_SEC as f64;
        Self::new(0.0, span, block_size, start)
    }

    /// Timestamp of frame `k` without consuming the timeline
    pub fn at(&self, k: usize) -> Nanos {
        let seconds = self.t0 + k as f64 * self.step;
        (seconds * NANOS_PER_SEC as f64).round() as Nanos + self.epoch
    }

    /// Timestamp of the block's first frame
    pub fn first(&self) -> Nanos {
        self.at(0)
    }
}

impl Iterator for BlockTimeline {
    type Item = Nanos;

    fn next(&mut self) -> Option<Nanos> {
        if self.index >= self.len {
            return None;
        }
        let stamp = self.at(self.index);
        self.index += 1;
        Some(stamp)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BlockTimeline {}

/// Expand a locked interval into `block_size` frame timestamps
pub fn interpolate(t0: f64, t1: f64, block_size: usize, epoch: Nanos) -> BlockTimeline {
    BlockTimeline::new(t0, t1, block_size, epoch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_even_spacing() {
        let stamps: Vec<Nanos> = interpolate(1.0, 1.0 + 256.0 / 48000.0, 256, 0).collect();
        assert_eq!(stamps.len(), 256);
        assert_eq!(stamps[0], 1_000_000_000);
        // 1/48000 s = 20833.33 ns
        assert_eq!(stamps[1], 1_000_020_833);
        assert_eq!(stamps[3], 1_000_062_500);
        assert_eq!(stamps[255], 1_005_312_500);
    }

    #[test]
    fn test_epoch_offset() {
        let epoch = 1_700_000_000_000_000_000;
        let timeline = interpolate(0.5, 0.75, 4, epoch);
        assert_eq!(timeline.len(), 4);
        let stamps: Vec<Nanos> = timeline.collect();
        assert_eq!(
            stamps,
            vec![
                epoch + 500_000_000,
                epoch + 562_500_000,
                epoch + 625_000_000,
                epoch + 687_500_000,
            ]
        );
    }

    #[test]
    fn test_empty_block() {
        assert_eq!(interpolate(0.0, 1.0, 0, 0).count(), 0);
    }

    #[test]
    fn test_between_markers() {
        let start = 5_000_000_000;
        let mut timeline = BlockTimeline::between(start, start + 5_333_334, 256);
        assert_eq!(timeline.first(), start);
        assert_eq!(timeline.at(128), start + 2_666_667);
        assert_eq!(timeline.nth(255), Some(start + 5_312_501));
        assert_eq!(timeline.next(), None);
    }

    proptest! {
        #[test]
        fn prop_non_decreasing_and_anchored(
            t0 in 0.0f64..100_000.0,
            dt in 1e-6f64..1.0,
            block_size in 1usize..2048,
            epoch in 0i64..2_000_000_000_000_000_000,
        ) {
            let stamps: Vec<Nanos> = interpolate(t0, t0 + dt, block_size, epoch).collect();
            prop_assert_eq!(stamps.len(), block_size);
            let expected_first = (t0 * 1e9).round() as Nanos + epoch;
            prop_assert!((stamps[0] - expected_first).abs() <= 1);
            for pair in stamps.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
        }
    }
}
