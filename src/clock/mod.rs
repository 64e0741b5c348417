//! Clock locking subsystem
//!
//! Turns noisy per-block wall-clock readings into a smooth, drift-corrected
//! timeline of per-frame timestamps.

pub mod dll;
pub mod history;
pub mod interpolate;
pub mod source;

pub use dll::{DelayLockedLoop, LockedInterval};
pub use history::{JitterStats, TimestampHistory, TimingRecord};
pub use interpolate::{interpolate, BlockTimeline};
pub use source::{Clock, ManualClock, Nanos, SystemClock};

use crate::config::{DllConfig, StreamSettings};
use crate::constants::NANOS_PER_SEC;
use crate::error::ClockError;

/// Clock state for one outgoing stream: its loop filter and its epoch.
///
/// The epoch is the first measured time handed to [`StreamClock::lock_block`];
/// all later timelines are absolute wall-clock nanoseconds derived from it.
#[derive(Debug, Clone)]
pub struct StreamClock {
    dll: DelayLockedLoop,
    epoch: Option<Nanos>,
    block_size: usize,
}

impl StreamClock {
    pub fn new(dll: DelayLockedLoop, block_size: usize) -> Self {
        Self {
            dll,
            epoch: None,
            block_size,
        }
    }

    pub fn from_config(stream: &StreamSettings, dll: &DllConfig) -> Result<Self, ClockError> {
        let rate = stream.block_rate();
        let dll = DelayLockedLoop::new(
            rate,
            dll.initial_bandwidth,
            dll.terminal_bandwidth,
            dll.time_constant_secs * rate,
        )?;
        Ok(Self::new(dll, stream.block_size))
    }

    /// Lock the block that arrived at `measured` and expand it into frame
    /// timestamps.
    pub fn lock_block(&mut self, measured: Nanos) -> Result<BlockTimeline, ClockError> {
        let epoch = *self.epoch.get_or_insert(measured);
        let seconds = (measured - epoch) as f64 / NANOS_PER_SEC as f64;
        let interval = self.dll.update(seconds)?;
        Ok(BlockTimeline::from_interval(interval, self.block_size, epoch))
    }

    pub fn epoch(&self) -> Option<Nanos> {
        self.epoch
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn dll(&self) -> &DelayLockedLoop {
        &self.dll
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_fixed_at_first_block() {
        let mut clock = StreamClock::new(DelayLockedLoop::new(187.5, 2.0, 0.01, 5.0).unwrap(), 256);
        assert_eq!(clock.epoch(), None);

        let start = 1_700_000_000_123_456_789;
        let timeline = clock.lock_block(start).unwrap();
        assert_eq!(timeline.first(), start);
        assert_eq!(clock.epoch(), Some(start));

        let period_ns = NANOS_PER_SEC * 256 / 48000;
        let timeline = clock.lock_block(start + period_ns).unwrap();
        assert!((timeline.first() - (start + period_ns)).abs() <= 1);
        assert_eq!(clock.epoch(), Some(start));
    }

    #[test]
    fn test_timeline_spans_block() {
        let mut clock = StreamClock::new(DelayLockedLoop::new(187.5, 2.0, 0.01, 5.0).unwrap(), 256);
        let stamps: Vec<Nanos> = clock.lock_block(0).unwrap().collect();
        assert_eq!(stamps.len(), 256);
        assert_eq!(stamps[0], 0);
        assert_eq!(stamps[255], 5_312_500);
    }

    #[test]
    fn test_from_config_block_rate() {
        let clock =
            StreamClock::from_config(&StreamSettings::default(), &DllConfig::default()).unwrap();
        assert!((clock.dll().nominal_rate() - 187.5).abs() < 1e-12);
        assert_eq!(clock.block_size(), 256);
    }

    #[test]
    fn test_from_config_rejects_nan_time_constant() {
        let dll = DllConfig {
            time_constant_secs: f64::NAN,
            ..DllConfig::default()
        };
        assert!(matches!(
            StreamClock::from_config(&StreamSettings::default(), &dll),
            Err(ClockError::InvalidParameter { .. })
        ));
    }
}
