//! Single-producer single-consumer hand-off of whole audio blocks
//!
//! The producer (a realtime capture callback) never blocks: when the queue
//! is full the block is dropped and counted. The consumer blocks until a
//! whole block is available, so blocks leave in capture order.

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::clock::Nanos;

/// One block of interleaved S16 samples with its arrival time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedBlock {
    pub samples: Vec<i16>,
    pub arrival: Nanos,
}

#[derive(Debug, Default)]
struct QueueStats {
    pushed: AtomicUsize,
    overflow: AtomicUsize,
}

/// Producer half
pub struct BlockProducer {
    tx: Sender<CapturedBlock>,
    stats: Arc<QueueStats>,
}

/// Consumer half
pub struct BlockConsumer {
    rx: Receiver<CapturedBlock>,
    stats: Arc<QueueStats>,
}

/// Create a block queue holding up to `capacity` blocks
pub fn block_queue(capacity: usize) -> (BlockProducer, BlockConsumer) {
    let (tx, rx) = bounded(capacity.max(1));
    let stats = Arc::new(QueueStats::default());
    (
        BlockProducer {
            tx,
            stats: stats.clone(),
        },
        BlockConsumer { rx, stats },
    )
}

impl BlockProducer {
    /// Push a block. Returns false if it was dropped (queue full or
    /// consumer gone).
    pub fn push(&self, block: CapturedBlock) -> bool {
        match self.tx.try_send(block) {
            Ok(()) => {
                self.stats.pushed.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.stats.overflow.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

impl BlockConsumer {
    /// Wait for the next block. `None` once the producer is gone and the
    /// queue is drained.
    pub fn pop(&self) -> Option<CapturedBlock> {
        self.rx.recv().ok()
    }

    /// Wait for the next block or the first error on `errors`, whichever
    /// comes first. A closed error channel falls back to [`Self::pop`].
    pub fn pop_or_fail<E>(&self, errors: &Receiver<E>) -> Result<Option<CapturedBlock>, E> {
        select! {
            recv(self.rx) -> block => Ok(block.ok()),
            recv(errors) -> err => match err {
                Ok(err) => Err(err),
                Err(_) => Ok(self.pop()),
            },
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Blocks accepted from the producer so far
    pub fn pushed_count(&self) -> usize {
        self.stats.pushed.load(Ordering::Relaxed)
    }

    /// Blocks dropped because the consumer fell behind
    pub fn overflow_count(&self) -> usize {
        self.stats.overflow.load(Ordering::Relaxed)
    }
}

/// Accumulates arbitrarily sized callback buffers into whole blocks
#[derive(Debug)]
pub struct BlockAssembler {
    pending: Vec<i16>,
    block_samples: usize,
}

impl BlockAssembler {
    pub fn new(block_samples: usize) -> Self {
        Self {
            pending: Vec::with_capacity(block_samples * 2),
            block_samples: block_samples.max(1),
        }
    }

    /// Append samples and call `emit` once for every completed block
    pub fn extend<I, F>(&mut self, samples: I, mut emit: F)
    where
        I: IntoIterator<Item = i16>,
        F: FnMut(Vec<i16>),
    {
        for sample in samples {
            self.pending.push(sample);
            if self.pending.len() == self.block_samples {
                let block = std::mem::replace(
                    &mut self.pending,
                    Vec::with_capacity(self.block_samples),
                );
                emit(block);
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Convert a normalized float sample to S16
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(tag: i16, arrival: Nanos) -> CapturedBlock {
        CapturedBlock {
            samples: vec![tag; 4],
            arrival,
        }
    }

    #[test]
    fn test_queue_preserves_order() {
        let (producer, consumer) = block_queue(4);
        assert!(producer.push(block(0, 10)));
        assert!(producer.push(block(1, 20)));
        assert_eq!(consumer.len(), 2);

        assert_eq!(consumer.pop().unwrap().arrival, 10);
        assert_eq!(consumer.pop().unwrap().arrival, 20);
        assert!(consumer.is_empty());
        assert_eq!(consumer.pushed_count(), 2);
    }

    #[test]
    fn test_producer_never_blocks_on_overflow() {
        let (producer, consumer) = block_queue(2);
        assert!(producer.push(block(0, 0)));
        assert!(producer.push(block(1, 1)));
        assert!(!producer.push(block(2, 2)));
        assert_eq!(consumer.overflow_count(), 1);
        assert_eq!(consumer.pop().unwrap().samples[0], 0);
    }

    #[test]
    fn test_consumer_sees_end_of_stream() {
        let (producer, consumer) = block_queue(2);
        producer.push(block(7, 70));
        drop(producer);
        assert_eq!(consumer.pop().unwrap().arrival, 70);
        assert!(consumer.pop().is_none());
    }

    #[test]
    fn test_pop_or_fail_wakes_on_error() {
        let (_producer, consumer) = block_queue(1);
        let (error_tx, error_rx) = bounded(1);

        let waker = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            error_tx.send("device unplugged").unwrap();
        });
        assert_eq!(consumer.pop_or_fail(&error_rx), Err("device unplugged"));
        waker.join().unwrap();
    }

    #[test]
    fn test_pop_or_fail_ignores_closed_error_channel() {
        let (producer, consumer) = block_queue(2);
        let (error_tx, error_rx) = bounded::<()>(1);
        drop(error_tx);

        producer.push(block(3, 30));
        drop(producer);
        assert_eq!(consumer.pop_or_fail(&error_rx).unwrap().unwrap().arrival, 30);
        assert_eq!(consumer.pop_or_fail(&error_rx), Ok(None));
    }

    #[test]
    fn test_assembler_emits_whole_blocks() {
        let mut assembler = BlockAssembler::new(4);
        let mut blocks = Vec::new();
        assembler.extend([1, 2, 3], |b| blocks.push(b));
        assert!(blocks.is_empty());
        assembler.extend([4, 5, 6, 7, 8, 9], |b| blocks.push(b));
        assert_eq!(blocks, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
        assert_eq!(assembler.pending(), 1);
    }

    #[test]
    fn test_f32_conversion() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), -i16::MAX);
        assert_eq!(f32_to_i16(0.5), 16384);
    }
}
