//! Sources of whole audio blocks

use std::fs::File;
use std::io::Read;
use crossbeam_channel::Receiver;
use std::sync::Arc;

use super::buffer::BlockConsumer;
use super::ingest::BlockReader;
use crate::clock::{Clock, Nanos};
use crate::error::{AudioError, Error, Result};

/// Something that delivers captured audio one block at a time
pub trait BlockSource {
    /// Block until the next full block is in `samples` and return the wall
    /// clock time correlated with its arrival. `None` at end of stream.
    fn next_block(&mut self, samples: &mut [i16]) -> Result<Option<Nanos>>;
}

/// Raw S16LE audio read from a pipe or any other byte stream.
///
/// The arrival time is read from the clock as soon as the last byte of
/// the block has been read.
pub struct FifoSource<R = File> {
    reader: BlockReader<R>,
    clock: Arc<dyn Clock>,
}

impl<R: Read> FifoSource<R> {
    pub fn new(inner: R, block_samples: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            reader: BlockReader::new(inner, block_samples),
            clock,
        }
    }
}

impl<R: Read> BlockSource for FifoSource<R> {
    fn next_block(&mut self, samples: &mut [i16]) -> Result<Option<Nanos>> {
        if self.reader.read_block(samples)? {
            Ok(Some(self.clock.now_ns()))
        } else {
            tracing::debug!(
                "Writer closed the stream after {} short reads",
                self.reader.short_reads()
            );
            Ok(None)
        }
    }
}

/// Blocks handed over from a capture thread through a block queue
pub struct QueueSource {
    consumer: BlockConsumer,
    /// Fatal errors from the producing side, reported instead of waiting
    errors: Option<Receiver<AudioError>>,
}

impl QueueSource {
    pub fn new(consumer: BlockConsumer) -> Self {
        Self {
            consumer,
            errors: None,
        }
    }

    /// Like [`QueueSource::new`], but a message on `errors` ends the wait
    /// for the next block with that error.
    pub fn with_errors(consumer: BlockConsumer, errors: Receiver<AudioError>) -> Self {
        Self {
            consumer,
            errors: Some(errors),
        }
    }

    pub fn consumer(&self) -> &BlockConsumer {
        &self.consumer
    }
}

impl BlockSource for QueueSource {
    fn next_block(&mut self, samples: &mut [i16]) -> Result<Option<Nanos>> {
        let next = match &self.errors {
            Some(errors) => self.consumer.pop_or_fail(errors)?,
            None => self.consumer.pop(),
        };
        let Some(block) = next else {
            return Ok(None);
        };
        if block.samples.len() != samples.len() {
            return Err(Error::Audio(AudioError::UnsupportedFormat(format!(
                "captured block has {} samples, expected {}",
                block.samples.len(),
                samples.len()
            ))));
        }
        samples.copy_from_slice(&block.samples);
        Ok(Some(block.arrival))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::{block_queue, CapturedBlock};
    use crate::clock::ManualClock;
    use std::io::Cursor;

    #[test]
    fn test_fifo_source_stamps_blocks() {
        let clock = Arc::new(ManualClock::new(1_000));
        let data: Vec<u8> = [1i16, 2, 3, 4].iter().flat_map(|s| s.to_le_bytes()).collect();
        let mut source = FifoSource::new(Cursor::new(data), 2, clock.clone());

        let mut block = [0i16; 2];
        assert_eq!(source.next_block(&mut block).unwrap(), Some(1_000));
        assert_eq!(block, [1, 2]);
        clock.advance(500);
        assert_eq!(source.next_block(&mut block).unwrap(), Some(1_500));
        assert_eq!(block, [3, 4]);
        assert_eq!(source.next_block(&mut block).unwrap(), None);
    }

    #[test]
    fn test_queue_source_keeps_capture_time() {
        let (producer, consumer) = block_queue(4);
        producer.push(CapturedBlock {
            samples: vec![9, 9],
            arrival: 42,
        });
        drop(producer);

        let mut source = QueueSource::new(consumer);
        let mut block = [0i16; 2];
        assert_eq!(source.next_block(&mut block).unwrap(), Some(42));
        assert_eq!(block, [9, 9]);
        assert_eq!(source.next_block(&mut block).unwrap(), None);
    }

    #[test]
    fn test_queue_source_rejects_wrong_shape() {
        let (producer, consumer) = block_queue(4);
        producer.push(CapturedBlock {
            samples: vec![1, 2, 3],
            arrival: 0,
        });
        let mut source = QueueSource::new(consumer);
        let mut block = [0i16; 2];
        assert!(matches!(
            source.next_block(&mut block),
            Err(Error::Audio(AudioError::UnsupportedFormat(_)))
        ));
    }

    #[test]
    fn test_queue_source_reports_stream_error_while_waiting() {
        let (_producer, consumer) = block_queue(4);
        let (error_tx, error_rx) = crossbeam_channel::bounded(4);
        let mut source = QueueSource::with_errors(consumer, error_rx);

        let failer = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            error_tx
                .send(AudioError::StreamError("device lost".into()))
                .unwrap();
        });

        let mut block = [0i16; 2];
        assert!(matches!(
            source.next_block(&mut block),
            Err(Error::Audio(AudioError::StreamError(_)))
        ));
        failer.join().unwrap();
    }
}
