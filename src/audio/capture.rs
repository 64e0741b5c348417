//! Audio capture from an input device
//!
//! The cpal stream lives on its own thread. Its callback converts samples
//! to S16, cuts them into whole blocks and pushes each block with its
//! wall-clock arrival time into a block queue. The sending thread consumes
//! that queue through [`BlockSource`].

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::buffer::{block_queue, f32_to_i16, BlockAssembler, CapturedBlock};
use super::device::find_input_device;
use super::source::{BlockSource, QueueSource};
use crate::clock::{Clock, Nanos};
use crate::config::StreamSettings;
use crate::error::{AudioError, Result};

/// Blocks buffered between the callback and the sender
const CAPTURE_QUEUE_BLOCKS: usize = 8;

/// Capture from one input device
pub struct DeviceCapture {
    /// Device id from [`super::list_input_devices`]; default input if `None`
    device_id: Option<String>,
    /// cpal stream configuration
    config: StreamConfig,
    /// Interleaved samples per block (channels * block size)
    block_samples: usize,
    /// Stamps each block as it leaves the callback
    clock: Arc<dyn Clock>,
    /// Whether the capture thread should keep the stream alive
    running: Arc<AtomicBool>,
    /// Capture thread handle
    thread_handle: Option<JoinHandle<()>>,
    /// Captured blocks and stream errors, once started
    source: Option<QueueSource>,
}

impl DeviceCapture {
    /// Capture with the stream shape from `settings`. `device_id` of `None`
    /// uses the default input.
    pub fn new(device_id: Option<&str>, settings: &StreamSettings, clock: Arc<dyn Clock>) -> Self {
        let config = StreamConfig {
            channels: settings.channels,
            sample_rate: cpal::SampleRate(settings.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(settings.block_size as u32),
        };

        Self {
            device_id: device_id.map(str::to_string),
            config,
            block_samples: settings.layout().samples(),
            clock,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            source: None,
        }
    }

    /// Start capturing. Waits until the stream is playing or has failed.
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let (ready_tx, ready_rx) = bounded::<std::result::Result<(), AudioError>>(1);
        let (producer, consumer) = block_queue(CAPTURE_QUEUE_BLOCKS);

        let device_id = self.device_id.clone();
        let config = self.config.clone();
        let block_samples = self.block_samples;
        let clock = self.clock.clone();
        let running = self.running.clone();

        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let device = match find_input_device(device_id.as_deref()) {
                    Ok(device) => device,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let mut assembler = BlockAssembler::new(block_samples);
                let stream = device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        assembler.extend(data.iter().copied().map(f32_to_i16), |samples| {
                            let arrival: Nanos = clock.now_ns();
                            producer.push(CapturedBlock { samples, arrival });
                        });
                    },
                    move |err| {
                        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(AudioError::CpalError(e.to_string())));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::CpalError(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Keep the stream alive while running
                while running.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
                // Dropping the stream here also drops the producer, which
                // ends the consumer's stream
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.thread_handle = Some(handle);

        let started = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(AudioError::StreamError("capture thread exited".into())));
        if let Err(e) = started {
            self.stop();
            return Err(e.into());
        }

        tracing::info!(
            "Capturing {} ch @ {} Hz, {} samples per block",
            self.config.channels,
            self.config.sample_rate.0,
            self.block_samples
        );
        self.source = Some(QueueSource::with_errors(consumer, error_rx));
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Blocks dropped because the sender fell behind
    pub fn overflow_count(&self) -> usize {
        self.source
            .as_ref()
            .map_or(0, |s| s.consumer().overflow_count())
    }
}

impl BlockSource for DeviceCapture {
    /// A device stream never ends on its own, so the queue closing is
    /// reported as [`AudioError::Disconnected`].
    fn next_block(&mut self, samples: &mut [i16]) -> Result<Option<Nanos>> {
        let source = self.source.as_mut().ok_or(AudioError::Disconnected)?;
        match source.next_block(samples)? {
            Some(arrival) => Ok(Some(arrival)),
            None => Err(AudioError::Disconnected.into()),
        }
    }
}

impl Drop for DeviceCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
