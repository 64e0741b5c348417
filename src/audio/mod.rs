//! Audio ingestion: device capture, pipe ingestion and block hand-off

pub mod buffer;
pub mod capture;
pub mod device;
pub mod ingest;
pub mod source;

pub use buffer::{block_queue, BlockConsumer, BlockProducer, CapturedBlock};
pub use capture::DeviceCapture;
pub use device::{find_input_device, list_input_devices, AudioDeviceInfo};
pub use ingest::{required_capacity, BlockReader, PIPE_PAGE_SIZE};
pub use source::{BlockSource, FifoSource, QueueSource};
