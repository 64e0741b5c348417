//! Fixed-layout audio packet
//!
//! ```text
//! offset  size  field
//!      0     4  magic            b"SSND"
//!      4     4  protocol_version u32 LE
//!      8     4  stream_id        u32 LE
//!     12     4  sequence_number  u32 LE
//!     16     8  audible_time     i64 LE, ns of the block's first frame
//!     24   2*N  audio            i16 LE interleaved, N = channels * block_size
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::clock::Nanos;
use crate::error::PacketError;

pub const PACKET_MAGIC: [u8; 4] = *b"SSND";
pub const PROTOCOL_VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 24;
pub const BYTES_PER_SAMPLE: usize = std::mem::size_of::<i16>();

/// Shape of the audio payload, fixed for a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketLayout {
    pub channels: u16,
    pub block_size: usize,
}

impl PacketLayout {
    pub fn new(channels: u16, block_size: usize) -> Self {
        Self {
            channels,
            block_size,
        }
    }

    /// Interleaved samples per packet
    pub fn samples(&self) -> usize {
        self.channels as usize * self.block_size
    }

    /// Total wire size in bytes
    pub fn packet_size(&self) -> usize {
        HEADER_SIZE + self.samples() * BYTES_PER_SAMPLE
    }
}

/// One block of audio with its reconciled start time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPacket {
    pub magic: [u8; 4],
    pub protocol_version: u32,
    pub stream_id: u32,
    pub sequence_number: u32,
    pub audible_time: Nanos,
    pub audio: Vec<i16>,
}

impl NetworkPacket {
    /// Build a packet for one block.
    ///
    /// # Panics
    ///
    /// If `samples` does not hold exactly `layout.samples()` values.
    pub fn frame(
        layout: PacketLayout,
        stream_id: u32,
        sequence_number: u32,
        audible_time: Nanos,
        samples: &[i16],
    ) -> Self {
        assert_eq!(
            samples.len(),
            layout.samples(),
            "block must hold channels * block_size samples"
        );
        Self {
            magic: PACKET_MAGIC,
            protocol_version: PROTOCOL_VERSION,
            stream_id,
            sequence_number,
            audible_time,
            audio: samples.to_vec(),
        }
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.audio.len() * BYTES_PER_SAMPLE
    }

    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_slice(&self.magic);
        buf.put_u32_le(self.protocol_version);
        buf.put_u32_le(self.stream_id);
        buf.put_u32_le(self.sequence_number);
        buf.put_i64_le(self.audible_time);
        for &sample in &self.audio {
            buf.put_i16_le(sample);
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Parse and validate a received datagram
    pub fn decode(layout: PacketLayout, mut data: &[u8]) -> Result<Self, PacketError> {
        if data.len() != layout.packet_size() {
            return Err(PacketError::WrongSize {
                got: data.len(),
                expected: layout.packet_size(),
            });
        }

        let mut magic = [0u8; 4];
        data.copy_to_slice(&mut magic);
        if magic != PACKET_MAGIC {
            return Err(PacketError::BadMagic(magic));
        }

        let protocol_version = data.get_u32_le();
        if protocol_version != PROTOCOL_VERSION {
            return Err(PacketError::VersionMismatch {
                got: protocol_version,
                expected: PROTOCOL_VERSION,
            });
        }

        let stream_id = data.get_u32_le();
        let sequence_number = data.get_u32_le();
        let audible_time = data.get_i64_le();
        let audio = (0..layout.samples()).map(|_| data.get_i16_le()).collect();

        Ok(Self {
            magic,
            protocol_version,
            stream_id,
            sequence_number,
            audible_time,
            audio,
        })
    }
}

/// Per-stream packet counter, wrapping at u32
#[derive(Debug, Clone, Default)]
pub struct SequenceCounter {
    next: u32,
}

impl SequenceCounter {
    pub fn starting_at(next: u32) -> Self {
        Self { next }
    }

    /// Hand out the current number and move to the next
    pub fn advance(&mut self) -> u32 {
        let current = self.next;
        self.next = self.next.wrapping_add(1);
        current
    }

    pub fn peek(&self) -> u32 {
        self.next
    }
}

/// Frames consecutive blocks of one outgoing stream
#[derive(Debug, Clone)]
pub struct StreamFramer {
    stream_id: u32,
    layout: PacketLayout,
    sequence: SequenceCounter,
}

impl StreamFramer {
    pub fn new(stream_id: u32, layout: PacketLayout) -> Self {
        Self {
            stream_id,
            layout,
            sequence: SequenceCounter::default(),
        }
    }

    pub fn frame(&mut self, audible_time: Nanos, samples: &[i16]) -> NetworkPacket {
        let sequence_number = self.sequence.advance();
        NetworkPacket::frame(
            self.layout,
            self.stream_id,
            sequence_number,
            audible_time,
            samples,
        )
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    pub fn layout(&self) -> PacketLayout {
        self.layout
    }

    pub fn next_sequence(&self) -> u32 {
        self.sequence.peek()
    }
}
