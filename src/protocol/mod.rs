//! Wire protocol shared by sender and receivers

pub mod packet;

pub use packet::{
    NetworkPacket, PacketLayout, SequenceCounter, StreamFramer, BYTES_PER_SAMPLE, HEADER_SIZE,
    PACKET_MAGIC, PROTOCOL_VERSION,
};
