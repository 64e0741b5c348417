//! Network subsystem for multicast audio transport

pub mod receiver;
pub mod sender;
pub mod udp;

pub use receiver::{PacketDemux, PacketReceiver, ReceivedPacket, ReceiverStats, SequenceEvent, SequenceTracker};
pub use sender::{AudioSender, SenderStats, SentBlock};
pub use udp::{create_receiver_socket, create_sender_socket, group_addr};
