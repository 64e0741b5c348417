//! Receiving side: validate, demultiplex by stream, track sequence gaps
//!
//! Malformed datagrams (foreign traffic, wrong version, wrong layout) are
//! counted and skipped; they never end the receive loop.

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use crate::clock::{BlockTimeline, Nanos};
use crate::error::NetworkError;
use crate::protocol::{NetworkPacket, PacketLayout};

/// How a packet relates to the ones seen before it on its stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEvent {
    /// First packet of the stream
    First,
    /// Exactly the next expected number
    InOrder,
    /// Ahead of the expected number; `lost` packets were skipped
    Gap { lost: u32 },
    /// At or behind the last accepted number (duplicate or reordered)
    Late,
    /// The sender started counting again; tracking resumes from this packet
    Restarted,
}

/// Backward jumps larger than this are a sender restart, not reordering
pub const RESTART_WINDOW: u32 = 1024;

/// This many late packets in a row also count as a restart
pub const RESYNC_AFTER_LATE: u32 = 8;

/// Serial-number tracking for one stream, wrapping at u32
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    /// Highest accepted sequence number
    last: Option<u32>,
    received: u64,
    lost: u64,
    late: u64,
    restarts: u64,
    /// Late packets since the last accepted one
    late_run: u32,
}

impl SequenceTracker {
    pub fn observe(&mut self, sequence: u32) -> SequenceEvent {
        let Some(last) = self.last else {
            self.last = Some(sequence);
            self.received += 1;
            return SequenceEvent::First;
        };

        let delta = sequence.wrapping_sub(last) as i32;
        if delta <= 0 {
            let behind = delta.unsigned_abs();
            self.late_run += 1;
            if behind > RESTART_WINDOW || self.late_run >= RESYNC_AFTER_LATE {
                self.last = Some(sequence);
                self.received += 1;
                self.restarts += 1;
                self.late_run = 0;
                return SequenceEvent::Restarted;
            }
            self.late += 1;
            return SequenceEvent::Late;
        }

        self.last = Some(sequence);
        self.received += 1;
        self.late_run = 0;
        if delta == 1 {
            SequenceEvent::InOrder
        } else {
            let lost = (delta - 1) as u32;
            self.lost += lost as u64;
            SequenceEvent::Gap { lost }
        }
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn lost(&self) -> u64 {
        self.lost
    }

    pub fn late(&self) -> u64 {
        self.late
    }

    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    pub fn loss_rate(&self) -> f32 {
        if self.received == 0 {
            0.0
        } else {
            self.lost as f32 / (self.received + self.lost) as f32
        }
    }
}

/// A validated packet and what the receiver learned from it
#[derive(Debug, Clone)]
pub struct ReceivedPacket {
    pub packet: NetworkPacket,
    pub source: Option<SocketAddr>,
    pub event: SequenceEvent,
    /// Audible time of the previous in-order packet on this stream
    pub previous_audible_time: Option<Nanos>,
}

impl ReceivedPacket {
    /// Frame timestamps of the *previous* block, recovered by linear
    /// interpolation between its start and this packet's start.
    pub fn previous_block_timeline(&self, block_size: usize) -> Option<BlockTimeline> {
        self.previous_audible_time
            .map(|prev| BlockTimeline::between(prev, self.packet.audible_time, block_size))
    }
}

/// Receiver statistics
#[derive(Debug, Clone, Default)]
pub struct ReceiverStats {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub invalid_packets: u64,
    pub lost_packets: u64,
    pub late_packets: u64,
    pub restarts: u64,
    pub streams: usize,
}

#[derive(Debug, Default)]
struct StreamState {
    tracker: SequenceTracker,
    last_audible_time: Option<Nanos>,
}

/// Socket-free packet handling, one state per stream id
#[derive(Debug)]
pub struct PacketDemux {
    /// Expected channels and block size; other sizes are invalid
    layout: PacketLayout,
    /// Per-stream sequence and timing state, keyed by stream id
    streams: HashMap<u32, StreamState>,
    /// Valid packets across all streams
    packets_received: u64,
    /// Bytes of valid packets
    bytes_received: u64,
    /// Datagrams that failed to decode
    invalid_packets: u64,
}

impl PacketDemux {
    pub fn new(layout: PacketLayout) -> Self {
        Self {
            layout,
            streams: HashMap::new(),
            packets_received: 0,
            bytes_received: 0,
            invalid_packets: 0,
        }
    }

    /// Process one datagram. `None` if it was discarded.
    pub fn handle_datagram(
        &mut self,
        data: &[u8],
        source: Option<SocketAddr>,
    ) -> Option<ReceivedPacket> {
        let packet = match NetworkPacket::decode(self.layout, data) {
            Ok(packet) => packet,
            Err(e) => {
                self.invalid_packets += 1;
                tracing::debug!("Discarding datagram from {:?}: {}", source, e);
                return None;
            }
        };

        self.packets_received += 1;
        self.bytes_received += data.len() as u64;

        let state = self.streams.entry(packet.stream_id).or_insert_with(|| {
            tracing::info!("New stream {} detected", packet.stream_id);
            StreamState::default()
        });

        let event = state.tracker.observe(packet.sequence_number);
        let previous_audible_time = match event {
            SequenceEvent::InOrder => state.last_audible_time,
            _ => None,
        };
        match event {
            SequenceEvent::Gap { lost } => {
                tracing::warn!(
                    "Stream {}: {} packet(s) lost before #{}",
                    packet.stream_id,
                    lost,
                    packet.sequence_number
                );
            }
            SequenceEvent::Late => {
                tracing::debug!(
                    "Stream {}: late packet #{}",
                    packet.stream_id,
                    packet.sequence_number
                );
            }
            SequenceEvent::Restarted => {
                tracing::info!(
                    "Stream {} restarted at #{}",
                    packet.stream_id,
                    packet.sequence_number
                );
            }
            _ => {}
        }
        if event != SequenceEvent::Late {
            state.last_audible_time = Some(packet.audible_time);
        }

        Some(ReceivedPacket {
            packet,
            source,
            event,
            previous_audible_time,
        })
    }

    pub fn tracker(&self, stream_id: u32) -> Option<&SequenceTracker> {
        self.streams.get(&stream_id).map(|s| &s.tracker)
    }

    /// Trackers of every stream seen so far
    pub fn trackers(&self) -> impl Iterator<Item = (u32, &SequenceTracker)> {
        self.streams.iter().map(|(id, s)| (*id, &s.tracker))
    }

    pub fn stats(&self) -> ReceiverStats {
        ReceiverStats {
            packets_received: self.packets_received,
            bytes_received: self.bytes_received,
            invalid_packets: self.invalid_packets,
            lost_packets: self.streams.values().map(|s| s.tracker.lost()).sum(),
            late_packets: self.streams.values().map(|s| s.tracker.late()).sum(),
            restarts: self.streams.values().map(|s| s.tracker.restarts()).sum(),
            streams: self.streams.len(),
        }
    }

    pub fn layout(&self) -> PacketLayout {
        self.layout
    }
}

/// Blocking packet receiver over a UDP socket
pub struct PacketReceiver {
    socket: UdpSocket,
    /// Receive buffer, one byte larger than a valid packet
    buf: Vec<u8>,
    demux: PacketDemux,
}

impl PacketReceiver {
    pub fn new(socket: UdpSocket, layout: PacketLayout) -> Self {
        Self {
            socket,
            // One spare byte so oversized datagrams are detected, not truncated
            buf: vec![0; layout.packet_size() + 1],
            demux: PacketDemux::new(layout),
        }
    }

    /// Wait for the next valid packet, skipping malformed ones.
    ///
    /// With a read timeout set, returns `Ok(None)` when it expires.
    pub fn recv(&mut self) -> Result<Option<ReceivedPacket>, NetworkError> {
        loop {
            let (len, source) = match self.socket.recv_from(&mut self.buf) {
                Ok(received) => received,
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    return Ok(None)
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(NetworkError::ReceiveFailed(e)),
            };

            if let Some(received) = self.demux.handle_datagram(&self.buf[..len], Some(source)) {
                return Ok(Some(received));
            }
        }
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), NetworkError> {
        self.socket
            .set_read_timeout(timeout)
            .map_err(|source| NetworkError::Setup {
                op: "set_read_timeout",
                source,
            })
    }

    pub fn stats(&self) -> ReceiverStats {
        self.demux.stats()
    }

    pub fn demux(&self) -> &PacketDemux {
        &self.demux
    }
}
