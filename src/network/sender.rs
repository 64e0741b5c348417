//! Sending side of the pipeline
//!
//! For every block: lock its arrival time through the stream clock, frame
//! it with the block-start timestamp and the next sequence number, and
//! send it as one datagram.

use bytes::BytesMut;
use std::net::{SocketAddr, UdpSocket};

use crate::clock::{JitterStats, Nanos, StreamClock, TimestampHistory, TimingRecord};
use crate::config::AppConfig;
use crate::error::{NetworkError, Result};
use crate::protocol::{NetworkPacket, PacketLayout, StreamFramer};

/// What went out for one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentBlock {
    pub sequence_number: u32,
    pub audible_time: Nanos,
}

/// Sender statistics
#[derive(Debug, Clone, Default)]
pub struct SenderStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub current_bandwidth: f64,
    pub period_estimate: f64,
    pub jitter: Option<JitterStats>,
}

/// One outgoing stream: clock, framer and socket
pub struct AudioSender {
    /// Multicast socket, already configured for TTL and interface
    socket: UdpSocket,
    /// Group address and port every packet goes to
    destination: SocketAddr,
    /// Loop filter and epoch for this stream
    clock: StreamClock,
    /// Stream id, layout and sequence counter
    framer: StreamFramer,
    /// Recent measured vs. locked times
    history: TimestampHistory,
    /// Encode buffer reused across packets
    scratch: BytesMut,
    packets_sent: u64,
    bytes_sent: u64,
}

impl AudioSender {
    pub fn new(
        socket: UdpSocket,
        destination: SocketAddr,
        clock: StreamClock,
        framer: StreamFramer,
        history_capacity: usize,
    ) -> Self {
        let scratch = BytesMut::with_capacity(framer.layout().packet_size());
        Self {
            socket,
            destination,
            clock,
            framer,
            history: TimestampHistory::new(history_capacity),
            scratch,
            packets_sent: 0,
            bytes_sent: 0,
        }
    }

    pub fn from_config(
        socket: UdpSocket,
        destination: SocketAddr,
        config: &AppConfig,
    ) -> Result<Self> {
        Ok(Self::new(
            socket,
            destination,
            StreamClock::from_config(&config.stream, &config.dll)?,
            StreamFramer::new(config.stream.stream_id, config.stream.layout()),
            config.ingest.history_capacity,
        ))
    }

    /// Lock and frame one block without sending it
    pub fn frame_block(&mut self, samples: &[i16], measured: Nanos) -> Result<NetworkPacket> {
        let timeline = self.clock.lock_block(measured)?;
        let audible_time = timeline.first();
        let packet = self.framer.frame(audible_time, samples);

        self.history.record(TimingRecord {
            sequence: packet.sequence_number,
            measured,
            locked: audible_time,
        });
        tracing::trace!(
            "Block {} measured {} locked {} (residual {} ns)",
            packet.sequence_number,
            measured,
            audible_time,
            measured - audible_time
        );
        Ok(packet)
    }

    /// Lock, frame and transmit one block
    pub fn send_block(&mut self, samples: &[i16], measured: Nanos) -> Result<SentBlock> {
        let packet = self.frame_block(samples, measured)?;
        self.transmit(&packet)?;
        Ok(SentBlock {
            sequence_number: packet.sequence_number,
            audible_time: packet.audible_time,
        })
    }

    fn transmit(&mut self, packet: &NetworkPacket) -> std::result::Result<(), NetworkError> {
        self.scratch.clear();
        packet.encode_into(&mut self.scratch);

        let sent = self
            .socket
            .send_to(&self.scratch, self.destination)
            .map_err(NetworkError::SendFailed)?;
        if sent != self.scratch.len() {
            return Err(NetworkError::ShortSend {
                sent,
                expected: self.scratch.len(),
            });
        }

        self.packets_sent += 1;
        self.bytes_sent += sent as u64;
        Ok(())
    }

    pub fn stats(&self) -> SenderStats {
        let dll = self.clock.dll();
        SenderStats {
            packets_sent: self.packets_sent,
            bytes_sent: self.bytes_sent,
            current_bandwidth: dll.current_bandwidth(),
            period_estimate: dll.period_estimate(),
            jitter: self.history.jitter(),
        }
    }

    /// Timing records kept so far, oldest first. Empties the history.
    pub fn take_history(&mut self) -> Vec<TimingRecord> {
        self.history.drain()
    }

    pub fn layout(&self) -> PacketLayout {
        self.framer.layout()
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NANOS_PER_SEC;

    fn loopback_sender(config: &AppConfig) -> (AudioSender, UdpSocket) {
        let sink = UdpSocket::bind("127.0.0.1:0").unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let sender = AudioSender::from_config(socket, sink.local_addr().unwrap(), config).unwrap();
        (sender, sink)
    }

    #[test]
    fn test_frame_block_stamps_and_counts() {
        let config = AppConfig::default();
        let (mut sender, _sink) = loopback_sender(&config);
        let samples = vec![0i16; config.stream.layout().samples()];
        let start = 1_700_000_000_000_000_000;
        let period = NANOS_PER_SEC * 256 / 48000;

        let first = sender.frame_block(&samples, start).unwrap();
        assert_eq!(first.sequence_number, 0);
        assert_eq!(first.audible_time, start);

        let second = sender.frame_block(&samples, start + period).unwrap();
        assert_eq!(second.sequence_number, 1);
        assert!((second.audible_time - (start + period)).abs() <= 1);

        let history = sender.take_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].residual(), 0);
    }

    #[test]
    fn test_send_block_reaches_destination() {
        let config = AppConfig::default();
        let (mut sender, sink) = loopback_sender(&config);
        let samples: Vec<i16> = (0..512).map(|i| i as i16).collect();

        let sent = sender.send_block(&samples, 5_000).unwrap();
        assert_eq!(sent.sequence_number, 0);

        let mut buf = [0u8; 2048];
        let (len, _) = sink.recv_from(&mut buf).unwrap();
        let packet = NetworkPacket::decode(sender.layout(), &buf[..len]).unwrap();
        assert_eq!(packet.audible_time, 5_000);
        assert_eq!(packet.audio, samples);

        let stats = sender.stats();
        assert_eq!(stats.packets_sent, 1);
        assert_eq!(stats.bytes_sent, 1048);
        assert_eq!(stats.current_bandwidth, config.dll.initial_bandwidth);
    }
}
