use std::io::Cursor;
use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

use lan_audio_sync::{
    audio::{BlockSource, FifoSource},
    clock::ManualClock,
    config::AppConfig,
    constants::NANOS_PER_SEC,
    network::{AudioSender, PacketReceiver, SequenceEvent},
    protocol::NetworkPacket,
};

const BLOCKS: usize = 50;

fn pcm_bytes(blocks: usize, samples_per_block: usize) -> Vec<u8> {
    (0..blocks * samples_per_block)
        .flat_map(|i| ((i % 1000) as i16).to_le_bytes())
        .collect()
}

#[test]
fn test_fifo_to_receiver_over_loopback() {
    let mut config = AppConfig::default();
    // 240 frames at 48 kHz is exactly 5 ms
    config.stream.block_size = 240;
    let layout = config.stream.layout();

    let receiver_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let destination = receiver_socket.local_addr().unwrap();
    let mut receiver = PacketReceiver::new(receiver_socket, layout);
    receiver
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();

    let send_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let mut sender = AudioSender::from_config(send_socket, destination, &config).unwrap();

    // Blocks arrive exactly one period apart
    let start = 1_700_000_000_000_000_000;
    let period = NANOS_PER_SEC * config.stream.block_size as i64 / config.stream.sample_rate as i64;
    let clock = Arc::new(ManualClock::new(start));
    let mut source = FifoSource::new(
        Cursor::new(pcm_bytes(BLOCKS, layout.samples())),
        layout.samples(),
        clock.clone(),
    );

    // A stray datagram on the port must not disturb the stream
    let stray = UdpSocket::bind("127.0.0.1:0").unwrap();
    stray.send_to(b"not an audio packet", destination).unwrap();

    let mut samples = vec![0i16; layout.samples()];
    let mut sent = Vec::new();
    let mut received = Vec::new();
    while let Some(measured) = source.next_block(&mut samples).unwrap() {
        sent.push(sender.send_block(&samples, measured).unwrap());
        received.push(receiver.recv().unwrap().expect("packet within timeout"));
        clock.advance(period);
    }
    assert_eq!(sent.len(), BLOCKS);
    assert_eq!(received.len(), BLOCKS);

    for (k, (got, want)) in received.iter().zip(&sent).enumerate() {
        assert_eq!(got.packet.sequence_number, k as u32);
        assert_eq!(got.packet.sequence_number, want.sequence_number);
        assert_eq!(got.packet.audible_time, want.audible_time);
        let expected_event = if k == 0 {
            SequenceEvent::First
        } else {
            SequenceEvent::InOrder
        };
        assert_eq!(got.event, expected_event);
    }

    // Noise-free arrivals lock to within rounding of the true block starts
    for (k, block) in sent.iter().enumerate() {
        let ideal = start + k as i64 * period;
        assert!(
            (block.audible_time - ideal).abs() <= 2,
            "block {} off by {} ns",
            k,
            block.audible_time - ideal
        );
    }

    let first = &received[0].packet;
    assert_eq!(first.audio[..3], [0, 1, 2]);

    let stats = receiver.stats();
    assert_eq!(stats.invalid_packets, 1);
    assert_eq!(stats.lost_packets, 0);
    assert_eq!(stats.streams, 1);
}

#[test]
fn test_same_block_frames_identically() {
    let config = AppConfig::default();
    let layout = config.stream.layout();
    let samples: Vec<i16> = (0..layout.samples()).map(|i| i as i16).collect();

    let a = NetworkPacket::frame(layout, 3, 17, 123_456_789, &samples);
    let b = NetworkPacket::frame(layout, 3, 17, 123_456_789, &samples);
    assert_eq!(a.encode(), b.encode());
}
