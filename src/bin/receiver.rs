//! Audio Receiver Application
//!
//! Joins the multicast group and writes every valid packet as one JSON
//! line, to stdout or a file.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_audio_sync::{
    config::AppConfig,
    network::{create_receiver_socket, PacketReceiver, ReceivedPacket, SequenceEvent},
};

#[derive(Parser, Debug)]
#[command(name = "receiver", about = "Dump a multicast audio stream as JSON lines")]
struct Args {
    /// Config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Multicast group
    #[arg(long)]
    group: Option<Ipv4Addr>,

    #[arg(long)]
    port: Option<u16>,

    /// Local interface address to join the group on
    #[arg(long)]
    interface: Option<Ipv4Addr>,

    /// Output file; stdout if omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stop after this many packets
    #[arg(long)]
    count: Option<u64>,

    /// Omit sample data from the output
    #[arg(long)]
    headers_only: bool,

    /// Add the interpolated frame times of the previous block to each record
    #[arg(long)]
    frame_times: bool,
}

#[derive(Serialize)]
struct PacketRecord<'a> {
    magic: String,
    protocol_version: u32,
    stream_id: u32,
    packet_number: u32,
    audible_time: i64,
    event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_frame_times: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio: Option<&'a [i16]>,
}

impl<'a> PacketRecord<'a> {
    fn new(received: &'a ReceivedPacket, args: &Args, block_size: usize) -> Self {
        let packet = &received.packet;
        let previous_frame_times = if args.frame_times {
            received
                .previous_block_timeline(block_size)
                .map(|timeline| timeline.collect())
        } else {
            None
        };
        Self {
            magic: String::from_utf8_lossy(&packet.magic).into_owned(),
            protocol_version: packet.protocol_version,
            stream_id: packet.stream_id,
            packet_number: packet.sequence_number,
            audible_time: packet.audible_time,
            event: match received.event {
                SequenceEvent::First => "first",
                SequenceEvent::InOrder => "in_order",
                SequenceEvent::Gap { .. } => "gap",
                SequenceEvent::Late => "late",
                SequenceEvent::Restarted => "restarted",
            },
            previous_frame_times,
            audio: (!args.headers_only).then_some(packet.audio.as_slice()),
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config =
        AppConfig::load_or_default(args.config.as_deref()).context("loading configuration")?;
    if let Some(group) = args.group {
        config.network.multicast_addr = group;
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }
    if let Some(interface) = args.interface {
        config.network.interface = interface;
    }
    config.validate().context("validating configuration")?;

    tracing::info!("Starting LAN Audio Receiver");

    let socket = create_receiver_socket(&config.network).context("joining multicast group")?;
    let mut receiver = PacketReceiver::new(socket, config.stream.layout());
    receiver
        .set_read_timeout(Some(Duration::from_secs(1)))
        .context("configuring socket")?;

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };

    tracing::info!(
        "Listening on {}:{}",
        config.network.multicast_addr,
        config.network.port
    );

    let block_size = config.stream.block_size;
    let mut written = 0u64;
    let mut last_stats_time = Instant::now();

    while args.count.map_or(true, |count| written < count) {
        if let Some(received) = receiver.recv().context("receiving packet")? {
            serde_json::to_writer(&mut out, &PacketRecord::new(&received, &args, block_size))
                .context("writing packet")?;
            out.write_all(b"\n").context("writing packet")?;
            written += 1;
        } else {
            out.flush().context("flushing output")?;
        }

        // Periodic stats
        if last_stats_time.elapsed() >= Duration::from_secs(5) {
            last_stats_time = Instant::now();
            let stats = receiver.stats();
            tracing::info!(
                "Receiver stats: {} packets, {} bytes, {} invalid, {} lost, {} late, {} restart(s), {} stream(s)",
                stats.packets_received,
                stats.bytes_received,
                stats.invalid_packets,
                stats.lost_packets,
                stats.late_packets,
                stats.restarts,
                stats.streams
            );
            for (stream_id, tracker) in receiver.demux().trackers() {
                tracing::info!(
                    "  Stream {}: {} received, {:.2}% loss",
                    stream_id,
                    tracker.received(),
                    tracker.loss_rate() * 100.0
                );
            }
        }
    }

    out.flush().context("flushing output")?;
    Ok(())
}
