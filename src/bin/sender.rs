//! Audio Sender Application
//!
//! Reads audio one block at a time from a FIFO or an input device, locks
//! each block to the wall clock and multicasts it.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_audio_sync::{
    audio::{ingest, list_input_devices, BlockSource, DeviceCapture, FifoSource},
    clock::{Clock, SystemClock},
    config::AppConfig,
    network::{create_sender_socket, group_addr, AudioSender},
};

#[derive(Parser, Debug)]
#[command(name = "sender", about = "Multicast a clock-locked audio stream")]
struct Args {
    /// Config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read raw S16LE audio from this FIFO instead of an input device
    #[arg(long)]
    fifo: Option<PathBuf>,

    /// Input device id (see --list-devices); default input if omitted
    #[arg(long)]
    device: Option<String>,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,

    #[arg(long)]
    stream_id: Option<u32>,

    /// Multicast group
    #[arg(long)]
    group: Option<Ipv4Addr>,

    #[arg(long)]
    port: Option<u16>,

    /// Local interface address for multicast
    #[arg(long)]
    interface: Option<Ipv4Addr>,

    /// Write the block timing history as JSON here when the stream ends
    #[arg(long)]
    history_out: Option<PathBuf>,

    /// Log statistics every N blocks
    #[arg(long, default_value_t = 1000)]
    stats_every: u64,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.list_devices {
        println!("\n=== Available Input Devices ===");
        for device in list_input_devices() {
            let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
            println!("  {}{}:", device.name, default_marker);
            println!("    ID: {}", device.id);
            println!("    Sample rates: {:?}", device.sample_rates);
            println!("    Channels: {:?}", device.channels);
        }
        return Ok(());
    }

    let mut config =
        AppConfig::load_or_default(args.config.as_deref()).context("loading configuration")?;
    if let Some(stream_id) = args.stream_id {
        config.stream.stream_id = stream_id;
    }
    if let Some(group) = args.group {
        config.network.multicast_addr = group;
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }
    if let Some(interface) = args.interface {
        config.network.interface = interface;
    }
    if args.fifo.is_some() {
        config.ingest.fifo_path = args.fifo.clone();
    }
    config.validate().context("validating configuration")?;

    tracing::info!("Starting LAN Audio Sender");

    let socket = create_sender_socket(&config.network).context("opening multicast socket")?;
    let mut sender = AudioSender::from_config(socket, group_addr(&config.network), &config)
        .context("setting up stream clock")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let layout = config.stream.layout();

    let mut source: Box<dyn BlockSource> = match &config.ingest.fifo_path {
        Some(path) => {
            #[cfg(unix)]
            if config.ingest.create_fifo {
                ingest::create_fifo(path).context("creating FIFO")?;
            }
            tracing::info!("Waiting for a writer on {}", path.display());
            let file = ingest::open_fifo(path, config.stream.channels, config.stream.block_size)
                .context("opening FIFO")?;
            Box::new(FifoSource::new(file, layout.samples(), clock))
        }
        None => {
            let mut capture = DeviceCapture::new(args.device.as_deref(), &config.stream, clock);
            capture.start().context("starting audio capture")?;
            Box::new(capture)
        }
    };

    tracing::info!(
        "Streaming {} ch x {} frames @ {} Hz as stream {} to {}",
        config.stream.channels,
        config.stream.block_size,
        config.stream.sample_rate,
        config.stream.stream_id,
        sender.destination()
    );

    let mut samples = vec![0i16; layout.samples()];
    loop {
        let Some(measured) = source.next_block(&mut samples).context("reading audio block")? else {
            tracing::info!("Audio source ended");
            break;
        };

        let sent = sender
            .send_block(&samples, measured)
            .context("sending audio block")?;

        if args.stats_every > 0 && (sent.sequence_number as u64 + 1) % args.stats_every == 0 {
            let stats = sender.stats();
            let jitter = stats
                .jitter
                .map(|j| format!("max {} ns, mean {:.0} ns", j.max_abs_ns, j.mean_abs_ns))
                .unwrap_or_else(|| "n/a".into());
            tracing::info!(
                "Stats: {} packets, {:.1} KB sent, loop bw {:.3} Hz, period {:.3} us, jitter {}",
                stats.packets_sent,
                stats.bytes_sent as f64 / 1024.0,
                stats.current_bandwidth,
                stats.period_estimate * 1e6,
                jitter
            );
        }
    }

    if let Some(path) = &args.history_out {
        let history = sender.take_history();
        let file = std::fs::File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(file, &history).context("writing timing history")?;
        tracing::info!("Wrote {} timing records to {}", history.len(), path.display());
    }

    Ok(())
}
