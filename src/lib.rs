//! # LAN Audio Sync
//!
//! Sample-accurate distribution of a live audio stream over LAN multicast.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                              SENDER                                          │
//! │  ┌──────────────────┐        ┌──────────────────┐                           │
//! │  │ Capture process  │        │  Input device    │                           │
//! │  │ (writes a FIFO)  │        │  (cpal stream)   │                           │
//! │  └────────┬─────────┘        └────────┬─────────┘                           │
//! │           │ sized pipe                │ SPSC block queue                     │
//! │           ▼                           ▼                                      │
//! │  ┌─────────────────────────────────────────────────────────────────────┐   │
//! │  │            BlockSource (audio::source) - one whole block            │   │
//! │  │            + wall-clock arrival time (clock::SystemClock)           │   │
//! │  └─────────────────────────────────┬───────────────────────────────────┘   │
//! │                                    ▼                                        │
//! │  ┌─────────────────────────────────────────────────────────────────────┐   │
//! │  │  StreamClock (clock) ── DelayLockedLoop ──▶ [t0, t1) ──▶ Timeline  │   │
//! │  └─────────────────────────────────┬───────────────────────────────────┘   │
//! │                                    ▼                                        │
//! │  ┌─────────────────────────────────────────────────────────────────────┐   │
//! │  │  StreamFramer (protocol) - [Magic|Ver|Stream|Seq|AudibleTime|PCM]   │   │
//! │  └─────────────────────────────────┬───────────────────────────────────┘   │
//! └────────────────────────────────────┼────────────────────────────────────────┘
//!                                      │ UDP multicast
//!                                      ▼
//! ┌────────────────────────────────────┼────────────────────────────────────────┐
//! │                              RECEIVERS                                       │
//! │  ┌─────────────────────────────────────────────────────────────────────┐   │
//! │  │  PacketReceiver (network::receiver) - validate, demux by stream,    │   │
//! │  │  track sequence gaps, derive block period from audible times        │   │
//! │  └─────────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::net::Ipv4Addr;

    /// Default sample rate for audio processing
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Default block size in frames (one hardware period)
    pub const DEFAULT_BLOCK_SIZE: usize = 256;

    /// Default multicast group for the audio stream
    pub const DEFAULT_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(226, 125, 44, 170);

    /// Default UDP port for audio streaming
    pub const DEFAULT_UDP_PORT: u16 = 48221;

    /// Maximum packet size for UDP
    pub const MAX_PACKET_SIZE: usize = 1472; // MTU - IP/UDP headers

    /// Loop bandwidth while acquiring lock, in Hz
    pub const DEFAULT_INITIAL_BANDWIDTH: f64 = 2.0;

    /// Loop bandwidth once settled, in Hz
    pub const DEFAULT_TERMINAL_BANDWIDTH: f64 = 0.01;

    /// Time for the loop bandwidth to narrow, in seconds
    pub const DEFAULT_BANDWIDTH_TIME_CONSTANT_SECS: f64 = 5.0;

    /// Timestamp history capacity (in blocks)
    pub const DEFAULT_HISTORY_CAPACITY: usize = 1024;

    /// Nanoseconds in one second
    pub const NANOS_PER_SEC: i64 = 1_000_000_000;
}
