//! Application configuration
//!
//! Loaded from TOML. Every section has defaults so a partial file works.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{Error, Result};
use crate::protocol::PacketLayout;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stream: StreamSettings,
    pub dll: DllConfig,
    pub network: NetworkConfig,
    pub ingest: IngestConfig,
}

/// Audio stream shape, negotiated with the sound device out of band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub stream_id: u32,
    pub channels: u16,
    pub sample_rate: u32,
    /// Frames per block (one hardware period)
    pub block_size: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            stream_id: 0,
            channels: DEFAULT_CHANNELS,
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl StreamSettings {
    /// Blocks per second
    pub fn block_rate(&self) -> f64 {
        self.sample_rate as f64 / self.block_size as f64
    }

    pub fn layout(&self) -> PacketLayout {
        PacketLayout::new(self.channels, self.block_size)
    }
}

/// Loop filter tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DllConfig {
    /// Bandwidth while acquiring lock (Hz)
    pub initial_bandwidth: f64,
    /// Steady-state bandwidth (Hz)
    pub terminal_bandwidth: f64,
    /// How quickly the bandwidth narrows (seconds)
    pub time_constant_secs: f64,
}

impl Default for DllConfig {
    fn default() -> Self {
        Self {
            initial_bandwidth: DEFAULT_INITIAL_BANDWIDTH,
            terminal_bandwidth: DEFAULT_TERMINAL_BANDWIDTH,
            time_constant_secs: DEFAULT_BANDWIDTH_TIME_CONSTANT_SECS,
        }
    }
}

impl DllConfig {
    /// Fast settling, for LANs with little scheduling noise
    pub fn fast_lock() -> Self {
        Self {
            initial_bandwidth: 4.0,
            terminal_bandwidth: 0.1,
            time_constant_secs: 1.0,
        }
    }
}

/// Multicast transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub multicast_addr: Ipv4Addr,
    pub port: u16,
    /// Local interface used to send and to join the group
    pub interface: Ipv4Addr,
    pub ttl: u32,
    /// Deliver our own packets to local receivers
    pub loopback: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            multicast_addr: DEFAULT_MULTICAST_ADDR,
            port: DEFAULT_UDP_PORT,
            interface: Ipv4Addr::UNSPECIFIED,
            ttl: 1,
            loopback: true,
        }
    }
}

/// Capture-side ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Named pipe carrying raw S16LE interleaved audio
    pub fifo_path: Option<PathBuf>,
    /// Create the pipe if it does not exist
    pub create_fifo: bool,
    /// Timing records kept for diagnostics
    pub history_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            fifo_path: None,
            create_fifo: true,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Default config file location for this user
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "lan-audio-sync").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or from the default location if it exists, or
    /// fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let stream = &self.stream;
        if stream.channels == 0 {
            return Err(Error::Config("channels must be non-zero".into()));
        }
        if stream.block_size == 0 {
            return Err(Error::Config("block_size must be non-zero".into()));
        }
        if stream.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be non-zero".into()));
        }

        let packet_size = stream.layout().packet_size();
        if packet_size > MAX_PACKET_SIZE {
            return Err(Error::Config(format!(
                "{} channels x {} frames needs a {} byte packet, limit is {}",
                stream.channels, stream.block_size, packet_size, MAX_PACKET_SIZE
            )));
        }

        let dll = &self.dll;
        for (name, value) in [
            ("initial_bandwidth", dll.initial_bandwidth),
            ("terminal_bandwidth", dll.terminal_bandwidth),
            ("time_constant_secs", dll.time_constant_secs),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config(format!(
                    "{} must be finite and positive, got {}",
                    name, value
                )));
            }
        }
        if dll.time_constant_secs * stream.block_rate() < 1.0 {
            return Err(Error::Config(format!(
                "time_constant_secs {} is shorter than one block",
                dll.time_constant_secs
            )));
        }

        if self.ingest.history_capacity == 0 {
            return Err(Error::Config("history_capacity must be non-zero".into()));
        }
        Ok(())
    }
}
