//! Error types for the audio sync pipeline

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Clock error: {0}")]
    Clock(#[from] ClockError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Sound-device errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Capture stopped")]
    Disconnected,

    #[error("cpal error: {0}")]
    CpalError(String),
}

/// Loop filter input errors
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ClockError {
    #[error("Measured time is not finite: {0}")]
    NonFiniteMeasurement(f64),

    #[error("Loop parameter {name} must be finite and positive, got {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}

/// Inter-process pipe errors
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("Stream ended mid-block ({got} of {expected} bytes)")]
    TruncatedBlock { got: usize, expected: usize },

    #[error("Failed to set pipe capacity to {requested} bytes: {reason}")]
    PipeCapacity { requested: usize, reason: String },
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket setup failed in {op}: {source}")]
    Setup {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    #[error("Receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    #[error("Short send: {sent} of {expected} bytes")]
    ShortSend { sent: usize, expected: usize },
}

/// Wire format errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Wrong packet size: {got} bytes, expected {expected}")]
    WrongSize { got: usize, expected: usize },

    #[error("Bad magic: {0:?}")]
    BadMagic([u8; 4]),

    #[error("Protocol version mismatch: got {got}, expected {expected}")]
    VersionMismatch { got: u32, expected: u32 },
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
