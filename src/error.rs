use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::DecodeOutcome;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("capture file error: {0}")]
    Capture(#[from] pcap_file::PcapError),

    #[error("capture timestamp {0:?} is out of range")]
    InvalidTimestamp(std::time::Duration),

    #[error("unsupported link type {0}, only Ethernet captures are analyzed")]
    UnsupportedLinkType(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("report encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection {connection} exceeded the limit of {limit} packets")]
    CapacityExceeded { connection: u64, limit: usize },

    #[error("frame at {timestamp} rejected: {reason}")]
    FrameRejected {
        timestamp: DateTime<Utc>,
        reason: DecodeOutcome,
    },

    #[error("frame source thread exited unexpectedly")]
    SourceDisconnected,
}

pub type Result<T> = std::result::Result<T, TraceError>;
