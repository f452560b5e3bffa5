//! Captured frames and decoded TCP packets
//!
//! A `RawFrame` is what the capture source hands us. A `Packet` is the
//! decoded TCP/IPv4 record that gets attached to a connection.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw captured frame, prior to header decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Capture timestamp
    pub timestamp: DateTime<Utc>,
    /// Captured bytes (may be shorter than the frame on the wire)
    pub data: Vec<u8>,
    /// Length of the frame on the wire
    pub orig_len: u32,
}

impl RawFrame {
    pub fn new(timestamp: DateTime<Utc>, data: Vec<u8>) -> Self {
        let orig_len = data.len() as u32;
        Self { timestamp, data, orig_len }
    }

    /// Number of bytes actually captured
    pub fn captured_len(&self) -> usize {
        self.data.len()
    }
}

/// IPv4 address/port pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// TCP control flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TcpFlags {
    pub fin: bool,
    pub syn: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
    pub urg: bool,
}

impl TcpFlags {
    pub fn from_u8(flags: u8) -> Self {
        Self {
            fin: flags & 0x01 != 0,
            syn: flags & 0x02 != 0,
            rst: flags & 0x04 != 0,
            psh: flags & 0x08 != 0,
            ack: flags & 0x10 != 0,
            urg: flags & 0x20 != 0,
        }
    }
}

impl std::fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = String::new();
        if self.syn { s.push('S'); }
        if self.ack { s.push('A'); }
        if self.fin { s.push('F'); }
        if self.rst { s.push('R'); }
        if self.psh { s.push('P'); }
        if self.urg { s.push('U'); }
        if s.is_empty() { s.push('.'); }
        write!(f, "{}", s)
    }
}

/// Decoded TCP segment
///
/// All multi-byte fields are in host byte order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Capture timestamp
    pub timestamp: DateTime<Utc>,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    /// Sequence number
    pub seq: u32,
    /// Acknowledgment number
    pub ack: u32,
    /// Receive window
    pub window: u16,
    /// TCP payload length derived from the IP total length
    pub datalen: u32,
    pub flags: TcpFlags,
}

impl Packet {
    /// Create a bare packet between two endpoints (fields zeroed)
    pub fn new(timestamp: DateTime<Utc>, src: Endpoint, dst: Endpoint) -> Self {
        Self {
            timestamp,
            src_ip: src.ip,
            dst_ip: dst.ip,
            src_port: src.port,
            dst_port: dst.port,
            seq: 0,
            ack: 0,
            window: 0,
            datalen: 0,
            flags: TcpFlags::default(),
        }
    }

    pub fn src(&self) -> Endpoint {
        Endpoint::new(self.src_ip, self.src_port)
    }

    pub fn dst(&self) -> Endpoint {
        Endpoint::new(self.dst_ip, self.dst_port)
    }
}
