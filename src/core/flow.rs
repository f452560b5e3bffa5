//! TCP connection record
//!
//! A connection is identified by the unordered pair of its endpoints. The
//! first packet fixes which endpoint is the "source" for the rest of the
//! connection's life; every later packet is counted as sent (from the
//! source) or received (towards it).

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::packet::{Endpoint, Packet, TcpFlags};

/// Upper bound of the SYN/FIN counters
pub const CONTROL_COUNT_CLAMP: u8 = 2;

/// Direction-agnostic connection identity (endpoints normalized so the smaller one is first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionKey {
    pub a: Endpoint,
    pub b: Endpoint,
}

impl ConnectionKey {
    pub fn new(x: Endpoint, y: Endpoint) -> Self {
        if x <= y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }

    pub fn from_packet(pkt: &Packet) -> Self {
        Self::new(pkt.src(), pkt.dst())
    }
}

/// Informational classification derived from the counters
///
/// Never stored on the connection; always recomputed by [`Connection::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// Neither SYN nor FIN seen
    NoControl,
    /// One SYN seen
    SynSeen,
    /// Both SYNs seen, no FIN yet
    Established,
    /// FIN seen without any SYN (picked up mid-stream)
    FinOnly,
    /// At least one SYN and one FIN seen
    Complete,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::NoControl => write!(f, "NO_CONTROL"),
            ConnectionStatus::SynSeen => write!(f, "SYN_SEEN"),
            ConnectionStatus::Established => write!(f, "ESTABLISHED"),
            ConnectionStatus::FinOnly => write!(f, "FIN_ONLY"),
            ConnectionStatus::Complete => write!(f, "COMPLETE"),
        }
    }
}

/// Start/end of a complete connection relative to the trace anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionTiming {
    pub start: TimeDelta,
    pub end: TimeDelta,
    /// `None` when the last packet is timestamped before the first
    pub duration: Option<TimeDelta>,
}

/// Which side of the connection a packet came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// From the canonical source
    Sent,
    /// Towards the canonical source
    Received,
}

/// Bidirectional TCP connection
#[derive(Debug, Clone)]
pub struct Connection {
    /// 1-based discovery index
    pub id: u64,
    /// Endpoint that sent the first packet
    pub src: Endpoint,
    /// Endpoint the first packet was addressed to
    pub dst: Endpoint,
    /// Attached packets in capture order
    pub packets: Vec<Packet>,

    /// SYNs observed (clamped at 2)
    pub syn_count: u8,
    /// FINs observed (clamped at 2)
    pub fin_count: u8,
    /// Sticky RST flag
    pub reset: bool,

    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,

    /// Packets attached with a timestamp earlier than the first packet's
    pub ordering_anomalies: u64,
    /// Filled in when the trace is finalized, complete connections only
    pub timing: Option<ConnectionTiming>,
}

impl Connection {
    /// Create an empty connection whose canonical orientation is taken from `pkt`
    ///
    /// The packet itself is not attached.
    pub fn new(id: u64, pkt: &Packet) -> Self {
        Self {
            id,
            src: pkt.src(),
            dst: pkt.dst(),
            packets: Vec::new(),
            syn_count: 0,
            fin_count: 0,
            reset: false,
            packets_sent: 0,
            packets_received: 0,
            bytes_sent: 0,
            bytes_received: 0,
            ordering_anomalies: 0,
            timing: None,
        }
    }

    pub fn key(&self) -> ConnectionKey {
        ConnectionKey::new(self.src, self.dst)
    }

    /// Check whether a packet belongs to this connection, in either orientation
    pub fn matches(&self, pkt: &Packet) -> bool {
        let (src, dst) = (pkt.src(), pkt.dst());
        (src == self.src && dst == self.dst) || (src == self.dst && dst == self.src)
    }

    /// Direction of a packet relative to the canonical source
    ///
    /// Decided by source IP alone, so a packet between two ports of the same
    /// host is always counted as sent.
    pub fn direction_of(&self, pkt: &Packet) -> Direction {
        if pkt.src_ip == self.src.ip {
            Direction::Sent
        } else {
            Direction::Received
        }
    }

    /// Append a packet and update the per-direction counters
    pub fn attach(&mut self, pkt: Packet) -> Direction {
        let direction = self.direction_of(&pkt);
        match direction {
            Direction::Sent => {
                self.packets_sent += 1;
                self.bytes_sent += pkt.datalen as u64;
            }
            Direction::Received => {
                self.packets_received += 1;
                self.bytes_received += pkt.datalen as u64;
            }
        }
        if let Some(first) = self.packets.first() {
            if pkt.timestamp < first.timestamp {
                self.ordering_anomalies += 1;
            }
        }
        self.packets.push(pkt);
        direction
    }

    /// Update the control counters from one packet's flags
    pub fn record_control(&mut self, flags: &TcpFlags) {
        if flags.syn && self.syn_count < CONTROL_COUNT_CLAMP {
            self.syn_count += 1;
        }
        if flags.fin && self.fin_count < CONTROL_COUNT_CLAMP {
            self.fin_count += 1;
        }
        if flags.rst {
            self.reset = true;
        }
    }

    /// At least one SYN and one FIN observed, in any direction
    pub fn is_complete(&self) -> bool {
        (1..=CONTROL_COUNT_CLAMP).contains(&self.syn_count)
            && (1..=CONTROL_COUNT_CLAMP).contains(&self.fin_count)
    }

    pub fn status(&self) -> ConnectionStatus {
        match (self.syn_count, self.fin_count) {
            (0, 0) => ConnectionStatus::NoControl,
            (0, _) => ConnectionStatus::FinOnly,
            (1, 0) => ConnectionStatus::SynSeen,
            (_, 0) => ConnectionStatus::Established,
            _ => ConnectionStatus::Complete,
        }
    }

    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_sent + self.bytes_received
    }

    pub fn first_seen(&self) -> Option<DateTime<Utc>> {
        self.packets.first().map(|p| p.timestamp)
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.packets.last().map(|p| p.timestamp)
    }

    /// Status string, e.g. `S2F1` or `S1F0/R`
    pub fn state_label(&self) -> String {
        let mut label = format!("S{}F{}", self.syn_count, self.fin_count);
        if self.reset {
            label.push_str("/R");
        }
        label
    }
}
