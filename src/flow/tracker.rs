//! Flow state tracker - attaches packets and maintains connection counters
//!
//! Coordinates the connection table and the per-connection control/direction
//! counters. Completeness is never stored; it is read off the counters.

use tracing::{debug, trace};

use crate::config::{AnalysisSettings, ResolverKind};
use crate::core::flow::{Connection, Direction};
use crate::core::packet::Packet;
use crate::error::{Result, TraceError};
use super::table::ConnectionTable;
use super::TrackerStats;

/// What happened to a packet handed to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attached {
    /// Connection the packet was attached to
    pub connection: u64,
    pub direction: Direction,
    /// The packet created the connection
    pub is_new: bool,
    /// The packet is timestamped before the connection's first packet
    pub out_of_order: bool,
}

/// Main flow tracking engine
pub struct FlowTracker {
    /// Connection table
    table: ConnectionTable,
    /// Legacy per-connection packet bound
    max_packets: Option<usize>,
    /// Tracker statistics
    stats: TrackerStats,
}

impl FlowTracker {
    /// Create a new flow tracker
    pub fn new(settings: &AnalysisSettings) -> Self {
        debug!(
            "Initializing flow tracker (resolver={:?}, max_packets={:?})",
            settings.resolver, settings.max_packets_per_connection
        );

        Self {
            table: ConnectionTable::new(settings.resolver),
            max_packets: settings.max_packets_per_connection,
            stats: TrackerStats::default(),
        }
    }

    /// Tracker with default settings and the given resolver
    pub fn with_resolver(kind: ResolverKind) -> Self {
        Self::new(&AnalysisSettings { resolver: kind, ..Default::default() })
    }

    /// Attach a packet to its connection, creating the connection if needed
    pub fn process(&mut self, pkt: Packet) -> Result<Attached> {
        let (con, is_new) = self.table.get_or_create(&pkt);

        if let Some(limit) = self.max_packets {
            if con.packet_count() >= limit {
                return Err(TraceError::CapacityExceeded { connection: con.id, limit });
            }
        }

        if is_new {
            self.stats.connections_created += 1;
            debug!(id = con.id, src = %con.src, dst = %con.dst, "new connection");
        }

        let anomalies_before = con.ordering_anomalies;
        con.record_control(&pkt.flags);
        self.stats.packets_processed += 1;
        self.stats.bytes_processed += pkt.datalen as u64;
        trace!(id = con.id, flags = %pkt.flags, seq = pkt.seq, ack = pkt.ack, "attach");
        let direction = con.attach(pkt);

        Ok(Attached {
            connection: con.id,
            direction,
            is_new,
            out_of_order: con.ordering_anomalies > anomalies_before,
        })
    }

    /// Get a connection by id
    pub fn connection(&self, id: u64) -> Option<&Connection> {
        self.table.get(id)
    }

    /// Get connection count
    pub fn connection_count(&self) -> usize {
        self.table.len()
    }

    /// Get tracker statistics
    pub fn stats(&self) -> &TrackerStats {
        &self.stats
    }

    /// Iterate over all connections in discovery order
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.table.iter()
    }

    pub fn resolver_name(&self) -> &'static str {
        self.table.resolver_name()
    }

    /// Finish tracking and hand over the connections
    pub fn into_connections(self) -> Vec<Connection> {
        self.table.into_connections()
    }
}
