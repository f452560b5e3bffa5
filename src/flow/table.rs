//! Connection store
//!
//! Owns every connection in discovery order. Connections are never removed;
//! the whole table is dropped once the trace has been finalized.

use crate::config::ResolverKind;
use crate::core::flow::Connection;
use crate::core::packet::Packet;
use super::resolver::{build_resolver, Resolver};

/// Ordered storage for connections with pluggable lookup
pub struct ConnectionTable {
    /// Connections, index = id - 1
    connections: Vec<Connection>,
    /// Identity resolution strategy
    resolver: Box<dyn Resolver>,
    /// Statistics
    pub stats: TableStats,
}

/// Table statistics
#[derive(Debug, Clone, Default)]
pub struct TableStats {
    pub inserts: u64,
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
}

impl ConnectionTable {
    /// Create a table using the given resolution strategy
    pub fn new(kind: ResolverKind) -> Self {
        Self::with_resolver(build_resolver(kind))
    }

    pub fn with_resolver(resolver: Box<dyn Resolver>) -> Self {
        Self {
            connections: Vec::new(),
            resolver,
            stats: TableStats::default(),
        }
    }

    /// Find the id of the connection a packet belongs to
    pub fn resolve(&mut self, pkt: &Packet) -> Option<u64> {
        self.stats.lookups += 1;
        match self.resolver.resolve(pkt, &self.connections) {
            Some(index) => {
                self.stats.hits += 1;
                Some(index as u64 + 1)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Append a new connection whose orientation is fixed by `pkt`
    ///
    /// The packet is not attached.
    pub fn create(&mut self, pkt: &Packet) -> &mut Connection {
        let index = self.connections.len();
        let con = Connection::new(index as u64 + 1, pkt);
        self.resolver.register(&con, index);
        self.connections.push(con);
        self.stats.inserts += 1;
        &mut self.connections[index]
    }

    /// Get or create the connection for a packet
    /// Returns the connection and a bool indicating if it was newly created
    pub fn get_or_create(&mut self, pkt: &Packet) -> (&mut Connection, bool) {
        match self.resolve(pkt) {
            Some(id) => (&mut self.connections[id as usize - 1], false),
            None => (self.create(pkt), true),
        }
    }

    /// Get a connection by id
    pub fn get(&self, id: u64) -> Option<&Connection> {
        id.checked_sub(1).and_then(|i| self.connections.get(i as usize))
    }

    /// Get a mutable connection by id
    pub fn get_mut(&mut self, id: u64) -> Option<&mut Connection> {
        id.checked_sub(1).and_then(|i| self.connections.get_mut(i as usize))
    }

    /// Get current connection count
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if table is empty
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Iterate over connections in discovery order
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }

    /// Name of the active resolution strategy
    pub fn resolver_name(&self) -> &'static str {
        self.resolver.name()
    }

    /// Give up ownership of all connections, in discovery order
    pub fn into_connections(self) -> Vec<Connection> {
        self.connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::Endpoint;
    use chrono::DateTime;
    use std::net::Ipv4Addr;

    fn make_packet(src_port: u16, dst_port: u16) -> Packet {
        Packet::new(
            DateTime::from_timestamp(0, 0).unwrap(),
            Endpoint::new(Ipv4Addr::new(192, 168, 1, 100), src_port),
            Endpoint::new(Ipv4Addr::new(10, 0, 0, 1), dst_port),
        )
    }

    #[test]
    fn test_table_create() {
        let mut table = ConnectionTable::new(ResolverKind::Linear);

        let pkt = make_packet(54321, 80);
        let (con, is_new) = table.get_or_create(&pkt);

        assert!(is_new);
        assert_eq!(con.id, 1);
        assert_eq!(con.src.port, 54321);
        assert_eq!(con.dst.port, 80);
        assert!(con.packets.is_empty());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_table_lookup() {
        let mut table = ConnectionTable::new(ResolverKind::Hashed);

        let (con1, is_new1) = table.get_or_create(&make_packet(54321, 80));
        let id1 = con1.id;
        assert!(is_new1);

        let reply = Packet::new(
            DateTime::from_timestamp(0, 0).unwrap(),
            Endpoint::new(Ipv4Addr::new(10, 0, 0, 1), 80),
            Endpoint::new(Ipv4Addr::new(192, 168, 1, 100), 54321),
        );
        let (con2, is_new2) = table.get_or_create(&reply);
        assert!(!is_new2);
        assert_eq!(con2.id, id1);
        assert_eq!(table.len(), 1);
        assert_eq!(table.stats.hits, 1);
        assert_eq!(table.stats.misses, 1);
    }

    #[test]
    fn test_ids_follow_discovery_order() {
        let mut table = ConnectionTable::new(ResolverKind::Linear);

        table.get_or_create(&make_packet(1000, 80));
        table.get_or_create(&make_packet(1001, 80));
        table.get_or_create(&make_packet(1002, 80));

        let ids: Vec<u64> = table.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(table.get(2).map(|c| c.src.port), Some(1001));
        assert!(table.get(0).is_none());
        assert!(table.get(4).is_none());
    }
}
