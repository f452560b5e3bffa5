//! Connection identity resolution strategies
//!
//! Both strategies give identical answers: the first connection, in
//! discovery order, whose endpoints equal the packet's in either
//! orientation. They differ only in cost.

use std::collections::HashMap;

use crate::config::ResolverKind;
use crate::core::flow::{Connection, ConnectionKey};
use crate::core::packet::Packet;

/// Finds the connection a packet belongs to
pub trait Resolver: Send {
    /// Index into `connections` of the matching connection, if any
    fn resolve(&self, pkt: &Packet, connections: &[Connection]) -> Option<usize>;

    /// Called after a connection has been appended at `index`
    fn register(&mut self, connection: &Connection, index: usize);

    fn name(&self) -> &'static str;
}

/// Build the resolver selected in the configuration
pub fn build_resolver(kind: ResolverKind) -> Box<dyn Resolver> {
    match kind {
        ResolverKind::Linear => Box::new(LinearResolver),
        ResolverKind::Hashed => Box::new(HashedResolver::default()),
    }
}

/// Linear scan over all connections
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearResolver;

impl Resolver for LinearResolver {
    fn resolve(&self, pkt: &Packet, connections: &[Connection]) -> Option<usize> {
        connections.iter().position(|con| con.matches(pkt))
    }

    fn register(&mut self, _connection: &Connection, _index: usize) {}

    fn name(&self) -> &'static str {
        "linear"
    }
}

/// Hash index keyed by the unordered endpoint pair
#[derive(Debug, Default, Clone)]
pub struct HashedResolver {
    index: HashMap<ConnectionKey, usize>,
}

impl Resolver for HashedResolver {
    fn resolve(&self, pkt: &Packet, _connections: &[Connection]) -> Option<usize> {
        self.index.get(&ConnectionKey::from_packet(pkt)).copied()
    }

    fn register(&mut self, connection: &Connection, index: usize) {
        // Keep the earliest connection for a key
        self.index.entry(connection.key()).or_insert(index);
    }

    fn name(&self) -> &'static str {
        "hashed"
    }
}
