//! Connection tracking
//!
//! Resolves decoded packets to bidirectional connections, stores the
//! connections in discovery order and keeps their counters current.
//!
//! # Example
//!
//! ```ignore
//! use connscope::flow::FlowTracker;
//! use connscope::config::ResolverKind;
//!
//! let mut tracker = FlowTracker::with_resolver(ResolverKind::Hashed);
//! let attached = tracker.process(packet)?;
//! let con = tracker.connection(attached.connection).unwrap();
//! ```

pub mod resolver;
pub mod table;
pub mod tracker;

pub use resolver::{build_resolver, HashedResolver, LinearResolver, Resolver};
pub use table::ConnectionTable;
pub use tracker::{Attached, FlowTracker};

use serde::{Deserialize, Serialize};

/// Flow tracking statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerStats {
    /// Connections created
    pub connections_created: u64,
    /// Packets attached to connections
    pub packets_processed: u64,
    /// Payload bytes attached to connections
    pub bytes_processed: u64,
}
