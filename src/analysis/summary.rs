//! Trace-wide aggregates
//!
//! Every min/mean/max group is an `Option`: `None` means no samples, never a
//! division by zero.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::core::flow::Connection;
use super::rtt::RttAccumulator;

/// Mean of `count` intervals summing to `total`
pub(crate) fn mean_delta(total: TimeDelta, count: u64) -> TimeDelta {
    let count = count.max(1) as i64;
    match total.num_nanoseconds() {
        Some(nanos) => TimeDelta::nanoseconds(nanos / count),
        None => TimeDelta::milliseconds(total.num_milliseconds() / count),
    }
}

/// Min/mean/max over time intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationStats {
    pub min: TimeDelta,
    pub mean: TimeDelta,
    pub max: TimeDelta,
    pub samples: u64,
}

impl DurationStats {
    pub fn from_samples<I: IntoIterator<Item = TimeDelta>>(samples: I) -> Option<Self> {
        let mut iter = samples.into_iter();
        let first = iter.next()?;
        let mut stats = Self { min: first, mean: first, max: first, samples: 1 };
        let mut total = first;
        for d in iter {
            stats.min = stats.min.min(d);
            stats.max = stats.max.max(d);
            stats.samples += 1;
            total = total + d;
        }
        stats.mean = mean_delta(total, stats.samples);
        Some(stats)
    }
}

/// Min/mean/max over integer quantities
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountStats {
    pub min: u64,
    pub mean: f64,
    pub max: u64,
    pub samples: u64,
}

impl CountStats {
    pub fn from_samples<I: IntoIterator<Item = u64>>(samples: I) -> Option<Self> {
        let mut iter = samples.into_iter();
        let first = iter.next()?;
        let (mut min, mut max, mut total, mut n) = (first, first, first as u128, 1u64);
        for v in iter {
            min = min.min(v);
            max = max.max(v);
            total += v as u128;
            n += 1;
        }
        Some(Self { min, mean: total as f64 / n as f64, max, samples: n })
    }
}

/// Payload byte totals over all connections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteTotals {
    pub total: u64,
    pub sent: u64,
    pub received: u64,
}

/// Aggregates over a finalized trace
#[derive(Debug, Clone, PartialEq)]
pub struct TraceSummary {
    pub total_connections: usize,
    /// Connections with at least one SYN and one FIN
    pub complete: usize,
    /// Connections that saw a RST, complete or not
    pub reset: usize,
    /// Connections that are not complete
    pub open: usize,
    /// Over complete connections with a valid duration
    pub duration: Option<DurationStats>,
    /// Trace-wide seq/ack round trips
    pub rtt: Option<DurationStats>,
    /// Packets per complete connection
    pub packets: Option<CountStats>,
    /// Receive window over every packet of complete connections
    pub window: Option<CountStats>,
    pub bytes: ByteTotals,
}

impl TraceSummary {
    /// Compute the aggregates; connection timing must already be applied
    pub fn compute(connections: &[Connection], rtt: &RttAccumulator) -> Self {
        let complete: Vec<&Connection> = connections.iter().filter(|c| c.is_complete()).collect();

        let mut bytes = ByteTotals::default();
        for con in connections {
            bytes.sent += con.bytes_sent;
            bytes.received += con.bytes_received;
        }
        bytes.total = bytes.sent + bytes.received;

        Self {
            total_connections: connections.len(),
            complete: complete.len(),
            reset: connections.iter().filter(|c| c.reset).count(),
            open: connections.len() - complete.len(),
            duration: DurationStats::from_samples(
                complete.iter().filter_map(|c| c.timing.and_then(|t| t.duration)),
            ),
            rtt: rtt.stats(),
            packets: CountStats::from_samples(complete.iter().map(|c| c.packet_count() as u64)),
            window: CountStats::from_samples(
                complete.iter().flat_map(|c| c.packets.iter().map(|p| p.window as u64)),
            ),
            bytes,
        }
    }
}
