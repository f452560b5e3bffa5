//! Round-trip time estimation from sequence/acknowledgment pairs
//!
//! For every packet `j` of a connection, the first later packet `k` whose
//! acknowledgment number equals `j`'s sequence number closes a round trip of
//! `ts(k) - ts(j)`. Samples from all connections feed one trace-wide
//! accumulator; there is no per-connection RTT.

use std::collections::HashMap;

use chrono::TimeDelta;

use crate::config::RttMatcherKind;
use crate::core::flow::Connection;
use crate::core::packet::Packet;
use super::summary::DurationStats;

/// Pairs segments with the acknowledgments that close them
pub trait RttMatcher: Send + Sync {
    /// Invoke `on_match(j, k)` for each packet `j` that has a matching later packet `k`
    fn match_acks(&self, packets: &[Packet], on_match: &mut dyn FnMut(usize, usize));

    fn name(&self) -> &'static str;
}

/// Build the matcher selected in the configuration
pub fn build_matcher(kind: RttMatcherKind) -> Box<dyn RttMatcher> {
    match kind {
        RttMatcherKind::NestedScan => Box::new(NestedScan),
        RttMatcherKind::SeqIndex => Box::new(SeqIndex),
    }
}

/// Forward scan from every packet, O(n^2) worst case
#[derive(Debug, Default, Clone, Copy)]
pub struct NestedScan;

impl RttMatcher for NestedScan {
    fn match_acks(&self, packets: &[Packet], on_match: &mut dyn FnMut(usize, usize)) {
        for (j, pkt) in packets.iter().enumerate() {
            if let Some(offset) = packets[j + 1..].iter().position(|later| later.ack == pkt.seq) {
                on_match(j, j + 1 + offset);
            }
        }
    }

    fn name(&self) -> &'static str {
        "nested_scan"
    }
}

/// Positions of every acknowledgment value, searched per segment
#[derive(Debug, Default, Clone, Copy)]
pub struct SeqIndex;

impl RttMatcher for SeqIndex {
    fn match_acks(&self, packets: &[Packet], on_match: &mut dyn FnMut(usize, usize)) {
        let mut by_ack: HashMap<u32, Vec<usize>> = HashMap::new();
        for (k, pkt) in packets.iter().enumerate() {
            by_ack.entry(pkt.ack).or_default().push(k);
        }

        for (j, pkt) in packets.iter().enumerate() {
            if let Some(positions) = by_ack.get(&pkt.seq) {
                // positions are ascending
                let next = positions.partition_point(|&k| k <= j);
                if let Some(&k) = positions.get(next) {
                    on_match(j, k);
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "seq_index"
    }
}

/// Trace-wide RTT running statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RttAccumulator {
    pub samples: u64,
    pub total: TimeDelta,
    pub min: Option<TimeDelta>,
    pub max: Option<TimeDelta>,
    /// Matches whose acknowledgment was captured before the segment
    pub discarded: u64,
}

impl Default for RttAccumulator {
    fn default() -> Self {
        Self {
            samples: 0,
            total: TimeDelta::zero(),
            min: None,
            max: None,
            discarded: 0,
        }
    }
}

impl RttAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sample; negative intervals are counted as discarded
    pub fn record(&mut self, rtt: TimeDelta) {
        if rtt < TimeDelta::zero() {
            self.discarded += 1;
            return;
        }
        self.samples += 1;
        self.total = self.total + rtt;
        self.min = Some(self.min.map_or(rtt, |min| min.min(rtt)));
        self.max = Some(self.max.map_or(rtt, |max| max.max(rtt)));
    }

    /// Mean RTT, `None` when no samples were recorded
    pub fn mean(&self) -> Option<TimeDelta> {
        (self.samples > 0).then(|| super::summary::mean_delta(self.total, self.samples))
    }

    pub fn stats(&self) -> Option<DurationStats> {
        Some(DurationStats {
            min: self.min?,
            mean: self.mean()?,
            max: self.max?,
            samples: self.samples,
        })
    }

    /// Add every seq/ack match of one connection
    pub fn accumulate(&mut self, con: &Connection, matcher: &dyn RttMatcher) {
        let packets = &con.packets;
        matcher.match_acks(packets, &mut |j, k| {
            self.record(packets[k].timestamp - packets[j].timestamp);
        });
    }
}
