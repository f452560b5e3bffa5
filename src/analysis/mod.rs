//! Timing and round-trip analysis over tracked connections
//!
//! Runs once all frames have been consumed: anchors relative times, sets
//! per-connection timing, feeds the trace-wide RTT accumulator and computes
//! the aggregates handed to the renderer.

pub mod rtt;
pub mod summary;
pub mod timing;

pub use rtt::{build_matcher, NestedScan, RttAccumulator, RttMatcher, SeqIndex};
pub use summary::{ByteTotals, CountStats, DurationStats, TraceSummary};
pub use timing::{apply_timing, connection_timing, select_anchor, TimingAnomaly};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::AnalysisSettings;
use crate::core::flow::Connection;

/// Finalized result of a trace analysis
#[derive(Debug, Clone)]
pub struct Trace {
    /// All connections in discovery order
    pub connections: Vec<Connection>,
    /// Frames read from the source, rejected ones included
    pub total_frames: u64,
    /// Frames that did not decode to a TCP packet
    pub rejected_frames: u64,
    /// Timestamp relative times are measured from
    pub anchor: Option<DateTime<Utc>>,
    pub rtt: RttAccumulator,
    pub summary: TraceSummary,
    /// Irregularities found while timing connections
    pub anomalies: Vec<TimingAnomaly>,
}

impl Trace {
    /// Run timing/RTT analysis over the connections and build the result
    pub fn finalize(
        mut connections: Vec<Connection>,
        total_frames: u64,
        rejected_frames: u64,
        settings: &AnalysisSettings,
    ) -> Self {
        let anchor = select_anchor(settings.anchor, &connections);
        let anomalies = apply_timing(&mut connections, anchor);

        let matcher = build_matcher(settings.rtt_matcher);
        let mut rtt = RttAccumulator::new();
        for con in connections.iter().filter(|c| c.is_complete()) {
            rtt.accumulate(con, matcher.as_ref());
        }
        debug!(
            matcher = matcher.name(),
            samples = rtt.samples,
            discarded = rtt.discarded,
            "RTT analysis done"
        );

        let summary = TraceSummary::compute(&connections, &rtt);

        Self {
            connections,
            total_frames,
            rejected_frames,
            anchor,
            rtt,
            summary,
            anomalies,
        }
    }

    pub fn connection(&self, id: u64) -> Option<&Connection> {
        id.checked_sub(1).and_then(|i| self.connections.get(i as usize))
    }
}
