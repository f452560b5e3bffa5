//! Per-connection start/end/duration relative to a trace anchor

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::AnchorPolicy;
use crate::core::flow::{Connection, ConnectionTiming};

/// Timing irregularity found while finalizing a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingAnomaly {
    /// Connection starts before the anchor
    NegativeStart { connection: u64, start: TimeDelta },
    /// Last packet is timestamped before the first
    NegativeDuration { connection: u64, start: TimeDelta, end: TimeDelta },
}

impl TimingAnomaly {
    pub fn connection(&self) -> u64 {
        match self {
            TimingAnomaly::NegativeStart { connection, .. }
            | TimingAnomaly::NegativeDuration { connection, .. } => *connection,
        }
    }
}

impl std::fmt::Display for TimingAnomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimingAnomaly::NegativeStart { connection, start } => write!(
                f,
                "connection {} starts {:.6}s before the trace anchor",
                connection,
                -seconds(*start)
            ),
            TimingAnomaly::NegativeDuration { connection, start, end } => write!(
                f,
                "connection {} ends at {:.6}s, before its start at {:.6}s",
                connection,
                seconds(*end),
                seconds(*start)
            ),
        }
    }
}

/// Interval as fractional seconds
pub fn seconds(delta: TimeDelta) -> f64 {
    match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1e9,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}

/// Pick the timestamp all relative times are measured from
pub fn select_anchor(policy: AnchorPolicy, connections: &[Connection]) -> Option<DateTime<Utc>> {
    match policy {
        AnchorPolicy::FirstConnection => connections.first().and_then(|c| c.first_seen()),
        AnchorPolicy::Earliest => connections
            .iter()
            .flat_map(|c| c.packets.iter().map(|p| p.timestamp))
            .min(),
    }
}

/// Timing of a complete connection; `None` for incomplete ones
pub fn connection_timing(con: &Connection, anchor: DateTime<Utc>) -> Option<ConnectionTiming> {
    if !con.is_complete() {
        return None;
    }
    let start = con.first_seen()? - anchor;
    let end = con.last_seen()? - anchor;
    Some(ConnectionTiming {
        start,
        end,
        duration: (end >= start).then(|| end - start),
    })
}

/// Set timing on every connection and report irregularities
pub fn apply_timing(connections: &mut [Connection], anchor: Option<DateTime<Utc>>) -> Vec<TimingAnomaly> {
    let mut anomalies = Vec::new();
    for con in connections.iter_mut() {
        let timing = anchor.and_then(|anchor| connection_timing(con, anchor));
        con.timing = timing;
        let Some(timing) = timing else { continue };

        if timing.start < TimeDelta::zero() {
            anomalies.push(TimingAnomaly::NegativeStart { connection: con.id, start: timing.start });
        }
        if timing.duration.is_none() {
            anomalies.push(TimingAnomaly::NegativeDuration {
                connection: con.id,
                start: timing.start,
                end: timing.end,
            });
        }
    }
    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::{Endpoint, Packet, TcpFlags};
    use std::net::Ipv4Addr;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_000, 0).unwrap() + TimeDelta::milliseconds(ms)
    }

    fn make_connection(id: u64, times: &[i64], complete: bool) -> Connection {
        let src = Endpoint::new(Ipv4Addr::new(10, 0, 0, 1), 1000 + id as u16);
        let dst = Endpoint::new(Ipv4Addr::new(10, 0, 0, 2), 80);
        let mut con = Connection::new(id, &Packet::new(at(times[0]), src, dst));
        for t in times {
            con.attach(Packet::new(at(*t), src, dst));
        }
        if complete {
            con.record_control(&TcpFlags { syn: true, fin: true, ..Default::default() });
        }
        con
    }

    #[test]
    fn test_anchor_policies() {
        let cons = vec![make_connection(1, &[100, 400], true), make_connection(2, &[20, 30], true)];

        assert_eq!(select_anchor(AnchorPolicy::FirstConnection, &cons), Some(at(100)));
        assert_eq!(select_anchor(AnchorPolicy::Earliest, &cons), Some(at(20)));
        assert_eq!(select_anchor(AnchorPolicy::Earliest, &[]), None);
    }

    #[test]
    fn test_timing_relative_to_anchor() {
        let mut cons = vec![make_connection(1, &[0, 100], true), make_connection(2, &[250, 300, 1250], true)];
        let anomalies = apply_timing(&mut cons, Some(at(0)));

        assert!(anomalies.is_empty());
        let timing = cons[1].timing.unwrap();
        assert_eq!(timing.start, TimeDelta::milliseconds(250));
        assert_eq!(timing.end, TimeDelta::milliseconds(1250));
        assert_eq!(timing.duration, Some(TimeDelta::seconds(1)));
    }

    #[test]
    fn test_incomplete_has_no_timing() {
        let mut cons = vec![make_connection(1, &[0, 100], false)];
        apply_timing(&mut cons, Some(at(0)));
        assert!(cons[0].timing.is_none());
    }

    #[test]
    fn test_first_connection_anchor_can_go_negative() {
        let mut cons = vec![make_connection(1, &[100, 400], true), make_connection(2, &[20, 30], true)];
        let anchor = select_anchor(AnchorPolicy::FirstConnection, &cons);
        let anomalies = apply_timing(&mut cons, anchor);

        assert_eq!(
            anomalies,
            vec![TimingAnomaly::NegativeStart { connection: 2, start: TimeDelta::milliseconds(-80) }]
        );
        assert_eq!(cons[1].timing.unwrap().duration, Some(TimeDelta::milliseconds(10)));
    }

    #[test]
    fn test_earliest_anchor_never_negative() {
        let mut cons = vec![make_connection(1, &[100, 400], true), make_connection(2, &[20, 30], true)];
        let anchor = select_anchor(AnchorPolicy::Earliest, &cons);
        assert!(apply_timing(&mut cons, anchor).is_empty());
        assert_eq!(cons[0].timing.unwrap().start, TimeDelta::milliseconds(80));
    }

    #[test]
    fn test_backwards_connection_flagged() {
        let mut cons = vec![make_connection(1, &[500, 600, 200], true)];
        let anomalies = apply_timing(&mut cons, Some(at(0)));

        assert_eq!(cons[0].timing.unwrap().duration, None);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].connection(), 1);
        assert!(anomalies[0].to_string().contains("before its start"));
    }

    #[test]
    fn test_seconds() {
        assert!((seconds(TimeDelta::milliseconds(1500)) - 1.5).abs() < 1e-12);
    }
}
