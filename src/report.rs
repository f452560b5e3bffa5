//! Report rendering
//!
//! Both renderers work from a [`TraceReport`], a flat view of a finalized
//! trace with every interval expressed as fractional seconds.

use std::fmt::Write as _;

use serde::Serialize;

use crate::analysis::{CountStats, DurationStats, Trace};
use crate::analysis::timing::seconds;
use crate::config::ReportFormat;
use crate::core::flow::{Connection, ConnectionStatus};
use crate::error::Result;

/// Per-connection view
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub id: u64,
    pub source: String,
    pub destination: String,
    pub source_port: u16,
    pub destination_port: u16,
    pub status: String,
    pub state: ConnectionStatus,
    pub complete: bool,
    pub reset: bool,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub total_packets: usize,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub duration: Option<f64>,
}

impl From<&Connection> for ConnectionReport {
    fn from(con: &Connection) -> Self {
        let timing = con.timing;
        Self {
            id: con.id,
            source: con.src.ip.to_string(),
            destination: con.dst.ip.to_string(),
            source_port: con.src.port,
            destination_port: con.dst.port,
            status: con.state_label(),
            state: con.status(),
            complete: con.is_complete(),
            reset: con.reset,
            packets_sent: con.packets_sent,
            packets_received: con.packets_received,
            bytes_sent: con.bytes_sent,
            bytes_received: con.bytes_received,
            total_packets: con.packet_count(),
            start: timing.map(|t| seconds(t.start)),
            end: timing.map(|t| seconds(t.end)),
            duration: timing.and_then(|t| t.duration).map(seconds),
        }
    }
}

/// Min/mean/max in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SecondsStats {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
    pub samples: u64,
}

impl From<DurationStats> for SecondsStats {
    fn from(stats: DurationStats) -> Self {
        Self {
            min: seconds(stats.min),
            mean: seconds(stats.mean),
            max: seconds(stats.max),
            samples: stats.samples,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceReport {
    pub total_frames: u64,
    pub rejected_frames: u64,
    pub total_connections: usize,
    pub connections: Vec<ConnectionReport>,
    pub complete: usize,
    pub reset: usize,
    pub open: usize,
    pub duration: Option<SecondsStats>,
    pub rtt: Option<SecondsStats>,
    pub packets: Option<CountStats>,
    pub window: Option<CountStats>,
    pub bytes_total: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub anomalies: Vec<String>,
}

impl TraceReport {
    pub fn new(trace: &Trace) -> Self {
        let summary = &trace.summary;
        Self {
            total_frames: trace.total_frames,
            rejected_frames: trace.rejected_frames,
            total_connections: summary.total_connections,
            connections: trace.connections.iter().map(ConnectionReport::from).collect(),
            complete: summary.complete,
            reset: summary.reset,
            open: summary.open,
            duration: summary.duration.map(SecondsStats::from),
            rtt: summary.rtt.map(SecondsStats::from),
            packets: summary.packets,
            window: summary.window,
            bytes_total: summary.bytes.total,
            bytes_sent: summary.bytes.sent,
            bytes_received: summary.bytes.received,
            anomalies: trace.anomalies.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn render(&self, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Text => Ok(self.to_text()),
            ReportFormat::Json => self.to_json(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "A) Total number of connections: {}", self.total_connections)?;
        writeln!(out, "   Frames read: {} ({} rejected)", self.total_frames, self.rejected_frames)?;
        writeln!(out, "{}", "-".repeat(60))?;

        writeln!(out, "B) Connections' details:")?;
        for con in &self.connections {
            writeln!(out)?;
            writeln!(out, "Connection {}:", con.id)?;
            writeln!(out, "Source Address: {}", con.source)?;
            writeln!(out, "Destination Address: {}", con.destination)?;
            writeln!(out, "Source Port: {}", con.source_port)?;
            writeln!(out, "Destination Port: {}", con.destination_port)?;
            writeln!(out, "Status: {}", con.status)?;
            if con.complete {
                writeln!(out, "Start time: {}", fmt_seconds(con.start))?;
                writeln!(out, "End time: {}", fmt_seconds(con.end))?;
                writeln!(out, "Duration: {}", fmt_seconds(con.duration))?;
                writeln!(out, "Number of packets sent from Source to Destination: {}", con.packets_sent)?;
                writeln!(out, "Number of packets sent from Destination to Source: {}", con.packets_received)?;
                writeln!(out, "Total number of packets: {}", con.total_packets)?;
                writeln!(out, "Number of data bytes sent from Source to Destination: {}", con.bytes_sent)?;
                writeln!(out, "Number of data bytes sent from Destination to Source: {}", con.bytes_received)?;
                writeln!(out, "Total number of data bytes: {}", con.bytes_sent + con.bytes_received)?;
            }
            writeln!(out, "END")?;
        }
        writeln!(out, "{}", "-".repeat(60))?;

        writeln!(out, "C) General")?;
        writeln!(out)?;
        writeln!(out, "Total number of complete TCP connections: {}", self.complete)?;
        writeln!(out, "Number of reset TCP connections: {}", self.reset)?;
        writeln!(out, "Number of TCP connections that were still open when the trace capture ended: {}", self.open)?;
        writeln!(out, "{}", "-".repeat(60))?;

        writeln!(out, "D) Complete TCP connections:")?;
        writeln!(out)?;
        write_seconds_stats(out, "Connection duration", self.duration)?;
        writeln!(out)?;
        write_seconds_stats(out, "RTT value", self.rtt)?;
        writeln!(out)?;
        write_count_stats(out, "number of packets including both send/received", self.packets)?;
        writeln!(out)?;
        write_count_stats(out, "receive window size including both send/received", self.window)?;

        if !self.anomalies.is_empty() {
            writeln!(out, "{}", "-".repeat(60))?;
            writeln!(out, "Timing anomalies:")?;
            for anomaly in &self.anomalies {
                writeln!(out, "  {}", anomaly)?;
            }
        }
        Ok(())
    }
}

fn fmt_seconds(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.6}", v),
        None => "n/a".to_string(),
    }
}

fn write_seconds_stats(out: &mut String, label: &str, stats: Option<SecondsStats>) -> std::fmt::Result {
    match stats {
        Some(s) => {
            writeln!(out, "Minimum {}: {:.6}", label, s.min)?;
            writeln!(out, "Mean {}: {:.6}", label, s.mean)?;
            writeln!(out, "Maximum {}: {:.6}", label, s.max)
        }
        None => writeln!(out, "{}: no data", label),
    }
}

fn write_count_stats(out: &mut String, label: &str, stats: Option<CountStats>) -> std::fmt::Result {
    match stats {
        Some(s) => {
            writeln!(out, "Minimum {}: {}", label, s.min)?;
            writeln!(out, "Mean {}: {:.6}", label, s.mean)?;
            writeln!(out, "Maximum {}: {}", label, s.max)
        }
        None => writeln!(out, "{}: no data", label),
    }
}
