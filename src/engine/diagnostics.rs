//! Diagnostics for frames that were dropped and timings that look wrong
//!
//! One diagnostic is emitted per rejected frame. None of them are fatal on
//! their own; the pipeline's error policy decides whether to carry on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::TimingAnomaly;
use crate::core::parser::{DecodeOutcome, Header};

/// `seconds.microseconds`, as capture tools print timestamps
pub fn timestamp_str(ts: DateTime<Utc>) -> String {
    format!("{}.{:06}", ts.timestamp(), ts.timestamp_subsec_micros())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCategory {
    /// Frame lacks a full header
    TooShort(Header),
    /// Not an IPv4 frame
    NotIpv4,
    /// IPv4 but not TCP
    NotTcp,
    /// Header fields are inconsistent
    Malformed,
    /// Timestamps go backwards within a connection or before the anchor
    OrderingAnomaly,
}

/// A single diagnostic event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub timestamp: DateTime<Utc>,
    pub category: DiagnosticCategory,
    pub detail: String,
}

impl Diagnostic {
    /// Diagnostic for a frame that failed to decode
    pub fn rejected(timestamp: DateTime<Utc>, outcome: &DecodeOutcome) -> Self {
        let category = match outcome {
            DecodeOutcome::TooShort(header) => DiagnosticCategory::TooShort(*header),
            DecodeOutcome::NotIpv4 => DiagnosticCategory::NotIpv4,
            DecodeOutcome::NotTcp => DiagnosticCategory::NotTcp,
            DecodeOutcome::BadIpHeaderLength(_)
            | DecodeOutcome::BadTcpDataOffset(_)
            | DecodeOutcome::NegativePayload { .. } => DiagnosticCategory::Malformed,
        };
        Self { timestamp, category, detail: outcome.to_string() }
    }

    /// A packet attached with a timestamp before its connection's first packet
    pub fn out_of_order(timestamp: DateTime<Utc>, connection: u64) -> Self {
        Self {
            timestamp,
            category: DiagnosticCategory::OrderingAnomaly,
            detail: format!("packet precedes the first packet of connection {}", connection),
        }
    }

    pub fn timing(timestamp: DateTime<Utc>, anomaly: &TimingAnomaly) -> Self {
        Self {
            timestamp,
            category: DiagnosticCategory::OrderingAnomaly,
            detail: anomaly.to_string(),
        }
    }

    /// Frequent, expected rejections
    pub fn is_benign(&self) -> bool {
        matches!(self.category, DiagnosticCategory::NotIpv4 | DiagnosticCategory::NotTcp)
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.category {
            DiagnosticCategory::TooShort(header) => write!(
                f,
                "packet with timestamp {} is truncated and lacks a full {}",
                timestamp_str(self.timestamp),
                header
            ),
            _ => write!(f, "{}: {}", timestamp_str(self.timestamp), self.detail),
        }
    }
}

/// Consumer of diagnostic events
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for &mut S {
    fn report(&mut self, diagnostic: Diagnostic) {
        (**self).report(diagnostic)
    }
}

/// Emits diagnostics as tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        let timestamp = timestamp_str(diagnostic.timestamp);
        if diagnostic.is_benign() {
            debug!(
                timestamp = %timestamp,
                category = ?diagnostic.category,
                detail = %diagnostic.detail,
                "{}", diagnostic
            );
        } else {
            warn!(
                timestamp = %timestamp,
                category = ?diagnostic.category,
                detail = %diagnostic.detail,
                "{}", diagnostic
            );
        }
    }
}

/// Keeps every diagnostic in memory
#[derive(Debug, Default, Clone)]
pub struct CollectSink {
    pub diagnostics: Vec<Diagnostic>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, category: DiagnosticCategory) -> usize {
        self.diagnostics.iter().filter(|d| d.category == category).count()
    }
}

impl DiagnosticSink for CollectSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}
