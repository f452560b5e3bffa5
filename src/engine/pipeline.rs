//! Processing pipeline
//!
//! Routes frames through decoding and connection tracking, then finalizes
//! the trace:
//! 1. Decode - Ethernet/IPv4/TCP headers; rejects go to the diagnostics sink
//! 2. Track - resolve or create the connection and update its counters
//! 3. Finalize - anchor, per-connection timing, RTT and trace aggregates
//!
//! Frames are consumed strictly in source order by a single owner of the
//! connection table. The threaded driver only moves frame *reading* to a
//! separate thread, feeding the analyzer through a bounded channel.

use std::thread;

use crossbeam_channel::{bounded, RecvError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::analysis::Trace;
use crate::config::{AnalysisSettings, Config, ErrorPolicy};
use crate::core::packet::RawFrame;
use crate::core::parser::decode_frame;
use crate::error::{Result, TraceError};
use crate::flow::FlowTracker;
use super::capture::FrameSource;
use super::diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticSink};

/// Counters kept while frames are processed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Frames read from the source
    pub frames: u64,
    /// Frames that became packets
    pub accepted: u64,
    pub too_short: u64,
    pub not_ipv4: u64,
    pub not_tcp: u64,
    pub malformed: u64,
    /// Packets attached out of timestamp order
    pub out_of_order: u64,
}

impl PipelineStats {
    pub fn rejected(&self) -> u64 {
        self.too_short + self.not_ipv4 + self.not_tcp + self.malformed
    }
}

/// Single-owner trace analyzer
pub struct Analyzer<D: DiagnosticSink> {
    analysis: AnalysisSettings,
    error_policy: ErrorPolicy,
    channel_capacity: usize,
    tracker: FlowTracker,
    sink: D,
    stats: PipelineStats,
}

impl<D: DiagnosticSink> Analyzer<D> {
    /// Create an analyzer reporting rejected frames to `sink`
    pub fn new(config: &Config, sink: D) -> Self {
        Self {
            analysis: config.analysis.clone(),
            error_policy: config.pipeline.error_policy,
            channel_capacity: config.pipeline.channel_capacity.max(1),
            tracker: FlowTracker::new(&config.analysis),
            sink,
            stats: PipelineStats::default(),
        }
    }

    /// Decode one frame and attach it to its connection
    pub fn process_frame(&mut self, frame: &RawFrame) -> Result<()> {
        self.stats.frames += 1;

        let pkt = match decode_frame(frame) {
            Ok(pkt) => pkt,
            Err(outcome) => {
                let diagnostic = Diagnostic::rejected(frame.timestamp, &outcome);
                match diagnostic.category {
                    DiagnosticCategory::TooShort(_) => self.stats.too_short += 1,
                    DiagnosticCategory::NotIpv4 => self.stats.not_ipv4 += 1,
                    DiagnosticCategory::NotTcp => self.stats.not_tcp += 1,
                    _ => self.stats.malformed += 1,
                }
                self.sink.report(diagnostic);

                // Non-IPv4 and non-TCP frames never abort a run
                return match self.error_policy {
                    ErrorPolicy::Abort if !outcome.is_benign() => Err(TraceError::FrameRejected {
                        timestamp: frame.timestamp,
                        reason: outcome,
                    }),
                    _ => Ok(()),
                };
            }
        };

        let timestamp = pkt.timestamp;
        let attached = self.tracker.process(pkt)?;
        self.stats.accepted += 1;
        if attached.out_of_order {
            self.stats.out_of_order += 1;
            self.sink.report(Diagnostic::out_of_order(timestamp, attached.connection));
        }
        Ok(())
    }

    /// Drain a frame source on the calling thread
    pub fn run<S: FrameSource + ?Sized>(mut self, source: &mut S) -> Result<Trace> {
        info!("Starting trace analysis (resolver={})", self.tracker.resolver_name());
        while let Some(frame) = source.next_frame()? {
            self.process_frame(&frame)?;
        }
        Ok(self.finish())
    }

    /// Read frames on a separate thread, analyze them on this one
    pub fn run_threaded<S>(mut self, mut source: S) -> Result<Trace>
    where
        S: FrameSource + 'static,
    {
        info!(
            "Starting threaded trace analysis (resolver={}, channel_capacity={})",
            self.tracker.resolver_name(),
            self.channel_capacity
        );

        let (tx, rx) = bounded::<Result<RawFrame>>(self.channel_capacity);
        let reader = thread::Builder::new()
            .name("frame-reader".into())
            .spawn(move || loop {
                let item = match source.next_frame() {
                    Ok(Some(frame)) => Ok(frame),
                    Ok(None) => break,
                    Err(e) => Err(e),
                };
                let failed = item.is_err();
                // Receiver gone means the analyzer stopped early
                if tx.send(item).is_err() || failed {
                    break;
                }
            })?;

        loop {
            match rx.recv() {
                Ok(item) => self.process_frame(&item?)?,
                Err(RecvError) => {
                    debug!("Frame channel closed");
                    break;
                }
            }
        }

        reader.join().map_err(|_| TraceError::SourceDisconnected)?;
        Ok(self.finish())
    }

    /// Run timing/RTT analysis and build the final trace
    pub fn finish(mut self) -> Trace {
        let stats = self.stats.clone();
        let connections = self.tracker.into_connections();
        let trace = Trace::finalize(connections, stats.frames, stats.rejected(), &self.analysis);

        for anomaly in &trace.anomalies {
            let timestamp = trace
                .connection(anomaly.connection())
                .and_then(|c| c.first_seen())
                .or(trace.anchor);
            if let Some(timestamp) = timestamp {
                self.sink.report(Diagnostic::timing(timestamp, anomaly));
            }
        }

        info!(
            frames = stats.frames,
            accepted = stats.accepted,
            rejected = stats.rejected(),
            connections = trace.connections.len(),
            complete = trace.summary.complete,
            "Trace analysis complete"
        );
        trace
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn tracker(&self) -> &FlowTracker {
        &self.tracker
    }

    pub fn sink(&self) -> &D {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::capture::MemorySource;
    use crate::engine::diagnostics::CollectSink;
    use crate::core::parser::{DecodeOutcome, Header};
    use chrono::{DateTime, TimeDelta, Utc};
    use etherparse::PacketBuilder;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_600_000_000, 0).unwrap() + TimeDelta::milliseconds(ms)
    }

    fn tcp(ms: i64, src: ([u8; 4], u16), dst: ([u8; 4], u16), syn: bool, fin: bool) -> RawFrame {
        let mut builder = PacketBuilder::ethernet2([1; 6], [2; 6])
            .ipv4(src.0, dst.0, 64)
            .tcp(src.1, dst.1, 1, 1024);
        if syn {
            builder = builder.syn();
        }
        if fin {
            builder = builder.fin();
        }
        let mut data = Vec::new();
        builder.write(&mut data, &[]).unwrap();
        RawFrame::new(at(ms), data)
    }

    fn udp(ms: i64) -> RawFrame {
        let builder = PacketBuilder::ethernet2([1; 6], [2; 6])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(5000, 53);
        let mut data = Vec::new();
        builder.write(&mut data, b"x").unwrap();
        RawFrame::new(at(ms), data)
    }

    const A: ([u8; 4], u16) = ([10, 0, 0, 1], 1000);
    const B: ([u8; 4], u16) = ([10, 0, 0, 2], 80);

    #[test]
    fn test_rejected_frames_do_not_touch_state() {
        let mut sink = CollectSink::new();
        let mut analyzer = Analyzer::new(&Config::default(), &mut sink);

        analyzer.process_frame(&RawFrame::new(at(0), vec![0; 10])).unwrap();
        analyzer.process_frame(&udp(1)).unwrap();
        assert_eq!(analyzer.tracker().connection_count(), 0);
        assert_eq!(analyzer.stats().too_short, 1);
        assert_eq!(analyzer.stats().not_tcp, 1);

        let trace = analyzer.finish();
        assert_eq!(trace.total_frames, 2);
        assert_eq!(trace.rejected_frames, 2);
        assert!(trace.connections.is_empty());
        assert_eq!(sink.count(DiagnosticCategory::TooShort(Header::Ethernet)), 1);
        assert_eq!(sink.count(DiagnosticCategory::NotTcp), 1);
    }

    #[test]
    fn test_abort_policy_passes_non_tcp_frames() {
        let mut config = Config::default();
        config.pipeline.error_policy = ErrorPolicy::Abort;
        let mut source = MemorySource::new(vec![tcp(0, A, B, true, false), udp(1), tcp(2, B, A, true, false)]);

        let trace = Analyzer::new(&config, CollectSink::new()).run(&mut source).unwrap();
        assert_eq!(trace.total_frames, 3);
        assert_eq!(trace.rejected_frames, 1);
        assert_eq!(trace.connection(1).unwrap().syn_count, 2);
    }

    #[test]
    fn test_abort_policy_stops_on_truncated_frame() {
        let mut config = Config::default();
        config.pipeline.error_policy = ErrorPolicy::Abort;
        let mut source = MemorySource::new(vec![
            tcp(0, A, B, true, false),
            udp(1),
            RawFrame::new(at(2), vec![0; 10]),
            tcp(3, B, A, true, false),
        ]);

        let err = Analyzer::new(&config, CollectSink::new()).run(&mut source).unwrap_err();
        assert!(matches!(
            err,
            TraceError::FrameRejected { reason: DecodeOutcome::TooShort(Header::Ethernet), .. }
        ));
        assert_eq!(source.remaining(), 1);
    }

    #[test]
    fn test_sequential_and_threaded_agree() {
        let frames = vec![
            tcp(0, A, B, true, false),
            tcp(5, B, A, true, false),
            udp(6),
            tcp(10, A, B, false, true),
            tcp(15, B, A, false, true),
            tcp(20, ([10, 0, 0, 3], 2000), B, true, false),
        ];

        let mut config = Config::default();
        config.pipeline.channel_capacity = 2;

        let mut source = MemorySource::new(frames.clone());
        let seq = Analyzer::new(&config, CollectSink::new()).run(&mut source).unwrap();
        let thr = Analyzer::new(&config, CollectSink::new())
            .run_threaded(MemorySource::new(frames))
            .unwrap();

        for trace in [&seq, &thr] {
            assert_eq!(trace.total_frames, 6);
            assert_eq!(trace.rejected_frames, 1);
            assert_eq!(trace.connections.len(), 2);
            assert_eq!(trace.summary.complete, 1);
            assert_eq!(trace.summary.open, 1);
            let con = trace.connection(1).unwrap();
            assert_eq!(con.timing.unwrap().duration, Some(TimeDelta::milliseconds(15)));
        }
    }

    #[test]
    fn test_out_of_order_packet_reported() {
        let mut sink = CollectSink::new();
        let mut analyzer = Analyzer::new(&Config::default(), &mut sink);
        analyzer.process_frame(&tcp(100, A, B, true, false)).unwrap();
        analyzer.process_frame(&tcp(50, B, A, true, false)).unwrap();
        assert_eq!(analyzer.stats().out_of_order, 1);
        drop(analyzer);

        assert_eq!(sink.count(DiagnosticCategory::OrderingAnomaly), 1);
    }

    #[test]
    fn test_capacity_exceeded_is_fatal() {
        let mut config = Config::default();
        config.analysis.max_packets_per_connection = Some(1);
        let mut source = MemorySource::new(vec![tcp(0, A, B, true, false), tcp(1, B, A, true, false)]);

        let err = Analyzer::new(&config, CollectSink::new()).run(&mut source).unwrap_err();
        assert!(matches!(err, TraceError::CapacityExceeded { connection: 1, limit: 1 }));
    }

    struct FailingSource {
        sent: bool,
    }

    impl FrameSource for FailingSource {
        fn next_frame(&mut self) -> Result<Option<RawFrame>> {
            if self.sent {
                return Err(TraceError::Io(std::io::Error::other("disk gone")));
            }
            self.sent = true;
            Ok(Some(udp(0)))
        }
    }

    #[test]
    fn test_threaded_source_error_propagates() {
        let err = Analyzer::new(&Config::default(), CollectSink::new())
            .run_threaded(FailingSource { sent: false })
            .unwrap_err();
        assert!(matches!(err, TraceError::Io(_)));
    }
}
