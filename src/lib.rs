//! Offline TCP connection reconstruction from Ethernet pcap captures
//!
//! Frames are decoded down to TCP, grouped into bidirectional connections,
//! and summarized once the capture is exhausted: per-connection timing and
//! counters, trace-wide RTT, and duration/packet/window aggregates.
//!
//! ```ignore
//! use connscope::{analyze_file, config::Config};
//!
//! let trace = analyze_file("capture.pcap", &Config::default())?;
//! println!("{} connections", trace.summary.total_connections);
//! ```

pub mod analysis;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod flow;
pub mod report;

use std::path::Path;

use tracing::info;

pub use analysis::Trace;
pub use config::Config;
pub use error::{Result, TraceError};

use engine::{Analyzer, DiagnosticSink, LogSink, PcapFileSource};

/// Analyze a capture file, logging diagnostics through `tracing`
pub fn analyze_file<P: AsRef<Path>>(path: P, config: &Config) -> Result<Trace> {
    analyze_file_with(path, config, LogSink)
}

/// Analyze a capture file, reporting diagnostics to `sink`
pub fn analyze_file_with<P, D>(path: P, config: &Config, sink: D) -> Result<Trace>
where
    P: AsRef<Path>,
    D: DiagnosticSink,
{
    config.validate()?;
    info!("Analyzing {}", path.as_ref().display());

    let mut source = PcapFileSource::open(path)?;
    let analyzer = Analyzer::new(config, sink);
    if config.pipeline.threaded {
        analyzer.run_threaded(source)
    } else {
        analyzer.run(&mut source)
    }
}
