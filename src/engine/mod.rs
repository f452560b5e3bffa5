//! Trace engine
//!
//! Reads frames from a source, decodes and tracks them, and hands the
//! connections to the analysis stage once the source is exhausted.
//!
//! # Architecture
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ FrameSource │────▶│   Analyzer   │────▶│    Trace     │
//! │ (pcap/mem)  │     │ decode+track │     │ timing / RTT │
//! └─────────────┘     └──────────────┘     └──────────────┘
//!                            │
//!                            ▼
//!                     ┌──────────────┐
//!                     │ Diagnostics  │
//!                     └──────────────┘
//! ```

pub mod capture;
pub mod diagnostics;
pub mod pipeline;

pub use capture::{timestamp_from_epoch, FrameSource, MemorySource, PcapFileSource};
pub use diagnostics::{CollectSink, Diagnostic, DiagnosticCategory, DiagnosticSink, LogSink};
pub use pipeline::{Analyzer, PipelineStats};
