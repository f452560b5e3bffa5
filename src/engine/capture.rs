//! Frame sources
//!
//! The analyzer only needs an ordered, exhaustible stream of frames:
//! - `PcapFileSource` reads a classic pcap file
//! - `MemorySource` replays frames held in memory

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pcap_file::pcap::PcapReader;
use pcap_file::DataLink;
use tracing::debug;

use crate::core::packet::RawFrame;
use crate::error::{Result, TraceError};

/// Ordered producer of captured frames
pub trait FrameSource: Send {
    /// Get the next frame, `None` once the source is exhausted
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        (**self).next_frame()
    }
}

/// Convert a pcap timestamp (offset from the Unix epoch) to UTC
pub fn timestamp_from_epoch(offset: Duration) -> Result<DateTime<Utc>> {
    let secs = i64::try_from(offset.as_secs()).map_err(|_| TraceError::InvalidTimestamp(offset))?;
    DateTime::from_timestamp(secs, offset.subsec_nanos()).ok_or(TraceError::InvalidTimestamp(offset))
}

/// Classic pcap file reader
pub struct PcapFileSource<R: Read> {
    reader: PcapReader<R>,
    frames_read: u64,
}

impl PcapFileSource<BufReader<File>> {
    /// Open a capture file from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        debug!("Opened capture file {}", path.as_ref().display());
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> PcapFileSource<R> {
    /// Wrap a reader positioned at the start of a pcap stream
    pub fn new(reader: R) -> Result<Self> {
        let reader = PcapReader::new(reader)?;
        let datalink = reader.header().datalink;
        if !matches!(datalink, DataLink::ETHERNET) {
            return Err(TraceError::UnsupportedLinkType(format!("{:?}", datalink)));
        }
        Ok(Self { reader, frames_read: 0 })
    }

    /// Frames returned so far
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

impl<R: Read + Send> FrameSource for PcapFileSource<R> {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let packet = match self.reader.next_packet() {
            None => return Ok(None),
            Some(packet) => packet?,
        };
        self.frames_read += 1;
        Ok(Some(RawFrame {
            timestamp: timestamp_from_epoch(packet.timestamp)?,
            data: packet.data.into_owned(),
            orig_len: packet.orig_len,
        }))
    }
}

/// Frames held in memory, replayed in order
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    frames: VecDeque<RawFrame>,
}

impl MemorySource {
    pub fn new(frames: Vec<RawFrame>) -> Self {
        Self { frames: frames.into() }
    }

    pub fn push(&mut self, frame: RawFrame) {
        self.frames.push_back(frame);
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl From<Vec<RawFrame>> for MemorySource {
    fn from(frames: Vec<RawFrame>) -> Self {
        Self::new(frames)
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        Ok(self.frames.pop_front())
    }
}
