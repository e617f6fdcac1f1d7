//! Text capture sink for one relay session.
//!
//! A capture file is one header line followed by one record per read:
//!
//! ```text
//! # Connection from 127.0.0.1:51234 to example.org:80 at Sun Mar 10 07:05:04 UTC 2024
//! I
//! 07:05:04.042
//! 00000 47 45 54 20 2f 0d 0a
//! 00007
//!
//! ```
//!
//! which `text2pcap -n -t %T. -D` turns into a pcap file. The zone in the
//! header is printed by chrono's `%Z`: `UTC` for UTC times, but a numeric
//! offset such as `+02:00` for local times, since chrono has no zone
//! abbreviations. text2pcap skips `#` lines, so only readers see it.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::net::SocketAddr;
use std::path::Path;

use chrono::{DateTime, Local, TimeZone};
use log::trace;

use crate::error_handling::types::CaptureError;

use super::hex_dump::format_hex_block;
use super::types::CaptureRecord;

/// Writes the header and hex-dump records of one session to a text sink.
///
/// Each record is formatted in memory and handed to the sink with a single
/// `write_all`. Records are left to the sink's buffering and reach the file
/// on [`finish`](Self::finish), or earlier when the buffer fills. The header
/// is flushed as soon as it is written.
#[derive(Debug)]
pub struct HexCaptureWriter<W: Write> {
    sink: W,
    stride: usize,
    records: u64,
}

impl HexCaptureWriter<BufWriter<File>> {
    /// Creates (or truncates) the capture file at `path`.
    pub fn create(path: &Path, stride: usize) -> Result<Self, CaptureError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(CaptureError::FileError)?;
        Ok(Self::new(BufWriter::new(file), stride))
    }
}

impl<W: Write> HexCaptureWriter<W> {
    pub fn new(sink: W, stride: usize) -> Self {
        Self {
            sink,
            stride: stride.max(1),
            records: 0,
        }
    }

    /// Writes the `# Connection from ...` line that opens every capture.
    pub fn write_header<Tz>(
        &mut self,
        inbound: SocketAddr,
        destination: &str,
        opened_at: &DateTime<Tz>,
    ) -> Result<(), CaptureError>
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let line = format!(
            "# Connection from {}:{} to {} at {}\n",
            inbound.ip(),
            inbound.port(),
            destination,
            opened_at.format("%a %b %d %H:%M:%S %Z %Y")
        );
        self.put(line.as_bytes())?;
        self.sink.flush().map_err(CaptureError::WriteError)
    }

    /// Appends one record: direction line, read timestamp, hex rows, blank line.
    pub fn write_chunk(&mut self, record: &CaptureRecord<'_>) -> Result<(), CaptureError> {
        let mut text = String::with_capacity(16 + record.bytes.len() * 3);
        text.push_str(record.direction.marker());
        text.push('\n');
        text.push_str(&format_timestamp(&record.captured_at));
        text.push('\n');
        text.push_str(&format_hex_block(record.bytes, self.stride));
        text.push('\n');

        self.put(text.as_bytes())?;
        self.records += 1;
        trace!(
            "capture record #{} ({}, {} bytes)",
            self.records,
            record.direction,
            record.bytes.len()
        );
        Ok(())
    }

    /// Number of records written so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Flushes and hands back the sink; dropping the result closes a file.
    pub fn finish(mut self) -> Result<W, CaptureError> {
        self.sink.flush().map_err(CaptureError::WriteError)?;
        Ok(self.sink)
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), CaptureError> {
        self.sink.write_all(bytes).map_err(CaptureError::WriteError)
    }
}

/// `HH:MM:SS.mmm`, the form text2pcap parses with `-t %T.`
pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format("%H:%M:%S%.3f").to_string()
}
