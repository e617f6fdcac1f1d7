//! Common data types used across the data_capture subsystem.

use std::fmt;

use chrono::{DateTime, Local};

/// Direction of TCP flow for captured bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Bytes read from the inbound peer, forwarded to the destination.
    Inbound,
    /// Bytes read from the destination, forwarded to the inbound peer.
    Outbound,
}

impl Direction {
    /// Single-letter marker that opens a capture record.
    pub fn marker(self) -> &'static str {
        match self {
            Direction::Inbound => "I",
            Direction::Outbound => "O",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

/// One read event: the bytes of a single read plus when and where they came from.
#[derive(Debug, Clone, Copy)]
pub struct CaptureRecord<'a> {
    pub direction: Direction,
    /// Wall-clock time the chunk was read, not when it reaches the file.
    pub captured_at: DateTime<Local>,
    pub bytes: &'a [u8],
}

impl<'a> CaptureRecord<'a> {
    pub fn new(direction: Direction, bytes: &'a [u8], captured_at: DateTime<Local>) -> Self {
        Self {
            direction,
            captured_at,
            bytes,
        }
    }
}
