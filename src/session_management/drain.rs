//! Drain policy and readiness bookkeeping for the relay loop.

use std::fmt;

use tokio::io::Ready;

use crate::data_capture::types::Direction;
use crate::error_handling::types::SessionError;

/// One of the two sockets a session owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The accepted client connection.
    Inbound,
    /// The connection the session opened to the destination.
    Outbound,
}

impl Side {
    /// Capture direction of bytes read from this side.
    pub fn direction(self) -> Direction {
        match self {
            Side::Inbound => Direction::Inbound,
            Side::Outbound => Direction::Outbound,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Inbound => Side::Outbound,
            Side::Outbound => Side::Inbound,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Inbound => f.write_str("client"),
            Side::Outbound => f.write_str("destination"),
        }
    }
}

/// What to do after a successful non-empty read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStep {
    /// The buffer came back full; more is probably queued on the same socket.
    ReadAgain,
    /// Give the other direction a turn.
    Yield,
}

/// Keep reading one source only while each read fills the whole buffer.
///
/// A message of exactly `max_segment` bytes therefore costs one extra read
/// that finds nothing, and a longer message is split into one capture record
/// per full buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainPolicy {
    max_segment: usize,
}

impl DrainPolicy {
    pub fn new(max_segment: usize) -> Self {
        Self { max_segment }
    }

    pub fn max_segment(&self) -> usize {
        self.max_segment
    }

    pub fn after_read(&self, read: usize) -> DrainStep {
        if read == self.max_segment {
            DrainStep::ReadAgain
        } else {
            DrainStep::Yield
        }
    }
}

/// Sources reported ready by one readiness wait, in service order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadySet {
    inbound: bool,
    outbound: bool,
}

impl ReadySet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Records `side` when `ready` carries anything a read has to observe,
    /// including a closed read half.
    pub fn insert(&mut self, side: Side, ready: Ready) {
        if ready.is_readable() || ready.is_read_closed() {
            match side {
                Side::Inbound => self.inbound = true,
                Side::Outbound => self.outbound = true,
            }
        }
    }

    pub fn contains(&self, side: Side) -> bool {
        match side {
            Side::Inbound => self.inbound,
            Side::Outbound => self.outbound,
        }
    }

    pub fn len(&self) -> usize {
        usize::from(self.inbound) + usize::from(self.outbound)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Side> + '_ {
        [Side::Inbound, Side::Outbound]
            .into_iter()
            .filter(move |side| self.contains(*side))
    }

    /// An indefinite wait that wakes with nothing ready breaks the reactor
    /// contract; report it as the process-fatal error.
    pub fn ensure_ready(self) -> Result<Self, SessionError> {
        if self.is_empty() {
            Err(SessionError::NoReadySources)
        } else {
            Ok(self)
        }
    }
}
