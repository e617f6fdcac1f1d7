//! Per-connection relay sessions.
//!
//! A [`session::RelaySession`] owns an accepted connection, the connection
//! it opens to the destination and the capture file both directions are
//! logged to. [`drain`] holds the read-scheduling rules the relay loop
//! follows.

/// Drain policy and readiness bookkeeping.
pub mod drain;
/// The relay-and-capture session itself.
pub mod session;

pub use drain::{DrainPolicy, DrainStep, ReadySet, Side};
pub use session::{RelaySession, SessionSummary};

/// Lifecycle of a session.
///
/// - `Open`: sockets and capture file exist, relaying has not started.
/// - `Relaying`: the copy loop is running.
/// - `Closed`: every resource has been released. Terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Relaying,
    Closed,
}
