use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use log::{debug, info, trace, warn};
use tokio::io::{AsyncWriteExt, Interest};
use tokio::net::TcpStream;

use crate::configuration::config::RelayConfig;
use crate::data_capture::capture_writer::HexCaptureWriter;
use crate::data_capture::naming::capture_file_name;
use crate::data_capture::types::CaptureRecord;
use crate::error_handling::types::SessionError;

use super::drain::{DrainPolicy, DrainStep, ReadySet, Side};
use super::SessionState;

/// What a finished session leaves behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub peer: SocketAddr,
    pub capture_path: PathBuf,
    /// Bytes relayed in both directions.
    pub bytes_relayed: u64,
    /// Capture records successfully written.
    pub records: u64,
}

enum PumpOutcome {
    /// Nothing more to read right now; go back to waiting.
    Idle,
    /// The source reported end of stream.
    Eof,
}

/// One accepted connection, its paired destination connection and its capture file.
///
/// A session is driven by a single task: [`RelaySession::run`] waits for
/// either socket to become readable, drains it according to the
/// [`DrainPolicy`], captures each chunk and writes it to the other socket.
/// End of stream on either side ends the whole session.
///
/// All three resources are released by [`RelaySession::close`], which runs at
/// most once no matter how many exit paths reach it (including `Drop`).
pub struct RelaySession {
    config: Arc<RelayConfig>,
    peer: SocketAddr,
    capture_path: PathBuf,
    inbound: Option<TcpStream>,
    outbound: Option<TcpStream>,
    capture: Option<HexCaptureWriter<BufWriter<File>>>,
    policy: DrainPolicy,
    buf: Vec<u8>,
    bytes_relayed: u64,
    state: SessionState,
}

impl RelaySession {
    /// Sets up a session for an accepted connection.
    ///
    /// In order: names and creates the capture file, writes its header,
    /// connects to the destination. The streams are registered with the
    /// runtime's reactor on creation, which is the readiness context the
    /// relay loop waits on.
    ///
    /// # Errors
    ///
    /// - [`SessionError::CaptureOpen`] when the capture file cannot be created
    /// - [`SessionError::ConnectFailed`] when the destination is unreachable;
    ///   the capture file is closed and keeps only its header
    pub async fn open(
        inbound: TcpStream,
        peer: SocketAddr,
        config: Arc<RelayConfig>,
    ) -> Result<Self, SessionError> {
        let opened_at = Local::now();
        let capture_path = config
            .capture_dir
            .join(capture_file_name(&opened_at, peer));

        info!("Opening file {}", capture_path.display());
        let mut capture = HexCaptureWriter::create(&capture_path, config.hex_stride)
            .map_err(SessionError::CaptureOpen)?;

        let destination = config.destination();
        if let Err(e) = capture.write_header(peer, &destination, &opened_at) {
            warn!("[{}] unable to write capture header: {}", peer, e);
        }

        let outbound = match TcpStream::connect((config.dest_host.as_str(), config.dest_port)).await
        {
            Ok(stream) => stream,
            Err(e) => {
                if let Err(flush) = capture.finish() {
                    warn!("[{}] unable to close {}: {}", peer, capture_path.display(), flush);
                }
                return Err(SessionError::ConnectFailed(e));
            }
        };
        debug!("[{}] connected to {}", peer, destination);

        let policy = DrainPolicy::new(config.max_segment);
        Ok(Self {
            buf: vec![0u8; policy.max_segment()],
            policy,
            config,
            peer,
            capture_path,
            inbound: Some(inbound),
            outbound: Some(outbound),
            capture: Some(capture),
            bytes_relayed: 0,
            state: SessionState::Open,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn capture_path(&self) -> &Path {
        &self.capture_path
    }

    pub fn bytes_relayed(&self) -> u64 {
        self.bytes_relayed
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn destination(&self) -> String {
        self.config.destination()
    }

    /// Relays until either side closes or an I/O error occurs, then closes
    /// everything.
    ///
    /// Returns the summary on a clean end of stream. Any other ending comes
    /// back as the error that caused it, after the session has been closed.
    pub async fn run(mut self) -> Result<SessionSummary, SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed);
        }
        self.state = SessionState::Relaying;

        let result = self.relay().await;
        let summary = self.close();

        match result {
            Ok(side) => {
                debug!("[{}] {} closed the connection", self.peer, side);
                summary.ok_or(SessionError::Closed)
            }
            Err(e) => {
                warn!("[{}] session ended: {}", self.peer, e);
                Err(e)
            }
        }
    }

    /// Releases both sockets and the capture file.
    ///
    /// Returns the summary the first time and `None` on every later call.
    pub fn close(&mut self) -> Option<SessionSummary> {
        if self.state == SessionState::Closed {
            return None;
        }
        self.state = SessionState::Closed;

        drop(self.inbound.take());
        drop(self.outbound.take());

        let records = match self.capture.take() {
            Some(capture) => {
                let records = capture.records();
                if let Err(e) = capture.finish() {
                    warn!("[{}] unable to close {}: {}", self.peer, self.capture_path.display(), e);
                }
                records
            }
            None => 0,
        };

        info!(
            "Closing file {}, {} data bytes written.",
            self.capture_path.display(),
            self.bytes_relayed
        );

        Some(SessionSummary {
            peer: self.peer,
            capture_path: self.capture_path.clone(),
            bytes_relayed: self.bytes_relayed,
            records,
        })
    }

    async fn relay(&mut self) -> Result<Side, SessionError> {
        loop {
            trace!("[{}] selecting", self.peer);
            let ready = self.wait_ready().await?;
            trace!("[{}] {} source(s) ready", self.peer, ready.len());

            for side in ready.iter() {
                trace!("[{}] {} ready for read", self.peer, side);
                if let PumpOutcome::Eof = self.pump(side).await? {
                    return Ok(side);
                }
            }
        }
    }

    /// Blocks this task, and only this task, until a socket is readable.
    async fn wait_ready(&self) -> Result<ReadySet, SessionError> {
        let (inbound, outbound) = match (self.inbound.as_ref(), self.outbound.as_ref()) {
            (Some(inbound), Some(outbound)) => (inbound, outbound),
            _ => return Err(SessionError::Closed),
        };

        let mut ready = ReadySet::empty();
        tokio::select! {
            r = inbound.ready(Interest::READABLE) => {
                let r = r.map_err(|source| SessionError::Read { side: Side::Inbound, source })?;
                ready.insert(Side::Inbound, r);
            }
            r = outbound.ready(Interest::READABLE) => {
                let r = r.map_err(|source| SessionError::Read { side: Side::Outbound, source })?;
                ready.insert(Side::Outbound, r);
            }
        }
        ready.ensure_ready()
    }

    /// Reads `side` until the drain policy yields, relaying every chunk.
    ///
    /// `WouldBlock` means nothing is queued right now and is not an error;
    /// a zero-length read is end of stream.
    async fn pump(&mut self, side: Side) -> Result<PumpOutcome, SessionError> {
        let (from, to) = match side {
            Side::Inbound => (self.inbound.as_ref(), self.outbound.as_mut()),
            Side::Outbound => (self.outbound.as_ref(), self.inbound.as_mut()),
        };
        let (Some(from), Some(to)) = (from, to) else {
            return Err(SessionError::Closed);
        };

        loop {
            let read = match from.try_read(&mut self.buf) {
                Ok(0) => return Ok(PumpOutcome::Eof),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    trace!("[{}] nothing to read from {}", self.peer, side);
                    return Ok(PumpOutcome::Idle);
                }
                Err(source) => return Err(SessionError::Read { side, source }),
            };
            let captured_at = Local::now();
            trace!("[{}] read {} from {}", self.peer, read, side);

            let chunk = &self.buf[..read];
            if let Some(capture) = self.capture.as_mut() {
                let record = CaptureRecord::new(side.direction(), chunk, captured_at);
                if let Err(e) = capture.write_chunk(&record) {
                    warn!("[{}] capture record dropped: {}", self.peer, e);
                }
            }

            to.write_all(chunk).await.map_err(|source| SessionError::Write {
                side: side.opposite(),
                source,
            })?;
            self.bytes_relayed += read as u64;

            if self.policy.after_read(read) == DrainStep::Yield {
                return Ok(PumpOutcome::Idle);
            }
        }
    }
}

impl fmt::Debug for RelaySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelaySession")
            .field("peer", &self.peer)
            .field("destination", &self.config.destination())
            .field("capture_path", &self.capture_path)
            .field("bytes_relayed", &self.bytes_relayed)
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        self.close();
    }
}
