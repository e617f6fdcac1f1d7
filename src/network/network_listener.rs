//! # Network Listener Module
//!
//! This module accepts inbound TCP connections and hands each one to its own
//! [`RelaySession`], running on its own task.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌────────────────────┐    ┌──────────────────┐
//! │ Incoming        │───▶│ ConnectionAcceptor │───▶│ RelaySession     │
//! │ Connections     │    │                    │    │ (one task each)  │
//! └─────────────────┘    │ - bind + backlog   │    └──────────────────┘
//!                        │ - accept loop      │
//!                        └────────────────────┘
//! ```
//!
//! The acceptor never waits on a session: it spawns and goes straight back
//! to `accept`. Sessions share nothing but the immutable [`RelayConfig`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hexrelay::configuration::config::RelayConfig;
//! use hexrelay::network::network_listener::ConnectionAcceptor;
//! use hexrelay::error_handling::types::NetworkError;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), NetworkError> {
//!     let config = Arc::new(RelayConfig::for_destination("10.0.0.5", 80));
//!     let acceptor = ConnectionAcceptor::bind(config)?;
//!     acceptor.run().await;
//!     Ok(())
//! }
//! ```

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::configuration::config::RelayConfig;
use crate::error_handling::types::{NetworkError, SessionError};
use crate::session_management::session::{RelaySession, SessionSummary};

/// Pause after an accept failure that is not tied to one connection
/// (descriptor or memory exhaustion), so the loop does not spin on it.
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Accepts connections on the configured port and starts one session per
/// connection.
///
/// `ConnectionAcceptor` is responsible for:
/// - Binding the listening socket with the configured backlog
/// - Accepting connections in an endless loop
/// - Spawning an independent [`RelaySession`] task for each of them
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use hexrelay::configuration::config::RelayConfig;
/// use hexrelay::network::network_listener::ConnectionAcceptor;
///
/// #[tokio::main]
/// async fn main() {
///     let config = Arc::new(RelayConfig::for_destination("127.0.0.1", 8000));
///     let acceptor = ConnectionAcceptor::bind(config).unwrap();
///     println!("listening on {}", acceptor.local_addr().unwrap());
/// }
/// ```
#[derive(Debug)]
pub struct ConnectionAcceptor {
    /// Listening socket, bound on every IPv4 interface
    listener: TcpListener,

    /// Configuration handed to every session
    config: Arc<RelayConfig>,
}

impl ConnectionAcceptor {
    /// Binds `0.0.0.0:<listen_port>` with the configured backlog.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::BindError`] if:
    /// - The socket cannot be created
    /// - The port is already in use, or privileged (< 1024) without permission
    pub fn bind(config: Arc<RelayConfig>) -> Result<Self, NetworkError> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.listen_port));

        let socket = match TcpSocket::new_v4() {
            Ok(sock) => sock,
            Err(err) => {
                error!("[!] Socket error: {:?}", err);
                return Err(NetworkError::BindError(err));
            }
        };
        socket.set_reuseaddr(true).map_err(NetworkError::BindError)?;
        socket.bind(addr).map_err(|err| {
            error!("[!] Unable to bind {}: {}", addr, err);
            NetworkError::BindError(err)
        })?;
        let listener = socket
            .listen(config.backlog)
            .map_err(NetworkError::BindError)?;

        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.listener.local_addr().map_err(NetworkError::BindError)
    }

    /// Accepts one connection and spawns its session.
    ///
    /// The returned handle resolves when that session is over; callers are
    /// free to drop it, the session keeps running.
    pub async fn accept_next(
        &self,
    ) -> Result<JoinHandle<Result<SessionSummary, SessionError>>, NetworkError> {
        debug!("accepting");
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(NetworkError::AcceptError)?;
        debug!("accepted {}", peer);

        let config = Arc::clone(&self.config);
        Ok(tokio::spawn(handle_connection(stream, peer, config)))
    }

    /// Accepts forever. A failed accept is logged and the loop carries on,
    /// after [`ACCEPT_RETRY_DELAY`] when the failure would repeat at once.
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("Listening on {}", addr);
        }
        loop {
            if let Err(e) = self.accept_next().await {
                error!("{}", e);
                let pause = retry_delay(&e);
                if !pause.is_zero() {
                    sleep(pause).await;
                }
            }
        }
    }
}

/// How long to wait before accepting again after `err`.
///
/// A connection that was reset or aborted before it was accepted only
/// affects itself, so the next accept can follow straight away. Anything
/// else (`EMFILE`, `ENFILE`, `ENOBUFS`, ...) stays true until something else
/// releases resources.
pub fn retry_delay(err: &NetworkError) -> Duration {
    match err {
        NetworkError::AcceptError(e) => match e.kind() {
            io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock => Duration::ZERO,
            _ => ACCEPT_RETRY_DELAY,
        },
        NetworkError::BindError(_) => ACCEPT_RETRY_DELAY,
    }
}

/// Runs one session from open to close.
///
/// Per-session failures stay here: they are logged and returned through the
/// task's handle. The one exception is [`SessionError::NoReadySources`], a
/// broken reactor invariant, which terminates the process.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<RelayConfig>,
) -> Result<SessionSummary, SessionError> {
    let session = match RelaySession::open(stream, peer, config).await {
        Ok(session) => session,
        Err(e) => {
            warn!("[{}] unable to start session: {}", peer, e);
            return Err(e);
        }
    };

    let result = session.run().await;
    if let Err(e) = &result {
        if e.is_process_fatal() {
            error!("[{}] {}, exiting", peer, e);
            std::process::exit(e.exit_code());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::timeout;
    use tokio_test::{assert_err, assert_ok};

    fn config_for(upstream: &TcpListener, dir: &TempDir) -> Arc<RelayConfig> {
        let mut config =
            RelayConfig::for_destination("127.0.0.1", upstream.local_addr().unwrap().port());
        config.listen_port = 0;
        config.capture_dir = dir.path().to_path_buf();
        Arc::new(config)
    }

    #[tokio::test]
    async fn bind_on_ephemeral_port() {
        let dir = TempDir::new().unwrap();
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let acceptor = assert_ok!(ConnectionAcceptor::bind(config_for(&upstream, &dir)));

        assert_ne!(assert_ok!(acceptor.local_addr()).port(), 0);
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let first = assert_ok!(ConnectionAcceptor::bind(config_for(&upstream, &dir)));

        let mut taken = (*config_for(&upstream, &dir)).clone();
        taken.listen_port = first.local_addr().unwrap().port();
        let err = assert_err!(ConnectionAcceptor::bind(Arc::new(taken)));
        assert!(matches!(err, NetworkError::BindError(_)));
    }

    #[tokio::test]
    async fn accepted_connection_is_relayed() {
        let dir = TempDir::new().unwrap();
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let acceptor = ConnectionAcceptor::bind(config_for(&upstream, &dir)).unwrap();
        let port = acceptor.local_addr().unwrap().port();

        let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let handle = assert_ok!(acceptor.accept_next().await);
        let (mut dest, _) = upstream.accept().await.unwrap();

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        dest.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        dest.write_all(b"pong").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        drop(client);
        let summary = assert_ok!(timeout(Duration::from_secs(5), handle).await.unwrap().unwrap());
        assert_eq!(summary.bytes_relayed, 8);
        assert_eq!(summary.records, 2);
    }

    #[tokio::test]
    async fn accept_loop_does_not_wait_on_sessions() {
        let dir = TempDir::new().unwrap();
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let acceptor = ConnectionAcceptor::bind(config_for(&upstream, &dir)).unwrap();
        let port = acceptor.local_addr().unwrap().port();
        let server = tokio::spawn(acceptor.run());

        // The first session stays open while the second one is served.
        let _idle = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let (_idle_dest, _) = timeout(Duration::from_secs(5), upstream.accept())
            .await
            .unwrap()
            .unwrap();

        let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let (mut dest, _) = timeout(Duration::from_secs(5), upstream.accept())
            .await
            .unwrap()
            .unwrap();
        client.write_all(b"second").await.unwrap();
        let mut buf = [0u8; 6];
        timeout(Duration::from_secs(5), dest.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf, b"second");

        server.abort();
    }

    #[test]
    fn resource_exhaustion_pauses_the_accept_loop() {
        // EMFILE has no ErrorKind of its own
        let emfile = NetworkError::AcceptError(io::Error::from_raw_os_error(24));
        assert_eq!(retry_delay(&emfile), ACCEPT_RETRY_DELAY);
        assert!(!ACCEPT_RETRY_DELAY.is_zero());

        let oom = NetworkError::AcceptError(io::Error::from(io::ErrorKind::OutOfMemory));
        assert_eq!(retry_delay(&oom), ACCEPT_RETRY_DELAY);
    }

    #[test]
    fn per_connection_accept_errors_retry_at_once() {
        for kind in [io::ErrorKind::ConnectionAborted, io::ErrorKind::ConnectionReset] {
            let err = NetworkError::AcceptError(io::Error::from(kind));
            assert_eq!(retry_delay(&err), Duration::ZERO);
        }
    }

    #[tokio::test]
    async fn unreachable_destination_ends_only_that_session() {
        let dir = TempDir::new().unwrap();
        let closed_port = {
            let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
            probe.local_addr().unwrap().port()
        };
        let mut config = RelayConfig::for_destination("127.0.0.1", closed_port);
        config.listen_port = 0;
        config.capture_dir = dir.path().to_path_buf();
        let acceptor = ConnectionAcceptor::bind(Arc::new(config)).unwrap();
        let port = acceptor.local_addr().unwrap().port();

        let _client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let handle = acceptor.accept_next().await.unwrap();
        let err = assert_err!(handle.await.unwrap());
        assert!(matches!(err, SessionError::ConnectFailed(_)));

        // The acceptor is still usable afterwards.
        let _again = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let handle = assert_ok!(acceptor.accept_next().await);
        assert_err!(handle.await.unwrap());
    }
}
