use std::fmt;

use crate::session_management::drain::Side;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    MissingDestHost,
    NotInRange(String),
}

impl ConfigError {
    /// Process exit status used by `main` when configuration fails.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConfigError::MissingDestHost => 3,
            _ => 1,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::MissingDestHost => write!(f, "--dest-host must be specified"),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum NetworkError {
    BindError(std::io::Error),
    AcceptError(std::io::Error),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::BindError(e) => write!(f, "Network bind error: {}", e),
            NetworkError::AcceptError(e) => write!(f, "Accept failed: {}", e),
        }
    }
}

impl std::error::Error for NetworkError {}

#[derive(Debug)]
pub enum CaptureError {
    FileError(std::io::Error),
    WriteError(std::io::Error),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::FileError(e) => write!(f, "Capture file error: {}", e),
            CaptureError::WriteError(e) => write!(f, "Capture write error: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

#[derive(Debug)]
pub enum SessionError {
    CaptureOpen(CaptureError),
    ConnectFailed(std::io::Error),
    Read { side: Side, source: std::io::Error },
    Write { side: Side, source: std::io::Error },
    /// The readiness wait returned without any ready source.
    NoReadySources,
    Closed,
}

impl SessionError {
    /// Only a broken readiness invariant is allowed to take the process down.
    pub fn is_process_fatal(&self) -> bool {
        matches!(self, SessionError::NoReadySources)
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            SessionError::NoReadySources => 4,
            _ => 1,
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::CaptureOpen(e) => write!(f, "Unable to open capture: {}", e),
            SessionError::ConnectFailed(e) => write!(f, "Destination connect failed: {}", e),
            SessionError::Read { side, source } => write!(f, "Read from {} failed: {}", side, source),
            SessionError::Write { side, source } => write!(f, "Write to {} failed: {}", side, source),
            SessionError::NoReadySources => {
                write!(f, "Readiness wait returned no ready sources")
            }
            SessionError::Closed => write!(f, "Session already closed"),
        }
    }
}

impl std::error::Error for SessionError {}
