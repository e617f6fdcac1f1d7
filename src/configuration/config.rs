use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use crate::error_handling::types::ConfigError;

/// Listening port used when neither the CLI nor the file sets one.
pub const DEFAULT_SERVER_PORT: u16 = 8080;
/// Destination port used when neither the CLI nor the file sets one.
pub const DEFAULT_DEST_PORT: u16 = 80;
/// Per-read buffer size and drain threshold.
pub const DEFAULT_MAX_SEGMENT: usize = 32768;
/// Pending-connection queue length for the listening socket.
pub const LISTEN_BACKLOG: u32 = 20;
/// Bytes per hex row in capture records.
pub const HEX_STRIDE: usize = 128;

/// Command-line surface of the relay.
///
/// Every value is optional here so that a TOML file given with `--config`
/// can fill in what the command line leaves out. Defaults are applied last,
/// in [`RelayConfig::resolve`].
///
/// # Command Line
/// ```text
/// hexrelay --dest-host <host-or-ip> [--dest-port <port>] [--server-port <port>]
///          [--debug [true|false]] [--max-segment <size>] [--capture-dir <dir>]
///          [--config <file>]
/// ```
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "hexrelay")]
#[command(version)]
#[command(about = "Transparent TCP relay writing text2pcap-compatible hex captures")]
pub struct CliArgs {
    /// TOML file holding the same keys as the long options
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Port to accept inbound connections on (default 8080)
    #[arg(long)]
    pub server_port: Option<u16>,

    /// Host or IP every session is relayed to
    #[arg(long)]
    pub dest_host: Option<String>,

    /// Port on the destination host (default 80)
    #[arg(long)]
    pub dest_port: Option<u16>,

    /// Verbose tracing; a bare `--debug` means `true`
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub debug: Option<bool>,

    /// Per-read buffer size in bytes (default 32768)
    #[arg(long)]
    pub max_segment: Option<usize>,

    /// Directory capture files are created in (default: current directory)
    #[arg(long)]
    pub capture_dir: Option<PathBuf>,
}

/// Contents of the optional `--config` file.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub server_port: Option<u16>,
    pub dest_host: Option<String>,
    pub dest_port: Option<u16>,
    pub debug: Option<bool>,
    pub max_segment: Option<usize>,
    pub capture_dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))
    }
}

/// Immutable runtime configuration shared by the acceptor and every session.
///
/// Built once before the listener starts and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub listen_port: u16,
    pub dest_host: String,
    pub dest_port: u16,
    pub debug: bool,
    pub max_segment: usize,
    pub capture_dir: PathBuf,
    pub backlog: u32,
    pub hex_stride: usize,
}

impl RelayConfig {
    /// Loads the file named by `--config` (if any) and merges it under the
    /// command-line values.
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let file = match args.config.as_deref() {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(args, file)
    }

    /// CLI over file over defaults, then validation.
    pub fn resolve(args: CliArgs, file: FileConfig) -> Result<Self, ConfigError> {
        let dest_host = args
            .dest_host
            .or(file.dest_host)
            .filter(|host| !host.trim().is_empty())
            .ok_or(ConfigError::MissingDestHost)?;

        let max_segment = args
            .max_segment
            .or(file.max_segment)
            .unwrap_or(DEFAULT_MAX_SEGMENT);
        if max_segment == 0 {
            return Err(ConfigError::NotInRange(String::from(
                "--max-segment must be at least 1",
            )));
        }

        Ok(Self {
            listen_port: args
                .server_port
                .or(file.server_port)
                .unwrap_or(DEFAULT_SERVER_PORT),
            dest_host,
            dest_port: args
                .dest_port
                .or(file.dest_port)
                .unwrap_or(DEFAULT_DEST_PORT),
            debug: args.debug.or(file.debug).unwrap_or(false),
            max_segment,
            capture_dir: args
                .capture_dir
                .or(file.capture_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            backlog: LISTEN_BACKLOG,
            hex_stride: HEX_STRIDE,
        })
    }

    /// A configuration with defaults for everything but the destination.
    pub fn for_destination(dest_host: impl Into<String>, dest_port: u16) -> Self {
        Self {
            listen_port: DEFAULT_SERVER_PORT,
            dest_host: dest_host.into(),
            dest_port,
            debug: false,
            max_segment: DEFAULT_MAX_SEGMENT,
            capture_dir: PathBuf::from("."),
            backlog: LISTEN_BACKLOG,
            hex_stride: HEX_STRIDE,
        }
    }

    /// `host:port` of the destination, as printed in capture headers.
    pub fn destination(&self) -> String {
        format!("{}:{}", self.dest_host, self.dest_port)
    }

    /// The text2pcap invocation that turns this relay's captures into pcap.
    pub fn text2pcap_hint(&self) -> String {
        format!(
            "text2pcap -n -t %T. -D -T {},{} infile outfile.pcap",
            self.listen_port, self.dest_port
        )
    }
}
