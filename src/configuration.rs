pub mod config;

pub use config::{CliArgs, FileConfig, RelayConfig};
