use std::sync::Arc;

use clap::Parser;
use hexrelay::configuration::config::{CliArgs, RelayConfig};
use hexrelay::network::network_listener::ConnectionAcceptor;
use log::{error, info};

#[tokio::main]
async fn main() {
    // Get command-line arguments; clap prints usage and exits on bad input
    let args = CliArgs::parse();

    let config = match RelayConfig::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            // The logger is not configured yet
            eprintln!("{}", e);
            eprintln!("Run with --help for usage");
            std::process::exit(e.exit_code());
        }
    };

    env_logger::Builder::new()
        .filter_level(if config.debug {
            log::LevelFilter::Trace
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .format_target(false)
        .init();

    info!(
        "hexrelay v{}: relaying :{} to {}",
        env!("CARGO_PKG_VERSION"),
        config.listen_port,
        config.destination()
    );
    info!("Process output files with text2pcap:");
    info!("\t{}", config.text2pcap_hint());

    let acceptor = match ConnectionAcceptor::bind(Arc::new(config)) {
        Ok(acceptor) => acceptor,
        Err(e) => {
            error!("Unable to start the listener: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    acceptor.run().await;
}
