use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use relaybot::{Communicator, Config, Runner};

const DEFAULT_CONFIG_PATH: &str = "relaybot.toml";

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {config_path}: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };

    if let Err(e) = relaybot::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        relaybot::logging::init_console_only(&config.logging.level);
    }

    info!("relaybot starting with {}", config_path);

    let communicator = Arc::new(Communicator::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::new();
    for (name, network) in config.networks() {
        match network {
            Ok(network) => {
                info!(
                    network = %name,
                    "Relaying {} on {}:{} as {} ({})",
                    network.channel, network.host, network.port, network.nickname, network.mode
                );
                let runner = Runner::for_network(
                    network,
                    &config,
                    Arc::clone(&communicator),
                    shutdown_rx.clone(),
                );
                handles.push(tokio::spawn(runner.run()));
            }
            Err(e) => error!(network = %name, "Skipping network: {}", e),
        }
    }

    if handles.is_empty() {
        warn!("No usable networks configured; nothing to relay");
        return;
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Interrupted, disconnecting");
            let _ = shutdown_tx.send(true);
        }
        // Without a signal handler the runners simply keep going.
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
            error!("Runner task failed: {}", e);
        }
    }

    info!("relaybot stopped");
}
