//! srcds-control - control daemon for a CS2 dedicated server
//!
//! Main entry point. Initializes:
//! - Configuration loading ([`ConfigManager`])
//! - Logging infrastructure (file rotation + optional console output)
//! - Tokio runtime
//! - State management ([`StateManager`]) and the [`Controller`]
//! - The HTTP (or UDP) log receiver feeding log ingestion
//!
//! # Execution Flow
//!
//! 1. Load `srcds-control.yaml` from the directory given as the first argument,
//!    `SRCDS_CONTROL_CONFIG_DIR`, or the working directory
//! 2. Initialize logging from the `logging` section
//! 3. Create the tokio runtime and the controller
//! 4. Detect an already running server and authenticate against it
//! 5. Ingest log lines until Ctrl-C
//! 6. Log a metrics summary and shut the runtime down

use anyhow::Result;
use srcds_control::models::LogTransport;
use srcds_control::services::{HttpLogReceiver, LogReceiver, SystemHost};
use srcds_control::{APP_NAME, ConfigManager, Controller, Envelope, StateManager, VERSION};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn main() -> Result<()> {
    let config_dir = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SRCDS_CONTROL_CONFIG_DIR").ok())
        .unwrap_or_else(|| ".".to_string());

    let config_manager = ConfigManager::new(&config_dir)?;
    let config = config_manager.load_config()?;

    // Guard must live until shutdown or buffered log lines are lost
    let _log_guard = srcds_control::logging::setup_logging(&config.logging)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    tracing::info!("Using config {}", config_manager.config_path());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("srcds-control-worker")
        .build()?;

    let result = runtime.block_on(run(Arc::new(config)));

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    result
}

async fn run(config: Arc<srcds_control::ControlConfig>) -> Result<()> {
    let state = StateManager::new();
    let controller = Controller::new(Arc::clone(&config), state, Arc::new(SystemHost::new()))?;
    tracing::info!("Controller initialized");

    let (lines_tx, lines_rx) = mpsc::unbounded_channel();
    if config.log_receiver.enabled {
        let addr = config.log_listen_addr();
        match config.log_receiver.transport {
            LogTransport::Http => {
                let receiver = HttpLogReceiver::bind(&addr).await?;
                tokio::spawn(async move {
                    if let Err(e) = receiver.run(lines_tx).await {
                        tracing::error!("HTTP log receiver stopped: {}", e);
                    }
                });
            }
            LogTransport::Udp => {
                let receiver = LogReceiver::bind(&addr, config.log_secret()).await?;
                tokio::spawn(receiver.run(lines_tx));
            }
        }
    } else {
        tracing::info!("Log receiver disabled");
        drop(lines_tx);
    }

    let ingest = controller.clone();
    tokio::spawn(async move { ingest.ingest(lines_rx).await });

    // Mirror operation lifecycle into the daemon log
    let mut subscription = controller.broadcaster().subscribe();
    tokio::spawn(async move {
        while let Some(envelope) = subscription.next().await {
            match envelope {
                Envelope::Operation { operation, action } => {
                    tracing::info!("Operation {}: {:?}", operation, action);
                }
                Envelope::Mapchange { success } => {
                    tracing::info!("Map change finished, success={}", success);
                }
                Envelope::UpdateProgress { step, progress } => {
                    tracing::info!("Update: {} ({}%)", step, progress);
                }
                Envelope::ServerInfo(_) => {}
            }
        }
    });

    if controller.detect_running().await {
        tracing::info!("Attached to running server");
    } else {
        tracing::info!("No running server found");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl-C, shutting down");

    controller.metrics().log_summary();
    Ok(())
}
