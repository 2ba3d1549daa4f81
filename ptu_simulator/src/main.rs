use std::{path::PathBuf, sync::Arc};

use ptu_simulator::{
    communication::run_communication_layer,
    config::{create_default_config, init_config},
    controller::controller_service::{create_controller, run_controller},
    logging,
    state_monitor::{StateSink, TracingStateSink, WatchStateSink, run_state_monitor},
};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

fn should_create_config() -> bool {
    std::env::var("CREATE_CONFIG")
        .map(|val| val == "1" || val.to_lowercase() == "true")
        .unwrap_or(false)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if should_create_config() {
        create_default_config(None::<PathBuf>)?;
    }

    let (config_manager, config) = init_config().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Run with CREATE_CONFIG=1 to create a default configuration file.");
        e
    })?;

    let _guard = logging::init(&config.logging);
    info!(
        "Loaded configuration from {}",
        config_manager.config_path().display()
    );

    let controller = create_controller(&config);

    let (state_tx, state_rx) = watch::channel(None);
    let sinks: Vec<Arc<dyn StateSink>> = vec![
        Arc::new(WatchStateSink::new(state_tx)),
        Arc::new(TracingStateSink),
    ];
    tokio::spawn(run_state_monitor(
        controller.clone(),
        sinks,
        config.publish_period(),
    ));

    let (command_tx, command_rx) = mpsc::channel(100);
    tokio::spawn(run_controller(command_rx, controller.clone()));

    tokio::select! {
        result = run_communication_layer(&config.server.socket_path, command_tx, state_rx) => {
            if let Err(e) = &result {
                error!("Communication layer stopped: {:#}", e);
            }
            controller.shutdown().await;
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            controller.shutdown().await;
            Ok(())
        }
    }
}
