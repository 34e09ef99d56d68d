use std::{
    process,
    sync::{Arc, OnceLock},
};

use base_status::{
    config::Config,
    core::{ChannelRegistry, LifecycleController},
    device::SimulatedBase,
    logger::LoggerManager,
    print_error,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::new().unwrap_or_else(|e| {
            print_error!("{}", e);
            process::exit(1);
        })
    })
}

/// Builds the channel registry for the compiled-in transport. The returned
/// token stops the transport's background work.
#[cfg(feature = "mqtt")]
fn channel_registry(cfg: &Config) -> (Arc<dyn ChannelRegistry>, CancellationToken) {
    let cancel = CancellationToken::new();
    let (registry, connection) = base_status::transport::mqtt::connect(
        &cfg.transport,
        &cfg.publisher.node_name,
        cancel.clone(),
    )
    .unwrap_or_else(|e| {
        error!("Failed to set up MQTT transport: {}", e);
        process::exit(1);
    });
    tokio::spawn(connection.run());
    (Arc::new(registry), cancel)
}

#[cfg(not(feature = "mqtt"))]
fn channel_registry(_cfg: &Config) -> (Arc<dyn ChannelRegistry>, CancellationToken) {
    info!("Running without a network transport (trace-log channels)");
    (
        Arc::new(base_status::transport::log::LogRegistry),
        CancellationToken::new(),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config();
    let logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });
    info!(
        "Starting base-status version {}...",
        env!("CARGO_PKG_VERSION")
    );
    info!("Log level: {}", cfg.logger.level);
    debug!("{:#?}", cfg.publisher);

    let (registry, transport_cancel) = channel_registry(cfg);

    let controller: Arc<LifecycleController<SimulatedBase>> =
        Arc::new(LifecycleController::new(registry, &cfg.publisher));

    let handle = controller.on_start().unwrap_or_else(|e| {
        error!("Failed to start status publisher: {}", e);
        transport_cancel.cancel();
        process::exit(1);
    });

    // Device access is granted asynchronously by the host; simulate the grant.
    {
        let controller = controller.clone();
        let delay = cfg.publisher.authorization_delay();
        tokio::spawn(async move {
            if !delay.is_zero() {
                info!("Waiting {:?} for device authorization", delay);
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = controller.set_device(SimulatedBase::new(&cfg.device)) {
                warn!("Device injection rejected: {}", e);
            }
        });
    }

    // The loop never restarts itself; a failed loop exits non-zero so the
    // supervisor can restart the process.
    let mut failed = tokio::select! {
        reason = handle.stopped() => {
            error!("Status publisher stopped: {}", reason);
            reason.is_failure()
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
            controller.on_shutdown();
            false
        }
    };

    match controller.on_shutdown_complete().await {
        Ok(Some(reason)) => {
            debug!("Publish loop joined: {}", reason);
            failed |= reason.is_failure();
        }
        Ok(None) => {}
        Err(e) => {
            error!("{}", e);
            failed = true;
        }
    }

    transport_cancel.cancel();
    debug!("Cancellation token triggered, transport disconnecting...");
    tokio::time::sleep(tokio::time::Duration::from_millis(300)).await;

    info!("Shutdown complete");
    if failed {
        process::exit(1);
    }
    Ok(())
}
