use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use lib_common::actuators::KasaBulb;
use lib_common::core::Orchestrator;
use lib_common::loggers::LogBuffer;

mod flag_logic;
use flag_logic::{config, downstream, logger};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = config::load_settings()?;
    logger::setup_logging(&settings.log_dir, &settings.log_level)?;
    log::info!(
        "Starting race flag monitor: feed {}, bulb '{}', control API on port {}",
        settings.feed,
        settings.kasa_ip,
        settings.port
    );

    let logs = LogBuffer::default();
    let colors = Arc::new(settings.colors.clone());
    let bulb = KasaBulb::new(settings.kasa_ip.clone(), colors.clone())
        .with_credentials(settings.credentials.clone());

    let (orchestrator, handle) = Orchestrator::new(
        Box::new(settings.feeds.clone()),
        bulb,
        colors,
        settings.feed,
        logs.sink(),
    );

    let shutdown = CancellationToken::new();
    let orchestrator_handle = tokio::spawn(orchestrator.run(shutdown.clone()));

    let state = downstream::AppState::new(handle, logs, settings.kasa_ip.clone());
    let api_shutdown = shutdown.clone();
    let port = settings.port;
    let downstream_handle = tokio::spawn(async move {
        let served = downstream::run(port, state, api_shutdown.clone()).await;
        // A control API that cannot bind takes the whole process down
        api_shutdown.cancel();
        served
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = terminate() => {
            log::info!("SIGTERM received, initiating shutdown.");
        }
        _ = shutdown.cancelled() => {}
    }

    shutdown.cancel();

    let (_, served) = tokio::try_join!(orchestrator_handle, downstream_handle)?;
    if let Err(e) = served {
        log::error!("Control API failed: {}", e);
    }

    log::info!("Shutdown complete.");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut term_signal) => {
            term_signal.recv().await;
        }
        Err(e) => {
            log::warn!("Cannot listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
