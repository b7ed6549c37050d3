//! Entry point for the turnstile contention simulator.

use std::sync::Arc;

use tracing::{error, info, warn};
use turnstile_cli::{config::Configuration, logging, simulation};
use turnstile_lock::{CancelHandle, Context, CoordinationStore, MemoryCoordinationStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let configuration = Configuration::new()?;
    let _logging_guard = logging::init_logging(&configuration.logging_config())?;

    turnstile_lock::metrics::init_metrics();

    let locker_config = configuration.locker_config()?;
    let simulation_config = configuration.simulation_config();
    info!(
        claim_set = %locker_config.claim_set,
        max_lease_ms = locker_config.max_lease_ms,
        "Locker configuration loaded"
    );

    let (root, cancel) = Context::background().with_cancel();
    tokio::spawn(cancel_on_shutdown_signal(cancel));

    let store: Arc<dyn CoordinationStore> = Arc::new(MemoryCoordinationStore::new());
    let report = simulation::run(store, &locker_config, &simulation_config, &root).await?;

    println!("{}", report);

    if !report.is_exclusive() {
        error!(violations = report.violations, "Mutual exclusion was violated");
        anyhow::bail!("mutual exclusion violated {} times", report.violations);
    }
    Ok(())
}

/// Cancel outstanding acquisitions on Ctrl+C or SIGTERM
async fn cancel_on_shutdown_signal(cancel: CancelHandle) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, canceling outstanding acquisitions"),
        _ = terminate => info!("Received SIGTERM, canceling outstanding acquisitions"),
    }
    cancel.cancel();
}
