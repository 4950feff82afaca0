use flowbot::providers::{ActionRegistry, FileFlowProvider};
use flowbot::store::{InMemorySessionStore, StoreConfig};
use flowbot::validation::validate_flows;
use flowbot::workers::expiry_sweeper_worker;
use flowbot::{load_config, DialogEngine, SessionRegistry};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowbot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config()?;
    tracing::debug!("Loaded configuration:\n{}", config);

    let flows = Arc::new(FileFlowProvider::load(&config.flows.directory).await?);
    let flow_count = validate_flows(flows.as_ref()).await?;
    tracing::info!(
        "Loaded {} flows from {}",
        flow_count,
        flows.directory().display()
    );

    let engine = Arc::new(DialogEngine::new(
        config.dialog.clone(),
        flows,
        Arc::new(ActionRegistry::with_builtins()),
        Arc::new(InMemorySessionStore::new(StoreConfig::default())),
    ));
    let registry = Arc::new(SessionRegistry::new(Arc::clone(&engine), config.runtime.clone()));

    let mut lifecycle = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match lifecycle.recv().await {
                Ok(event) => tracing::debug!(?event, "[Dialog] Lifecycle event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("[Dialog] Lifecycle log skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let sweeper = tokio::spawn(expiry_sweeper_worker(
        Arc::clone(&registry),
        config.runtime.sweeper_interval(),
        shutdown_rx,
    ));

    tracing::info!(
        "flowbot ready (default flow: {}, context timeout: {}, session timeout: {})",
        config.dialog.default_flow,
        config.dialog.context_timeout_interval,
        config.dialog.session_timeout_interval
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    let _ = shutdown_tx.send(());
    registry.shutdown_all().await;
    if let Err(e) = sweeper.await {
        tracing::warn!("Expiry sweeper did not stop cleanly: {}", e);
    }

    tracing::info!("flowbot stopped");
    Ok(())
}
