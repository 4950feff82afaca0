use crate::error::Result;
use crate::services::dialog::SessionRegistry;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn};

/// Background worker that periodically fires context timeouts
///
/// Each tick asks the store for sessions whose context expired while idle and
/// routes a timeout through the owning session actor.
pub async fn expiry_sweeper_worker(
    registry: Arc<SessionRegistry>,
    sweep_every: Duration,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) {
    let mut sweep_interval = interval(sweep_every);
    info!("[ExpirySweeper] Started (runs every {:?})", sweep_every);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("[ExpirySweeper] Shutting down");
                break;
            }
            _ = sweep_interval.tick() => {
                match sweep_expired_contexts(&registry).await {
                    Ok(0) => {}
                    Ok(count) => info!("[ExpirySweeper] Timed out {} contexts", count),
                    Err(e) => warn!("[ExpirySweeper] Sweep failed: {}", e),
                }

                let pruned = registry.prune().await;
                if pruned > 0 {
                    info!("[ExpirySweeper] Pruned {} idle session actors", pruned);
                }
            }
        }
    }

    info!("[ExpirySweeper] Stopped");
}

/// Runs one sweep. Returns how many sessions had a timeout processed.
///
/// Sessions are handled concurrently; a failing one is logged and skipped.
pub async fn sweep_expired_contexts(registry: &SessionRegistry) -> Result<usize> {
    let engine = registry.engine();
    let expired = engine.store().expired_contexts(engine.now()).await?;

    let results = join_all(expired.iter().map(|session_id| async move {
        (session_id, registry.dispatch_timeout(session_id).await)
    }))
    .await;

    let mut processed = 0;
    for (session_id, result) in results {
        match result {
            Ok(Some(_)) => processed += 1,
            Ok(None) => {}
            Err(e) => {
                warn!(session_id = %session_id, "[ExpirySweeper] Timeout failed: {}", e);
            }
        }
    }

    Ok(processed)
}
