use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::models::lot::LotId;
use crate::state::AppState;

/// Queues an overflow recalculation for the lot.
pub async fn enqueue_recalculation(state: &AppState, lot_id: LotId) -> Result<(), AppError> {
    state
        .recalc_tx
        .send(lot_id)
        .await
        .map_err(|err| AppError::Internal(format!("recalculation queue send failed: {err}")))?;

    state.metrics.recalculations_in_queue.inc();
    Ok(())
}

/// Background worker draining the recalculation queue.
///
/// One recalculation runs at a time; an allocation racing past a running
/// recalculation is repaired by the next one.
pub async fn run_recalculation_worker(state: Arc<AppState>, mut lot_rx: mpsc::Receiver<LotId>) {
    info!("recalculation worker started");

    while let Some(lot_id) = lot_rx.recv().await {
        state.metrics.recalculations_in_queue.dec();

        let start = Instant::now();
        match state.engine.recalculate_allocations(lot_id).await {
            Ok(evicted) => {
                let elapsed = start.elapsed().as_secs_f64();
                state
                    .metrics
                    .recalculation_latency_seconds
                    .with_label_values(&["success"])
                    .observe(elapsed);
                state
                    .metrics
                    .recalculations_total
                    .with_label_values(&["success"])
                    .inc();
                if evicted > 0 {
                    info!(lot_id, evicted, "resolved lot overflow");
                }
            }
            Err(err) => {
                let elapsed = start.elapsed().as_secs_f64();
                state
                    .metrics
                    .recalculation_latency_seconds
                    .with_label_values(&["error"])
                    .observe(elapsed);
                state
                    .metrics
                    .recalculations_total
                    .with_label_values(&["error"])
                    .inc();
                error!(error = %err, lot_id, "failed to recalculate allocations");
            }
        }
    }

    warn!("recalculation worker stopped: queue channel closed");
}
