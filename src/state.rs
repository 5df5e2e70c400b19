use std::sync::Arc;

use tokio::sync::mpsc;

use crate::engine::allocator::AllocationEngine;
use crate::models::lot::LotId;
use crate::observability::metrics::Metrics;
use crate::sessions::SessionRegistry;
use crate::store::ParkingStore;

pub struct AppState {
    pub store: Arc<dyn ParkingStore>,
    pub sessions: Arc<SessionRegistry>,
    pub engine: AllocationEngine,
    pub recalc_tx: mpsc::Sender<LotId>,
    pub outbound_buffer_size: usize,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ParkingStore>,
        recalc_queue_size: usize,
        outbound_buffer_size: usize,
    ) -> (Self, mpsc::Receiver<LotId>) {
        let (recalc_tx, recalc_rx) = mpsc::channel(recalc_queue_size);
        let sessions = Arc::new(SessionRegistry::new());
        let metrics = Metrics::new();
        let engine = AllocationEngine::new(store.clone(), sessions.clone(), metrics.clone());

        (
            Self {
                store,
                sessions,
                engine,
                recalc_tx,
                outbound_buffer_size,
                metrics,
            },
            recalc_rx,
        )
    }
}
