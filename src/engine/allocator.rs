use std::sync::Arc;

use tracing::{debug, info};

use crate::error::AppError;
use crate::geo::euclidean;
use crate::models::allocation::UserId;
use crate::models::lot::{LotId, ParkingLot};
use crate::observability::metrics::Metrics;
use crate::protocol::messages::{ParkingDeallocationMessage, ParkingRequestMessage, WsMessage};
use crate::sessions::SessionRegistry;
use crate::store::ParkingStore;

/// Upper bound on the candidate list fetched from the store per request.
const MAX_CANDIDATE_LOTS: usize = 100;

/// Decision core: candidate selection, capacity commits and overflow
/// eviction. Holds no state beyond handles to the store and the session
/// registry, so its operations are safe to run concurrently.
pub struct AllocationEngine {
    store: Arc<dyn ParkingStore>,
    sessions: Arc<SessionRegistry>,
    metrics: Metrics,
}

impl AllocationEngine {
    pub fn new(
        store: Arc<dyn ParkingStore>,
        sessions: Arc<SessionRegistry>,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            sessions,
            metrics,
        }
    }

    /// Picks the nearest available lot for the user, skipping everything the
    /// session has already rejected. `Ok(None)` means no lot qualifies,
    /// which is a legitimate outcome rather than a failure.
    pub async fn handle_request_allocation(
        &self,
        user_id: UserId,
        request: &ParkingRequestMessage,
    ) -> Result<Option<ParkingLot>, AppError> {
        let session = self
            .sessions
            .get_user(user_id)
            .ok_or_else(|| AppError::NotFound(format!("user {user_id} has no active session")))?;

        let candidates = self
            .store
            .get_available_parking_lots(&request.location, MAX_CANDIDATE_LOTS, &session.rejections)
            .await?;

        let nearest = candidates
            .into_iter()
            .map(|lot| (euclidean(&lot.location, &request.location), lot))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, lot)| lot);

        match &nearest {
            Some(lot) => {
                debug!(user_id, lot_id = lot.id, "offering parking lot");
                self.metrics
                    .allocation_requests_total
                    .with_label_values(&["offered"])
                    .inc();
            }
            None => {
                debug!(user_id, "no parking lot available");
                self.metrics
                    .allocation_requests_total
                    .with_label_values(&["unavailable"])
                    .inc();
            }
        }

        Ok(nearest)
    }

    /// Hands the capacity decision to the store. `Ok(false)` means the lot
    /// is full or gone, and the client should request again.
    pub async fn commit_allocation(
        &self,
        user_id: UserId,
        lot_id: LotId,
    ) -> Result<bool, AppError> {
        let committed = self.store.allocate_parking_lot(user_id, lot_id).await?;
        if committed {
            info!(user_id, lot_id, "allocation committed");
            self.metrics
                .allocation_commits_total
                .with_label_values(&["committed"])
                .inc();
        } else {
            debug!(user_id, lot_id, "allocation refused");
            self.metrics
                .allocation_commits_total
                .with_label_values(&["refused"])
                .inc();
        }
        Ok(committed)
    }

    /// Releases the user's allocation, if any, and tells their connection.
    /// Releasing a user with nothing allocated is a no-op.
    pub async fn remove_allocation(&self, user_id: UserId) -> Result<(), AppError> {
        let Some(lot_id) = self.store.deallocate_user(user_id).await? else {
            return Ok(());
        };

        info!(user_id, lot_id, "allocation released");
        self.metrics.deallocations_total.inc();

        let notice = WsMessage::ParkingDeallocation(ParkingDeallocationMessage::new(lot_id)?);
        if !self.sessions.notify(user_id, notice) {
            debug!(user_id, "no session to notify of deallocation");
        }
        Ok(())
    }

    /// Resolves an overflow on the lot by evicting the farthest allocated
    /// users until occupancy fits the advertised availability again.
    ///
    /// Users whose session is gone or who never reported a location rank as
    /// infinitely distant, so they go first; distance ties fall to the lower
    /// user id. Returns how many allocations were evicted.
    pub async fn recalculate_allocations(&self, lot_id: LotId) -> Result<usize, AppError> {
        let lot = self.store.get_parking_lot(lot_id).await?;
        let overflow = lot.overflow();
        if overflow <= 0 {
            return Ok(0);
        }

        let allocations = self.store.get_parking_lot_allocations(lot_id).await?;
        let mut ranked: Vec<(f64, UserId)> = allocations
            .into_iter()
            .map(|allocation| {
                let distance = self
                    .sessions
                    .get_user(allocation.user_id)
                    .and_then(|session| session.location)
                    .map(|location| euclidean(&lot.location, &location))
                    .unwrap_or(f64::INFINITY);
                (distance, allocation.user_id)
            })
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let mut evicted = 0;
        for (distance, user_id) in ranked.into_iter().take(overflow as usize) {
            info!(
                user_id,
                lot_id, distance, "evicting allocation to resolve overflow"
            );
            self.remove_allocation(user_id).await?;
            evicted += 1;
        }

        self.metrics.evictions_total.inc_by(evicted as u64);
        Ok(evicted)
    }
}
