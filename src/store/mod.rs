pub mod memory;

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::allocation::{Allocation, UserId};
use crate::models::location::Location;
use crate::models::lot::{LotId, NewParkingLot, ParkingLot};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid: {0}")]
    Invalid(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// State contract the engine and the REST surface run against.
///
/// `allocate_parking_lot` is where capacity races are decided;
/// implementations must make it atomic.
#[async_trait]
pub trait ParkingStore: Send + Sync {
    async fn create_parking_lot(&self, new_lot: NewParkingLot) -> StoreResult<ParkingLot>;

    async fn get_parking_lot(&self, lot_id: LotId) -> StoreResult<ParkingLot>;

    /// All lots, ordered by id.
    async fn list_parking_lots(&self) -> StoreResult<Vec<ParkingLot>>;

    /// Removes the lot and every allocation recorded against it.
    async fn delete_parking_lot(&self, lot_id: LotId) -> StoreResult<ParkingLot>;

    /// Overwrites the advertised free-space count. Fails with `Invalid` when
    /// the count exceeds the lot's total capacity.
    async fn update_available_spaces(
        &self,
        lot_id: LotId,
        available: u32,
    ) -> StoreResult<ParkingLot>;

    /// Lots with at least one space left to hand out, excluding `excluded`,
    /// nearest to `near` first (ties broken by lower id), at most `limit`
    /// entries.
    async fn get_available_parking_lots(
        &self,
        near: &Location,
        limit: usize,
        excluded: &HashSet<LotId>,
    ) -> StoreResult<Vec<ParkingLot>>;

    /// Atomically reserve one space in `lot_id` for `user_id`.
    ///
    /// Returns `false` when the lot is full or unknown; capacity exhaustion
    /// is a normal negative outcome, not an error. A success supersedes any
    /// allocation the user already held, and re-accepting the currently held
    /// lot succeeds without consuming another space.
    async fn allocate_parking_lot(&self, user_id: UserId, lot_id: LotId) -> StoreResult<bool>;

    /// Releases `user_id`'s allocation, returning the lot it occupied.
    /// Releasing a user with no allocation is a no-op returning `None`.
    async fn deallocate_user(&self, user_id: UserId) -> StoreResult<Option<LotId>>;

    /// Current allocations against a lot, ordered by user id.
    async fn get_parking_lot_allocations(&self, lot_id: LotId) -> StoreResult<Vec<Allocation>>;

    async fn health_check(&self) -> StoreResult<()>;

    fn backend_name(&self) -> &'static str;
}
