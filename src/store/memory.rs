//! In-memory implementation of the parking store.
//!
//! Lots, allocations and the id counter live behind a single
//! `tokio::sync::RwLock`, so every commit observes and mutates a consistent
//! snapshot; that one write lock is what makes `allocate_parking_lot`
//! atomic. State is lost on restart, which makes this backend suitable for
//! development, tests and single-node deployments.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::geo::euclidean;
use crate::models::allocation::{Allocation, UserId};
use crate::models::location::Location;
use crate::models::lot::{LotId, NewParkingLot, ParkingLot};
use crate::store::{ParkingStore, StoreError, StoreResult};

struct MemoryInner {
    lots: HashMap<LotId, ParkingLot>,
    allocations: HashMap<UserId, Allocation>,
    next_lot_id: LotId,
}

pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryInner {
                lots: HashMap::new(),
                allocations: HashMap::new(),
                next_lot_id: 1,
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ParkingStore for MemoryStore {
    async fn create_parking_lot(&self, new_lot: NewParkingLot) -> StoreResult<ParkingLot> {
        let mut inner = self.inner.write().await;
        let id = inner.next_lot_id;
        inner.next_lot_id += 1;

        let lot = ParkingLot {
            id,
            name: new_lot.name,
            location: new_lot.location,
            capacity: new_lot.capacity,
            num_available: new_lot.capacity,
            num_allocated: 0,
        };
        inner.lots.insert(id, lot.clone());
        Ok(lot)
    }

    async fn get_parking_lot(&self, lot_id: LotId) -> StoreResult<ParkingLot> {
        self.inner
            .read()
            .await
            .lots
            .get(&lot_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("parking lot {lot_id}")))
    }

    async fn list_parking_lots(&self) -> StoreResult<Vec<ParkingLot>> {
        let mut lots: Vec<ParkingLot> = self.inner.read().await.lots.values().cloned().collect();
        lots.sort_by_key(|lot| lot.id);
        Ok(lots)
    }

    async fn delete_parking_lot(&self, lot_id: LotId) -> StoreResult<ParkingLot> {
        let mut inner = self.inner.write().await;
        let removed = inner
            .lots
            .remove(&lot_id)
            .ok_or_else(|| StoreError::NotFound(format!("parking lot {lot_id}")))?;
        inner
            .allocations
            .retain(|_, allocation| allocation.lot_id != lot_id);
        Ok(removed)
    }

    async fn update_available_spaces(
        &self,
        lot_id: LotId,
        available: u32,
    ) -> StoreResult<ParkingLot> {
        let mut inner = self.inner.write().await;
        let lot = inner
            .lots
            .get_mut(&lot_id)
            .ok_or_else(|| StoreError::NotFound(format!("parking lot {lot_id}")))?;
        if available > lot.capacity {
            return Err(StoreError::Invalid(format!(
                "available spaces {available} exceed capacity {}",
                lot.capacity
            )));
        }
        lot.num_available = available;
        Ok(lot.clone())
    }

    async fn get_available_parking_lots(
        &self,
        near: &Location,
        limit: usize,
        excluded: &HashSet<LotId>,
    ) -> StoreResult<Vec<ParkingLot>> {
        let inner = self.inner.read().await;
        let mut candidates: Vec<ParkingLot> = inner
            .lots
            .values()
            .filter(|lot| lot.free_spaces() > 0 && !excluded.contains(&lot.id))
            .cloned()
            .collect();
        candidates.sort_by(|a, b| {
            euclidean(&a.location, near)
                .total_cmp(&euclidean(&b.location, near))
                .then_with(|| a.id.cmp(&b.id))
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn allocate_parking_lot(&self, user_id: UserId, lot_id: LotId) -> StoreResult<bool> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        // Re-accepting the lot the user already holds must not consume a
        // second space.
        if inner
            .allocations
            .get(&user_id)
            .is_some_and(|allocation| allocation.lot_id == lot_id)
        {
            return Ok(true);
        }

        let Some(lot) = inner.lots.get_mut(&lot_id) else {
            return Ok(false);
        };
        if lot.num_allocated >= lot.num_available {
            return Ok(false);
        }
        lot.num_allocated += 1;

        let allocation = Allocation {
            user_id,
            lot_id,
            allocated_at: Utc::now(),
        };
        if let Some(previous) = inner.allocations.insert(user_id, allocation) {
            if let Some(previous_lot) = inner.lots.get_mut(&previous.lot_id) {
                previous_lot.num_allocated = previous_lot.num_allocated.saturating_sub(1);
            }
        }
        Ok(true)
    }

    async fn deallocate_user(&self, user_id: UserId) -> StoreResult<Option<LotId>> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let Some(allocation) = inner.allocations.remove(&user_id) else {
            return Ok(None);
        };
        if let Some(lot) = inner.lots.get_mut(&allocation.lot_id) {
            lot.num_allocated = lot.num_allocated.saturating_sub(1);
        }
        Ok(Some(allocation.lot_id))
    }

    async fn get_parking_lot_allocations(&self, lot_id: LotId) -> StoreResult<Vec<Allocation>> {
        let inner = self.inner.read().await;
        if !inner.lots.contains_key(&lot_id) {
            return Err(StoreError::NotFound(format!("parking lot {lot_id}")));
        }
        let mut allocations: Vec<Allocation> = inner
            .allocations
            .values()
            .filter(|allocation| allocation.lot_id == lot_id)
            .cloned()
            .collect();
        allocations.sort_by_key(|allocation| allocation.user_id);
        Ok(allocations)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn lot_at(name: &str, lat: f64, long: f64, capacity: u32) -> NewParkingLot {
        NewParkingLot {
            name: name.to_string(),
            location: Location::new(lat, long),
            capacity,
        }
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids_and_full_availability() {
        let store = MemoryStore::new();
        let first = store
            .create_parking_lot(lot_at("north", 1.0, 1.0, 5))
            .await
            .unwrap();
        let second = store
            .create_parking_lot(lot_at("south", 2.0, 2.0, 3))
            .await
            .unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.num_available, 5);
        assert_eq!(first.num_allocated, 0);
    }

    #[tokio::test]
    async fn get_reports_unknown_lots() {
        let store = MemoryStore::new();
        let err = store.get_parking_lot(42).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_cascades_to_allocations() {
        let store = MemoryStore::new();
        let lot = store
            .create_parking_lot(lot_at("garage", 0.0, 0.0, 2))
            .await
            .unwrap();
        assert!(store.allocate_parking_lot(7, lot.id).await.unwrap());

        store.delete_parking_lot(lot.id).await.unwrap();

        assert_eq!(store.deallocate_user(7).await.unwrap(), None);
        let err = store.get_parking_lot(lot.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_available_rejects_counts_above_capacity() {
        let store = MemoryStore::new();
        let lot = store
            .create_parking_lot(lot_at("garage", 0.0, 0.0, 3))
            .await
            .unwrap();

        let err = store.update_available_spaces(lot.id, 4).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));

        let updated = store.update_available_spaces(lot.id, 1).await.unwrap();
        assert_eq!(updated.num_available, 1);
    }

    #[tokio::test]
    async fn available_lots_skip_full_and_excluded_ones() {
        let store = MemoryStore::new();
        let full = store
            .create_parking_lot(lot_at("full", 1.0, 0.0, 1))
            .await
            .unwrap();
        let rejected = store
            .create_parking_lot(lot_at("rejected", 2.0, 0.0, 5))
            .await
            .unwrap();
        let open = store
            .create_parking_lot(lot_at("open", 3.0, 0.0, 5))
            .await
            .unwrap();
        assert!(store.allocate_parking_lot(1, full.id).await.unwrap());

        let excluded = HashSet::from([rejected.id]);
        let candidates = store
            .get_available_parking_lots(&Location::new(0.0, 0.0), 10, &excluded)
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, open.id);
    }

    #[tokio::test]
    async fn available_lots_are_nearest_first_and_limited() {
        let store = MemoryStore::new();
        let far = store
            .create_parking_lot(lot_at("far", 3.0, 0.0, 5))
            .await
            .unwrap();
        let near = store
            .create_parking_lot(lot_at("near", 1.0, 0.0, 5))
            .await
            .unwrap();
        let middle = store
            .create_parking_lot(lot_at("middle", 2.0, 0.0, 5))
            .await
            .unwrap();

        let all = store
            .get_available_parking_lots(&Location::new(0.0, 0.0), 10, &HashSet::new())
            .await
            .unwrap();
        let ids: Vec<LotId> = all.iter().map(|lot| lot.id).collect();
        assert_eq!(ids, vec![near.id, middle.id, far.id]);

        let limited = store
            .get_available_parking_lots(&Location::new(0.0, 0.0), 2, &HashSet::new())
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].id, near.id);
    }

    #[tokio::test]
    async fn equidistant_lots_are_ordered_by_lower_id() {
        let store = MemoryStore::new();
        let east = store
            .create_parking_lot(lot_at("east", 0.0, 2.0, 5))
            .await
            .unwrap();
        let west = store
            .create_parking_lot(lot_at("west", 0.0, -2.0, 5))
            .await
            .unwrap();

        let candidates = store
            .get_available_parking_lots(&Location::new(0.0, 0.0), 10, &HashSet::new())
            .await
            .unwrap();
        let ids: Vec<LotId> = candidates.iter().map(|lot| lot.id).collect();
        assert_eq!(ids, vec![east.id, west.id]);
        assert!(east.id < west.id);
    }

    #[tokio::test]
    async fn allocate_refuses_once_advertised_spaces_are_taken() {
        let store = MemoryStore::new();
        let lot = store
            .create_parking_lot(lot_at("garage", 0.0, 0.0, 2))
            .await
            .unwrap();

        assert!(store.allocate_parking_lot(1, lot.id).await.unwrap());
        assert!(store.allocate_parking_lot(2, lot.id).await.unwrap());
        assert!(!store.allocate_parking_lot(3, lot.id).await.unwrap());

        let current = store.get_parking_lot(lot.id).await.unwrap();
        assert_eq!(current.num_allocated, 2);
    }

    #[tokio::test]
    async fn allocate_against_unknown_lot_is_a_refusal() {
        let store = MemoryStore::new();
        assert!(!store.allocate_parking_lot(1, 99).await.unwrap());
    }

    #[tokio::test]
    async fn reaccepting_the_held_lot_consumes_nothing() {
        let store = MemoryStore::new();
        let lot = store
            .create_parking_lot(lot_at("garage", 0.0, 0.0, 2))
            .await
            .unwrap();

        assert!(store.allocate_parking_lot(1, lot.id).await.unwrap());
        assert!(store.allocate_parking_lot(1, lot.id).await.unwrap());

        let current = store.get_parking_lot(lot.id).await.unwrap();
        assert_eq!(current.num_allocated, 1);
    }

    #[tokio::test]
    async fn a_new_allocation_supersedes_the_previous_one() {
        let store = MemoryStore::new();
        let first = store
            .create_parking_lot(lot_at("first", 0.0, 0.0, 2))
            .await
            .unwrap();
        let second = store
            .create_parking_lot(lot_at("second", 5.0, 0.0, 2))
            .await
            .unwrap();

        assert!(store.allocate_parking_lot(1, first.id).await.unwrap());
        assert!(store.allocate_parking_lot(1, second.id).await.unwrap());

        assert_eq!(
            store.get_parking_lot(first.id).await.unwrap().num_allocated,
            0
        );
        assert_eq!(
            store
                .get_parking_lot(second.id)
                .await
                .unwrap()
                .num_allocated,
            1
        );
    }

    #[tokio::test]
    async fn concurrent_allocations_never_exceed_free_spaces() {
        let store = Arc::new(MemoryStore::new());
        let lot = store
            .create_parking_lot(lot_at("garage", 0.0, 0.0, 3))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for user_id in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.allocate_parking_lot(user_id, lot.id).await.unwrap()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }

        assert_eq!(successes, 3);
        let current = store.get_parking_lot(lot.id).await.unwrap();
        assert_eq!(current.num_allocated, 3);
    }

    #[tokio::test]
    async fn deallocate_is_idempotent() {
        let store = MemoryStore::new();
        let lot = store
            .create_parking_lot(lot_at("garage", 0.0, 0.0, 2))
            .await
            .unwrap();
        assert!(store.allocate_parking_lot(1, lot.id).await.unwrap());

        assert_eq!(store.deallocate_user(1).await.unwrap(), Some(lot.id));
        assert_eq!(store.deallocate_user(1).await.unwrap(), None);

        let current = store.get_parking_lot(lot.id).await.unwrap();
        assert_eq!(current.num_allocated, 0);
    }

    #[tokio::test]
    async fn allocations_are_listed_by_user_id() {
        let store = MemoryStore::new();
        let lot = store
            .create_parking_lot(lot_at("garage", 0.0, 0.0, 5))
            .await
            .unwrap();
        for user_id in [5, 1, 9] {
            assert!(store.allocate_parking_lot(user_id, lot.id).await.unwrap());
        }

        let allocations = store.get_parking_lot_allocations(lot.id).await.unwrap();
        let users: Vec<UserId> = allocations.iter().map(|a| a.user_id).collect();
        assert_eq!(users, vec![1, 5, 9]);

        let err = store.get_parking_lot_allocations(42).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
