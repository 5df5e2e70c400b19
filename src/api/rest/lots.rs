use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use tracing::info;

use crate::engine::recalc::enqueue_recalculation;
use crate::error::AppError;
use crate::models::allocation::Allocation;
use crate::models::location::Location;
use crate::models::lot::{LotId, NewParkingLot, ParkingLot};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/lots", post(create_lot).get(list_lots))
        .route("/lots/:id", get(get_lot).delete(delete_lot))
        .route("/lots/:id/available", patch(update_available))
        .route("/lots/:id/allocations", get(list_lot_allocations))
}

#[derive(Deserialize)]
pub struct CreateLotRequest {
    pub name: String,
    pub location: Location,
    pub capacity: u32,
}

#[derive(Deserialize)]
pub struct UpdateAvailableRequest {
    pub available: u32,
}

async fn create_lot(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateLotRequest>,
) -> Result<Json<ParkingLot>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    if payload.capacity == 0 {
        return Err(AppError::BadRequest("capacity must be > 0".to_string()));
    }

    if !payload.location.is_finite() {
        return Err(AppError::BadRequest(
            "location must have finite coordinates".to_string(),
        ));
    }

    let lot = state
        .store
        .create_parking_lot(NewParkingLot {
            name: payload.name,
            location: payload.location,
            capacity: payload.capacity,
        })
        .await?;

    info!(lot_id = lot.id, capacity = lot.capacity, "parking lot registered");
    Ok(Json(lot))
}

async fn list_lots(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ParkingLot>>, AppError> {
    Ok(Json(state.store.list_parking_lots().await?))
}

async fn get_lot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<LotId>,
) -> Result<Json<ParkingLot>, AppError> {
    Ok(Json(state.store.get_parking_lot(id).await?))
}

async fn update_available(
    State(state): State<Arc<AppState>>,
    Path(id): Path<LotId>,
    Json(payload): Json<UpdateAvailableRequest>,
) -> Result<Json<ParkingLot>, AppError> {
    let lot = state
        .store
        .update_available_spaces(id, payload.available)
        .await?;

    info!(
        lot_id = id,
        available = payload.available,
        "advertised availability updated"
    );
    enqueue_recalculation(&state, id).await?;

    Ok(Json(lot))
}

async fn delete_lot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<LotId>,
) -> Result<Json<ParkingLot>, AppError> {
    // Evict everyone first so each user hears about the deallocation before
    // the lot disappears.
    let allocations = state.store.get_parking_lot_allocations(id).await?;
    for allocation in &allocations {
        state.engine.remove_allocation(allocation.user_id).await?;
    }

    let lot = state.store.delete_parking_lot(id).await?;
    info!(
        lot_id = id,
        evicted = allocations.len(),
        "parking lot removed"
    );
    Ok(Json(lot))
}

async fn list_lot_allocations(
    State(state): State<Arc<AppState>>,
    Path(id): Path<LotId>,
) -> Result<Json<Vec<Allocation>>, AppError> {
    Ok(Json(state.store.get_parking_lot_allocations(id).await?))
}
