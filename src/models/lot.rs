use serde::{Deserialize, Serialize};

use crate::models::location::Location;

pub type LotId = i64;

/// A parking facility with a fixed capacity and an operator-adjustable
/// count of advertised free spaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingLot {
    pub id: LotId,
    pub name: String,
    pub location: Location,
    pub capacity: u32,
    pub num_available: u32,
    pub num_allocated: u32,
}

impl ParkingLot {
    /// Spaces still open for allocation: advertised availability minus what
    /// has already been handed out.
    pub fn free_spaces(&self) -> u32 {
        self.num_available.saturating_sub(self.num_allocated)
    }

    /// Allocations in excess of the advertised availability. Positive when
    /// the operator lowered `num_available` below current occupancy.
    pub fn overflow(&self) -> i64 {
        i64::from(self.num_allocated) - i64::from(self.num_available)
    }
}

/// Payload for registering a new lot. Availability starts at full capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewParkingLot {
    pub name: String,
    pub location: Location,
    pub capacity: u32,
}
