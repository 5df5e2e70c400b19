use serde::{Deserialize, Serialize};

/// Geographic coordinate reported by clients and carried by parking lots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub long: f64,
}

impl Location {
    pub fn new(lat: f64, long: f64) -> Self {
        Self { lat, long }
    }

    /// A location is usable only when both coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.long.is_finite()
    }
}
