use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::lot::LotId;

pub type UserId = i64;

/// A binding of one user to one lot, consuming one advertised space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub user_id: UserId,
    pub lot_id: LotId,
    pub allocated_at: DateTime<Utc>,
}
