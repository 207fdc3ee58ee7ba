use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of external energy demand. Immutable once created; exactly one
/// plant ever claims it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandRequest {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub amount_kwh: f64,
}

impl DemandRequest {
    pub fn new(amount_kwh: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            amount_kwh,
        }
    }

    pub fn with_id(id: Uuid, created_at: DateTime<Utc>, amount_kwh: f64) -> Self {
        Self {
            id,
            created_at,
            amount_kwh,
        }
    }
}
