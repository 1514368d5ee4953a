//! Request DTOs for billing API endpoints.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

/// Request to invoice a batch of bookings
#[derive(Debug, Deserialize)]
pub struct GenerateBillingsRequest {
    pub booking_ids: Vec<Uuid>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}
