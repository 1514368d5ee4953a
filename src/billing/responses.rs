//! Response DTOs for billing API endpoints.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::models::Billing;

/// Billing header without line items, for list views
#[derive(Debug, Serialize)]
pub struct BillingSummary {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub provider_name: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_amount: Decimal,
    pub item_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&Billing> for BillingSummary {
    fn from(billing: &Billing) -> Self {
        Self {
            id: billing.id,
            provider_id: billing.provider_id,
            provider_name: billing.provider_name.clone(),
            period_start: billing.period_start,
            period_end: billing.period_end,
            total_amount: billing.total_amount,
            item_count: billing.items.len(),
            created_at: billing.created_at,
        }
    }
}

/// Result of one generation batch
#[derive(Debug, Serialize)]
pub struct GenerateBillingsResponse {
    pub billing_count: usize,
    pub item_count: usize,
    pub billings: Vec<Billing>,
}

impl From<Vec<Billing>> for GenerateBillingsResponse {
    fn from(billings: Vec<Billing>) -> Self {
        Self {
            billing_count: billings.len(),
            item_count: billings.iter().map(|b| b.items.len()).sum(),
            billings,
        }
    }
}
