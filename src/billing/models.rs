//! Invoice records.
//!
//! Every field on these structs is copied from live data at generation time and
//! never re-derived afterwards, so later price, tier or booking edits cannot
//! change an issued invoice.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Invoice issued to one provider for one generation batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Billing {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub provider_name: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub items: Vec<BillingItem>,
}

/// Line item for a single booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingItem {
    pub id: Uuid,
    pub billing_id: Uuid,
    /// Audit pointer only; the booking may change or disappear later
    pub booking_id: Uuid,
    pub room_price_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub resting_minutes: Option<i32>,
    pub client_alias: Option<String>,
    pub room_name: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub room_rate: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub subtotal_room: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub subtotal_upgrades: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_amount: Decimal,
    pub upgrades: Vec<BillingItemUpgrade>,
}

/// Upgrade charge on a line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingItemUpgrade {
    pub id: Uuid,
    pub billing_item_id: Uuid,
    pub upgrade_id: Uuid,
    pub upgrade_price_id: Uuid,
    pub upgrade_name: String,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::str")]
    pub unit_rate: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_amount: Decimal,
}

impl Billing {
    pub fn booking_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.items.iter().map(|item| item.booking_id)
    }
}
