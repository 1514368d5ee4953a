//! Storage traits for bookings, prices, tiers and invoices.
//!
//! Two backends are provided: [`PgStore`] for Postgres and [`MemoryStore`] for
//! tests and local runs without a database.

mod memory;
mod postgres;

pub use memory::{BookingDraft, MemoryStore};
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::billing::models::Billing;
use crate::models::Booking;
use crate::pricing::models::{Price, PriceTarget, PriceTier};

/// Storage-layer failure
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// One or more bookings already have a billing item
    #[error("bookings already billed: {0:?}")]
    AlreadyBilled(Vec<Uuid>),

    /// Optimistic check failed; another writer got there first
    #[error("concurrent modification: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Load the bookings that exist among `ids`; unknown ids are skipped.
    async fn find_bookings(&self, ids: &[Uuid]) -> StoreResult<Vec<Booking>>;

    /// Subset of `ids` that already have a billing item.
    async fn billed_booking_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Uuid>>;
}

#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Price record whose validity window contains `at`.
    async fn find_price_valid_at(
        &self,
        target: PriceTarget,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Price>>;

    /// The record with no `valid_to`, if any.
    async fn find_open_price(&self, target: PriceTarget) -> StoreResult<Option<Price>>;

    async fn find_price(&self, target: PriceTarget, price_id: Uuid) -> StoreResult<Option<Price>>;

    /// Close `expected_open` at `valid_from` and open a new record at `rate`,
    /// as one atomic step.
    ///
    /// `expected_open` must still be the open record when the write happens,
    /// otherwise `StoreError::Conflict` is returned and nothing changes. With
    /// `None` the target must have no open record yet.
    async fn supersede_price(
        &self,
        target: PriceTarget,
        expected_open: Option<Uuid>,
        valid_from: DateTime<Utc>,
        rate: Decimal,
    ) -> StoreResult<Price>;
}

#[async_trait]
pub trait PriceTierStore: Send + Sync {
    /// Tiers of a room price, ascending by `from_minutes`.
    async fn list_tiers(&self, price_id: Uuid) -> StoreResult<Vec<PriceTier>>;

    async fn find_tier(&self, tier_id: Uuid) -> StoreResult<Option<PriceTier>>;

    /// Insert or replace a tier by id.
    async fn save_tier(&self, tier: &PriceTier) -> StoreResult<PriceTier>;

    async fn delete_tier(&self, tier_id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Persist every billing with its items, or none of them.
    ///
    /// Fails with `StoreError::AlreadyBilled` if any booking already has an
    /// item, whether it was billed before or concurrently.
    async fn save_billings(&self, billings: &[Billing]) -> StoreResult<()>;

    async fn find_billing(&self, billing_id: Uuid) -> StoreResult<Option<Billing>>;

    /// All billings, most recent first.
    async fn list_billings(&self) -> StoreResult<Vec<Billing>>;

    async fn list_billings_for_provider(&self, provider_id: Uuid) -> StoreResult<Vec<Billing>>;
}

/// Everything the services need from a backend
pub trait Store: BookingStore + PriceStore + PriceTierStore + BillingStore {}

impl<T> Store for T where T: BookingStore + PriceStore + PriceTierStore + BillingStore {}
