//! Pricing service functions with store access.
//!
//! Price-in-effect resolution, rate supersession, tier management and the
//! display-only quote/preview helpers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::AppCache;
use crate::db::{Store, StoreError};

use super::calculators::{
    compute_price, find_overlap, preview_prices, rate_problem, round_money, validate_tier_input,
    PricePreview,
};
use super::models::{Price, PriceTarget, PriceTier, TierInput};

/// Result of pricing a single duration for a room
#[derive(Debug, Clone)]
pub struct QuoteResult {
    pub room_price: Price,
    pub duration_minutes: i32,
    pub amount: Decimal,
    pub tier_count: usize,
}

/// Preview table for a room's price in effect
#[derive(Debug, Clone)]
pub struct PreviewResult {
    pub room_price: Price,
    pub tiers: Vec<PriceTier>,
    pub rows: Vec<PricePreview>,
}

/// Pricing error types
#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("No price in effect for {target} at {at}")]
    PriceNotFound {
        target: PriceTarget,
        at: DateTime<Utc>,
    },

    #[error("Price tier {0} not found")]
    TierNotFound(Uuid),

    #[error("Invalid rate {0}: must be positive with at most two fraction digits")]
    InvalidRate(Decimal),

    #[error("Duration must be positive (got {0} minutes)")]
    InvalidDuration(i32),

    #[error("New price for {target} must start after {current_valid_from} (got {valid_from})")]
    InvalidOrdering {
        target: PriceTarget,
        valid_from: DateTime<Utc>,
        current_valid_from: DateTime<Utc>,
    },

    #[error("Invalid tier: {}", .errors.join("; "))]
    InvalidTier { errors: Vec<String> },

    #[error("Tier [{from_minutes}, {}) overlaps tier {conflicting_tier_id}", .to_minutes.map_or("inf".to_string(), |m| m.to_string()))]
    OverlappingTier {
        from_minutes: i32,
        to_minutes: Option<i32>,
        conflicting_tier_id: Uuid,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Find the price record in effect for `target` at `at`.
pub async fn resolve_price_at<S: Store + ?Sized>(
    store: &S,
    target: PriceTarget,
    at: DateTime<Utc>,
) -> Result<Price, PricingError> {
    store
        .find_price_valid_at(target, at)
        .await?
        .ok_or(PricingError::PriceNotFound { target, at })
}

/// Replace the open price of `target` with a new one starting at `valid_from`.
///
/// The current open record is closed at `valid_from` and the new record opened
/// in one store transaction. If the target has never been priced, the first
/// record is opened.
pub async fn update_rate<S: Store + ?Sized>(
    store: &S,
    target: PriceTarget,
    new_rate: Decimal,
    valid_from: DateTime<Utc>,
) -> Result<Price, PricingError> {
    if rate_problem(new_rate).is_some() {
        return Err(PricingError::InvalidRate(new_rate));
    }
    let new_rate = round_money(new_rate);

    let current = store.find_open_price(target).await?;
    if let Some(open) = &current {
        if valid_from <= open.valid_from {
            return Err(PricingError::InvalidOrdering {
                target,
                valid_from,
                current_valid_from: open.valid_from,
            });
        }
    }

    let price = store
        .supersede_price(target, current.as_ref().map(|p| p.id), valid_from, new_rate)
        .await?;

    tracing::info!(
        "Rate for {} set to {} from {} (price {}, replaced {:?})",
        target,
        price.rate,
        price.valid_from,
        price.id,
        current.map(|p| p.id)
    );

    Ok(price)
}

/// Load tiers through the cache. Display paths only.
async fn cached_tiers<S: Store + ?Sized>(
    store: &S,
    cache: &AppCache,
    price_id: Uuid,
) -> Result<Arc<Vec<PriceTier>>, PricingError> {
    if let Some(cached) = cache.tiers.get(&price_id).await {
        tracing::debug!("Cache HIT for tiers of price {}", price_id);
        return Ok(cached);
    }

    tracing::debug!("Cache MISS for tiers of price {}", price_id);
    let tiers = Arc::new(store.list_tiers(price_id).await?);
    cache.tiers.insert(price_id, tiers.clone()).await;
    Ok(tiers)
}

/// Price a duration for a room using the price in effect at `at`.
pub async fn quote<S: Store + ?Sized>(
    store: &S,
    cache: &AppCache,
    room_id: Uuid,
    duration_minutes: i32,
    at: DateTime<Utc>,
) -> Result<QuoteResult, PricingError> {
    if duration_minutes <= 0 {
        return Err(PricingError::InvalidDuration(duration_minutes));
    }

    let room_price = resolve_price_at(store, PriceTarget::Room(room_id), at).await?;
    let tiers = cached_tiers(store, cache, room_price.id).await?;
    let amount = compute_price(room_price.rate, &tiers, duration_minutes);

    Ok(QuoteResult {
        duration_minutes,
        amount,
        tier_count: tiers.len(),
        room_price,
    })
}

/// Price preview over the standard durations for a room.
pub async fn preview<S: Store + ?Sized>(
    store: &S,
    cache: &AppCache,
    room_id: Uuid,
    at: DateTime<Utc>,
) -> Result<PreviewResult, PricingError> {
    let room_price = resolve_price_at(store, PriceTarget::Room(room_id), at).await?;
    let tiers = cached_tiers(store, cache, room_price.id).await?;
    let rows = preview_prices(room_price.rate, &tiers);

    Ok(PreviewResult {
        room_price,
        tiers: tiers.to_vec(),
        rows,
    })
}

/// Tiers of a room price, ascending by `from_minutes`.
pub async fn list_tiers<S: Store + ?Sized>(
    store: &S,
    price_id: Uuid,
) -> Result<Vec<PriceTier>, PricingError> {
    Ok(store.list_tiers(price_id).await?)
}

/// Validate a tier against its siblings and persist it.
async fn save_checked_tier<S: Store + ?Sized>(
    store: &S,
    cache: &AppCache,
    tier: PriceTier,
) -> Result<PriceTier, PricingError> {
    let siblings = store.list_tiers(tier.price_id).await?;
    if let Some(clash) = find_overlap(&tier, &siblings) {
        return Err(PricingError::OverlappingTier {
            from_minutes: tier.from_minutes,
            to_minutes: tier.to_minutes,
            conflicting_tier_id: clash.id,
        });
    }

    let saved = store.save_tier(&tier).await?;
    cache.invalidate_tiers(saved.price_id).await;
    Ok(saved)
}

fn check_tier_input(input: &TierInput) -> Result<(), PricingError> {
    let errors = validate_tier_input(input);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(PricingError::InvalidTier { errors })
    }
}

pub async fn create_tier<S: Store + ?Sized>(
    store: &S,
    cache: &AppCache,
    price_id: Uuid,
    input: TierInput,
) -> Result<PriceTier, PricingError> {
    check_tier_input(&input)?;

    let tier = PriceTier {
        id: Uuid::new_v4(),
        price_id,
        from_minutes: input.from_minutes,
        to_minutes: input.to_minutes,
        kind: input.kind,
        rate: round_money(input.rate),
        sort_order: input.sort_order,
    };

    let saved = save_checked_tier(store, cache, tier).await?;
    tracing::info!(
        "Created {} tier {} on price {}",
        saved.kind,
        saved.id,
        saved.price_id
    );
    Ok(saved)
}

pub async fn update_tier<S: Store + ?Sized>(
    store: &S,
    cache: &AppCache,
    tier_id: Uuid,
    input: TierInput,
) -> Result<PriceTier, PricingError> {
    check_tier_input(&input)?;

    let existing = store
        .find_tier(tier_id)
        .await?
        .ok_or(PricingError::TierNotFound(tier_id))?;

    let tier = PriceTier {
        from_minutes: input.from_minutes,
        to_minutes: input.to_minutes,
        kind: input.kind,
        rate: round_money(input.rate),
        sort_order: input.sort_order,
        ..existing
    };

    let saved = save_checked_tier(store, cache, tier).await?;
    tracing::info!("Updated tier {} on price {}", saved.id, saved.price_id);
    Ok(saved)
}

pub async fn delete_tier<S: Store + ?Sized>(
    store: &S,
    cache: &AppCache,
    tier_id: Uuid,
) -> Result<(), PricingError> {
    let existing = store
        .find_tier(tier_id)
        .await?
        .ok_or(PricingError::TierNotFound(tier_id))?;

    store.delete_tier(tier_id).await?;
    cache.invalidate_tiers(existing.price_id).await;
    tracing::info!("Deleted tier {} from price {}", tier_id, existing.price_id);
    Ok(())
}
