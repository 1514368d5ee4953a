//! Invoice generation.
//!
//! A batch of bookings becomes one billing per provider. Every price, name and
//! total is copied into the line items at generation time, and the whole batch
//! is written in a single store transaction: either every booking is billed or
//! none is.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::{Store, StoreError};
use crate::models::{Booking, BookingUpgrade};
use crate::pricing::calculators::{compute_price, line_total, round_money};
use crate::pricing::models::PriceTarget;

use super::models::{Billing, BillingItem, BillingItemUpgrade};

/// Billing error types
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("No booking ids given")]
    EmptyBatch,

    #[error("Billing period start {start} must be before end {end}")]
    InvalidPeriod {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("None of the requested bookings exist")]
    NoBookingsFound,

    /// Every offending booking is listed; nothing in the batch was billed
    #[error("Bookings already billed: {0:?}")]
    AlreadyBilled(Vec<Uuid>),

    #[error("Booking {booking_id} has non-positive duration {duration_minutes}")]
    InvalidDuration {
        booking_id: Uuid,
        duration_minutes: i32,
    },

    #[error("Booking {booking_id} has non-positive quantity {quantity} of upgrade {upgrade_id}")]
    InvalidQuantity {
        booking_id: Uuid,
        upgrade_id: Uuid,
        quantity: i32,
    },

    #[error("No room price in effect for room {room_id} at {at} (booking {booking_id})")]
    RoomPriceMissing {
        booking_id: Uuid,
        room_id: Uuid,
        at: DateTime<Utc>,
    },

    #[error("No upgrade price in effect for upgrade {upgrade_id} at {at} (booking {booking_id})")]
    UpgradePriceMissing {
        booking_id: Uuid,
        upgrade_id: Uuid,
        at: DateTime<Utc>,
    },

    #[error("Billing {0} not found")]
    BillingNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Generate and persist one billing per provider for the given bookings.
///
/// Fails without writing anything if no booking exists, if any booking is
/// already billed, or if a price in effect at a booking's start is missing.
pub async fn generate_billings<S: Store + ?Sized>(
    store: &S,
    booking_ids: &[Uuid],
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> Result<Vec<Billing>, BillingError> {
    if booking_ids.is_empty() {
        return Err(BillingError::EmptyBatch);
    }
    if period_start >= period_end {
        return Err(BillingError::InvalidPeriod {
            start: period_start,
            end: period_end,
        });
    }

    let bookings = store.find_bookings(booking_ids).await?;
    if bookings.is_empty() {
        return Err(BillingError::NoBookingsFound);
    }

    let loaded_ids: Vec<Uuid> = bookings.iter().map(|b| b.id).collect();
    let already_billed = store.billed_booking_ids(&loaded_ids).await?;
    if !already_billed.is_empty() {
        tracing::warn!(
            "Rejecting billing batch of {} bookings: {} already billed",
            loaded_ids.len(),
            already_billed.len()
        );
        return Err(BillingError::AlreadyBilled(already_billed));
    }

    let mut by_provider: BTreeMap<Uuid, Vec<Booking>> = BTreeMap::new();
    for booking in bookings {
        by_provider.entry(booking.provider_id).or_default().push(booking);
    }

    let created_at = Utc::now();
    let mut billings = Vec::with_capacity(by_provider.len());

    for (provider_id, mut provider_bookings) in by_provider {
        provider_bookings.sort_by_key(|b| (b.start_time, b.id));

        let billing_id = Uuid::new_v4();
        let mut items = Vec::with_capacity(provider_bookings.len());
        for booking in &provider_bookings {
            items.push(freeze_item(store, billing_id, booking).await?);
        }

        let total_amount = round_money(items.iter().map(|i| i.total_amount).sum());
        billings.push(Billing {
            id: billing_id,
            provider_id,
            provider_name: provider_bookings[0].provider_name.clone(),
            period_start,
            period_end,
            total_amount,
            created_at,
            items,
        });
    }

    match store.save_billings(&billings).await {
        Ok(()) => {}
        Err(StoreError::AlreadyBilled(ids)) => {
            tracing::warn!("Billing batch lost a race: {:?} billed concurrently", ids);
            return Err(BillingError::AlreadyBilled(ids));
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(
        "Generated {} billings for {} bookings ({} to {})",
        billings.len(),
        loaded_ids.len(),
        period_start,
        period_end
    );

    Ok(billings)
}

/// Price one booking and copy every fact the charge depends on.
async fn freeze_item<S: Store + ?Sized>(
    store: &S,
    billing_id: Uuid,
    booking: &Booking,
) -> Result<BillingItem, BillingError> {
    if booking.duration_minutes <= 0 {
        return Err(BillingError::InvalidDuration {
            booking_id: booking.id,
            duration_minutes: booking.duration_minutes,
        });
    }

    let room_price = store
        .find_price_valid_at(PriceTarget::Room(booking.room_id), booking.start_time)
        .await?
        .ok_or(BillingError::RoomPriceMissing {
            booking_id: booking.id,
            room_id: booking.room_id,
            at: booking.start_time,
        })?;

    // Price with exactly the rate that is frozen on the item
    let room_rate = round_money(room_price.rate);
    let tiers = store.list_tiers(room_price.id).await?;
    let subtotal_room = compute_price(room_rate, &tiers, booking.duration_minutes);

    let item_id = Uuid::new_v4();
    let mut upgrades = Vec::with_capacity(booking.upgrades.len());
    for line in &booking.upgrades {
        upgrades.push(freeze_upgrade(store, item_id, booking, line).await?);
    }

    let subtotal_upgrades = round_money(upgrades.iter().map(|u| u.total_amount).sum::<Decimal>());

    Ok(BillingItem {
        id: item_id,
        billing_id,
        booking_id: booking.id,
        room_price_id: room_price.id,
        start_time: booking.start_time,
        end_time: booking.end_time(),
        duration_minutes: booking.duration_minutes,
        resting_minutes: booking.resting_minutes,
        client_alias: booking.client_alias.clone(),
        room_name: booking.room_name.clone(),
        room_rate,
        subtotal_room,
        subtotal_upgrades,
        total_amount: round_money(subtotal_room + subtotal_upgrades),
        upgrades,
    })
}

async fn freeze_upgrade<S: Store + ?Sized>(
    store: &S,
    billing_item_id: Uuid,
    booking: &Booking,
    line: &BookingUpgrade,
) -> Result<BillingItemUpgrade, BillingError> {
    if line.quantity <= 0 {
        return Err(BillingError::InvalidQuantity {
            booking_id: booking.id,
            upgrade_id: line.upgrade_id,
            quantity: line.quantity,
        });
    }

    let price = store
        .find_price_valid_at(PriceTarget::Upgrade(line.upgrade_id), booking.start_time)
        .await?
        .ok_or(BillingError::UpgradePriceMissing {
            booking_id: booking.id,
            upgrade_id: line.upgrade_id,
            at: booking.start_time,
        })?;

    let unit_rate = round_money(price.rate);
    Ok(BillingItemUpgrade {
        id: Uuid::new_v4(),
        billing_item_id,
        upgrade_id: line.upgrade_id,
        upgrade_price_id: price.id,
        upgrade_name: line.upgrade_name.clone(),
        quantity: line.quantity,
        unit_rate,
        total_amount: line_total(unit_rate, line.quantity),
    })
}

pub async fn get_billing<S: Store + ?Sized>(
    store: &S,
    billing_id: Uuid,
) -> Result<Billing, BillingError> {
    store
        .find_billing(billing_id)
        .await?
        .ok_or(BillingError::BillingNotFound(billing_id))
}

/// All billings, most recent first
pub async fn list_billings<S: Store + ?Sized>(store: &S) -> Result<Vec<Billing>, BillingError> {
    Ok(store.list_billings().await?)
}

pub async fn list_billings_for_provider<S: Store + ?Sized>(
    store: &S,
    provider_id: Uuid,
) -> Result<Vec<Billing>, BillingError> {
    Ok(store.list_billings_for_provider(provider_id).await?)
}
