//! In-process store.
//!
//! All state sits behind a single lock, so each trait call is atomic the same
//! way a Postgres transaction is. Wraps data in Arc for cheap cloning.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BillingStore, BookingStore, PriceStore, PriceTierStore, StoreError, StoreResult};
use crate::billing::models::Billing;
use crate::models::{Booking, BookingUpgrade, Provider, Room, Upgrade};
use crate::pricing::calculators::find_overlap;
use crate::pricing::models::{Price, PriceTarget, PriceTier};

/// Booking as written by the scheduling side, before names are joined in
#[derive(Debug, Clone)]
pub struct BookingDraft {
    pub provider_id: Uuid,
    pub room_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub resting_minutes: Option<i32>,
    pub client_alias: Option<String>,
    /// `(upgrade_id, quantity)` pairs
    pub upgrades: Vec<(Uuid, i32)>,
}

#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    rooms: HashMap<Uuid, Room>,
    providers: HashMap<Uuid, Provider>,
    upgrades: HashMap<Uuid, Upgrade>,
    bookings: HashMap<Uuid, BookingDraft>,
    room_prices: Vec<Price>,
    upgrade_prices: Vec<Price>,
    tiers: HashMap<Uuid, PriceTier>,
    /// Insertion order
    billings: Vec<Billing>,
    /// booking id -> billing item id; one item per booking
    billed: HashMap<Uuid, Uuid>,
}

impl MemoryState {
    fn prices(&self, target: PriceTarget) -> &Vec<Price> {
        match target {
            PriceTarget::Room(_) => &self.room_prices,
            PriceTarget::Upgrade(_) => &self.upgrade_prices,
        }
    }

    fn prices_mut(&mut self, target: PriceTarget) -> &mut Vec<Price> {
        match target {
            PriceTarget::Room(_) => &mut self.room_prices,
            PriceTarget::Upgrade(_) => &mut self.upgrade_prices,
        }
    }

    fn owner_exists(&self, target: PriceTarget) -> bool {
        match target {
            PriceTarget::Room(id) => self.rooms.contains_key(&id),
            PriceTarget::Upgrade(id) => self.upgrades.contains_key(&id),
        }
    }

    fn join_booking(&self, id: Uuid, draft: &BookingDraft) -> StoreResult<Booking> {
        let provider = self.providers.get(&draft.provider_id).ok_or(StoreError::NotFound {
            entity: "provider",
            id: draft.provider_id,
        })?;
        let room = self.rooms.get(&draft.room_id).ok_or(StoreError::NotFound {
            entity: "room",
            id: draft.room_id,
        })?;

        let upgrades = draft
            .upgrades
            .iter()
            .map(|&(upgrade_id, quantity)| {
                let upgrade = self.upgrades.get(&upgrade_id).ok_or(StoreError::NotFound {
                    entity: "upgrade",
                    id: upgrade_id,
                })?;
                Ok(BookingUpgrade {
                    upgrade_id,
                    upgrade_name: upgrade.name.clone(),
                    quantity,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Booking {
            id,
            provider_id: provider.id,
            provider_name: provider.name.clone(),
            room_id: room.id,
            room_name: room.name.clone(),
            start_time: draft.start_time,
            duration_minutes: draft.duration_minutes,
            resting_minutes: draft.resting_minutes,
            client_alias: draft.client_alias.clone(),
            upgrades,
        })
    }
}

impl MemoryStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_room(&self, name: &str) -> Room {
        let room = Room {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        self.inner.write().await.rooms.insert(room.id, room.clone());
        room
    }

    pub async fn rename_room(&self, room_id: Uuid, name: &str) -> StoreResult<()> {
        let mut state = self.inner.write().await;
        let room = state.rooms.get_mut(&room_id).ok_or(StoreError::NotFound {
            entity: "room",
            id: room_id,
        })?;
        room.name = name.to_string();
        Ok(())
    }

    pub async fn insert_provider(&self, name: &str) -> Provider {
        let provider = Provider {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        self.inner
            .write()
            .await
            .providers
            .insert(provider.id, provider.clone());
        provider
    }

    pub async fn insert_upgrade(&self, name: &str) -> Upgrade {
        let upgrade = Upgrade {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        self.inner
            .write()
            .await
            .upgrades
            .insert(upgrade.id, upgrade.clone());
        upgrade
    }

    pub async fn insert_booking(&self, draft: BookingDraft) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.write().await.bookings.insert(id, draft);
        id
    }

    pub async fn update_booking(&self, booking_id: Uuid, draft: BookingDraft) -> StoreResult<()> {
        let mut state = self.inner.write().await;
        match state.bookings.get_mut(&booking_id) {
            Some(existing) => {
                *existing = draft;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "booking",
                id: booking_id,
            }),
        }
    }

    /// Seed a price record directly, bypassing the supersede workflow.
    pub async fn insert_price(
        &self,
        target: PriceTarget,
        rate: Decimal,
        valid_from: DateTime<Utc>,
        valid_to: Option<DateTime<Utc>>,
    ) -> Price {
        let price = Price {
            id: Uuid::new_v4(),
            owner_id: target.owner_id(),
            rate,
            valid_from,
            valid_to,
        };
        self.inner
            .write()
            .await
            .prices_mut(target)
            .push(price.clone());
        price
    }

    /// Number of billing items across all billings (for testing).
    pub async fn billing_item_count(&self) -> usize {
        self.inner.read().await.billed.len()
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn find_bookings(&self, ids: &[Uuid]) -> StoreResult<Vec<Booking>> {
        let state = self.inner.read().await;
        let mut seen = HashSet::new();
        let mut bookings = Vec::new();
        for id in ids {
            if !seen.insert(*id) {
                continue;
            }
            if let Some(draft) = state.bookings.get(id) {
                bookings.push(state.join_booking(*id, draft)?);
            }
        }
        Ok(bookings)
    }

    async fn billed_booking_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Uuid>> {
        let state = self.inner.read().await;
        let mut seen = HashSet::new();
        Ok(ids
            .iter()
            .filter(|id| state.billed.contains_key(id) && seen.insert(**id))
            .copied()
            .collect())
    }
}

#[async_trait]
impl PriceStore for MemoryStore {
    async fn find_price_valid_at(
        &self,
        target: PriceTarget,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Price>> {
        let state = self.inner.read().await;
        Ok(state
            .prices(target)
            .iter()
            .filter(|p| p.owner_id == target.owner_id() && p.is_valid_at(at))
            .max_by_key(|p| p.valid_from)
            .cloned())
    }

    async fn find_open_price(&self, target: PriceTarget) -> StoreResult<Option<Price>> {
        let state = self.inner.read().await;
        Ok(state
            .prices(target)
            .iter()
            .find(|p| p.owner_id == target.owner_id() && p.is_open())
            .cloned())
    }

    async fn find_price(&self, target: PriceTarget, price_id: Uuid) -> StoreResult<Option<Price>> {
        let state = self.inner.read().await;
        Ok(state
            .prices(target)
            .iter()
            .find(|p| p.id == price_id && p.owner_id == target.owner_id())
            .cloned())
    }

    async fn supersede_price(
        &self,
        target: PriceTarget,
        expected_open: Option<Uuid>,
        valid_from: DateTime<Utc>,
        rate: Decimal,
    ) -> StoreResult<Price> {
        let mut state = self.inner.write().await;
        if !state.owner_exists(target) {
            return Err(StoreError::NotFound {
                entity: target.label(),
                id: target.owner_id(),
            });
        }
        let prices = state.prices_mut(target);

        let open = prices
            .iter_mut()
            .find(|p| p.owner_id == target.owner_id() && p.is_open());

        match (open, expected_open) {
            (Some(current), Some(expected)) if current.id == expected => {
                current.valid_to = Some(valid_from);
            }
            (None, None) => {}
            (current, _) => {
                return Err(StoreError::Conflict(format!(
                    "open price for {} changed (now {:?})",
                    target,
                    current.map(|p| p.id)
                )));
            }
        }

        let price = Price {
            id: Uuid::new_v4(),
            owner_id: target.owner_id(),
            rate,
            valid_from,
            valid_to: None,
        };
        prices.push(price.clone());
        Ok(price)
    }
}

#[async_trait]
impl PriceTierStore for MemoryStore {
    async fn list_tiers(&self, price_id: Uuid) -> StoreResult<Vec<PriceTier>> {
        let state = self.inner.read().await;
        let mut tiers: Vec<PriceTier> = state
            .tiers
            .values()
            .filter(|t| t.price_id == price_id)
            .cloned()
            .collect();
        tiers.sort_by_key(|t| (t.from_minutes, t.sort_order));
        Ok(tiers)
    }

    async fn find_tier(&self, tier_id: Uuid) -> StoreResult<Option<PriceTier>> {
        Ok(self.inner.read().await.tiers.get(&tier_id).cloned())
    }

    async fn save_tier(&self, tier: &PriceTier) -> StoreResult<PriceTier> {
        let mut state = self.inner.write().await;

        if !state.room_prices.iter().any(|p| p.id == tier.price_id) {
            return Err(StoreError::NotFound {
                entity: "room price",
                id: tier.price_id,
            });
        }

        // Same guarantee the Postgres exclusion constraint gives
        let siblings: Vec<PriceTier> = state
            .tiers
            .values()
            .filter(|t| t.price_id == tier.price_id)
            .cloned()
            .collect();
        if let Some(clash) = find_overlap(tier, &siblings) {
            return Err(StoreError::Conflict(format!(
                "tier {} overlaps tier {}",
                tier.id, clash.id
            )));
        }

        state.tiers.insert(tier.id, tier.clone());
        Ok(tier.clone())
    }

    async fn delete_tier(&self, tier_id: Uuid) -> StoreResult<()> {
        match self.inner.write().await.tiers.remove(&tier_id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                entity: "price tier",
                id: tier_id,
            }),
        }
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    async fn save_billings(&self, billings: &[Billing]) -> StoreResult<()> {
        let mut state = self.inner.write().await;

        let mut batch = HashSet::new();
        let mut conflicts = Vec::new();
        for booking_id in billings.iter().flat_map(|b| b.booking_ids()) {
            if state.billed.contains_key(&booking_id) || !batch.insert(booking_id) {
                conflicts.push(booking_id);
            }
        }
        if !conflicts.is_empty() {
            return Err(StoreError::AlreadyBilled(conflicts));
        }

        for billing in billings {
            for item in &billing.items {
                state.billed.insert(item.booking_id, item.id);
            }
            state.billings.push(billing.clone());
        }
        Ok(())
    }

    async fn find_billing(&self, billing_id: Uuid) -> StoreResult<Option<Billing>> {
        let state = self.inner.read().await;
        Ok(state.billings.iter().find(|b| b.id == billing_id).cloned())
    }

    async fn list_billings(&self) -> StoreResult<Vec<Billing>> {
        let state = self.inner.read().await;
        let mut billings: Vec<Billing> = state.billings.iter().rev().cloned().collect();
        billings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(billings)
    }

    async fn list_billings_for_provider(&self, provider_id: Uuid) -> StoreResult<Vec<Billing>> {
        let mut billings = self.list_billings().await?;
        billings.retain(|b| b.provider_id == provider_id);
        Ok(billings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn jan(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_supersede_closes_and_opens() {
        let store = MemoryStore::new();
        let room = store.insert_room("Studio A").await;
        let target = PriceTarget::Room(room.id);

        let first = store.supersede_price(target, None, jan(1), dec!(70)).await.unwrap();
        let second = store
            .supersede_price(target, Some(first.id), jan(10), dec!(80))
            .await
            .unwrap();

        let open = store.find_open_price(target).await.unwrap().unwrap();
        assert_eq!(open.id, second.id);

        let closed = store.find_price(target, first.id).await.unwrap().unwrap();
        assert_eq!(closed.valid_to, Some(jan(10)));

        let at_5 = store.find_price_valid_at(target, jan(5)).await.unwrap().unwrap();
        assert_eq!(at_5.rate, dec!(70));
        let at_10 = store.find_price_valid_at(target, jan(10)).await.unwrap().unwrap();
        assert_eq!(at_10.rate, dec!(80));
    }

    #[tokio::test]
    async fn test_supersede_rejects_stale_expectation() {
        let store = MemoryStore::new();
        let room = store.insert_room("Studio A").await;
        let target = PriceTarget::Room(room.id);

        let first = store.supersede_price(target, None, jan(1), dec!(70)).await.unwrap();
        store
            .supersede_price(target, Some(first.id), jan(10), dec!(80))
            .await
            .unwrap();

        // A second writer still believes `first` is open
        let result = store
            .supersede_price(target, Some(first.id), jan(12), dec!(90))
            .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));

        // Opening a "first" price when one is already open also conflicts
        let result = store.supersede_price(target, None, jan(12), dec!(90)).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_supersede_requires_known_owner() {
        let store = MemoryStore::new();
        let target = PriceTarget::Upgrade(Uuid::new_v4());

        let result = store.supersede_price(target, None, jan(1), dec!(20)).await;
        assert!(matches!(
            result,
            Err(StoreError::NotFound { entity: "upgrade", .. })
        ));
        assert!(store.find_open_price(target).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prices_scoped_by_target() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store
            .insert_price(PriceTarget::Upgrade(id), dec!(20), jan(1), None)
            .await;

        assert!(store
            .find_open_price(PriceTarget::Room(id))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_open_price(PriceTarget::Upgrade(id))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_find_bookings_skips_unknown_and_duplicates() {
        let store = MemoryStore::new();
        let room = store.insert_room("Studio A").await;
        let provider = store.insert_provider("Dr. Lee").await;
        let id = store
            .insert_booking(BookingDraft {
                provider_id: provider.id,
                room_id: room.id,
                start_time: jan(2),
                duration_minutes: 60,
                resting_minutes: None,
                client_alias: None,
                upgrades: vec![],
            })
            .await;

        let found = store
            .find_bookings(&[id, Uuid::new_v4(), id])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].room_name, "Studio A");
        assert_eq!(found[0].provider_name, "Dr. Lee");
    }
}
