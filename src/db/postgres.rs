//! Postgres-backed store.
//!
//! Queries are built at runtime with `sqlx::query_as`; writes that must be
//! atomic run inside a single transaction.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use super::{BillingStore, BookingStore, PriceStore, PriceTierStore, StoreError, StoreResult};
use crate::billing::models::{Billing, BillingItem, BillingItemUpgrade};
use crate::models::{Booking, BookingUpgrade};
use crate::pricing::models::{Price, PriceTarget, PriceTier};

const EXCLUSION_VIOLATION: &str = "23P01";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open a connection pool.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        tracing::info!("Connecting to PostgreSQL (max_connections={})", max_connections);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Apply embedded migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

/// Table and owner column holding prices for a target
fn price_table(target: PriceTarget) -> (&'static str, &'static str) {
    match target {
        PriceTarget::Room(_) => ("room_prices", "room_id"),
        PriceTarget::Upgrade(_) => ("upgrade_prices", "upgrade_id"),
    }
}

#[derive(FromRow)]
struct BookingRow {
    id: Uuid,
    provider_id: Uuid,
    provider_name: String,
    room_id: Uuid,
    room_name: String,
    start_time: DateTime<Utc>,
    duration_minutes: i32,
    resting_minutes: Option<i32>,
    client_alias: Option<String>,
}

#[derive(FromRow)]
struct BookingUpgradeRow {
    booking_id: Uuid,
    upgrade_id: Uuid,
    upgrade_name: String,
    quantity: i32,
}

#[derive(FromRow)]
struct TierRow {
    id: Uuid,
    price_id: Uuid,
    from_minutes: i32,
    to_minutes: Option<i32>,
    kind: String,
    rate: Decimal,
    sort_order: i32,
}

impl TryFrom<TierRow> for PriceTier {
    type Error = StoreError;

    fn try_from(row: TierRow) -> Result<Self, Self::Error> {
        let kind = row
            .kind
            .parse()
            .map_err(|e: String| StoreError::Database(sqlx::Error::Decode(e.into())))?;
        Ok(PriceTier {
            id: row.id,
            price_id: row.price_id,
            from_minutes: row.from_minutes,
            to_minutes: row.to_minutes,
            kind,
            rate: row.rate,
            sort_order: row.sort_order,
        })
    }
}

#[derive(FromRow)]
struct BillingRow {
    id: Uuid,
    provider_id: Uuid,
    provider_name: String,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    total_amount: Decimal,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct BillingItemRow {
    id: Uuid,
    billing_id: Uuid,
    booking_id: Uuid,
    room_price_id: Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    duration_minutes: i32,
    resting_minutes: Option<i32>,
    client_alias: Option<String>,
    room_name: String,
    room_rate: Decimal,
    subtotal_room: Decimal,
    subtotal_upgrades: Decimal,
    total_amount: Decimal,
}

#[derive(FromRow)]
struct BillingItemUpgradeRow {
    id: Uuid,
    billing_item_id: Uuid,
    upgrade_id: Uuid,
    upgrade_price_id: Uuid,
    upgrade_name: String,
    quantity: i32,
    unit_rate: Decimal,
    total_amount: Decimal,
}

impl PgStore {
    /// Load items and upgrade lines for the given billing rows.
    async fn hydrate_billings(&self, rows: Vec<BillingRow>) -> StoreResult<Vec<Billing>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let billing_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        let item_rows = sqlx::query_as::<_, BillingItemRow>(
            r#"
            SELECT
                id, billing_id, booking_id, room_price_id,
                start_time, end_time, duration_minutes, resting_minutes,
                client_alias, room_name, room_rate,
                subtotal_room, subtotal_upgrades, total_amount
            FROM billing_items
            WHERE billing_id = ANY($1)
            ORDER BY billing_id, position
            "#,
        )
        .bind(&billing_ids)
        .fetch_all(&self.pool)
        .await?;

        let item_ids: Vec<Uuid> = item_rows.iter().map(|r| r.id).collect();
        let upgrade_rows = sqlx::query_as::<_, BillingItemUpgradeRow>(
            r#"
            SELECT
                id, billing_item_id, upgrade_id, upgrade_price_id,
                upgrade_name, quantity, unit_rate, total_amount
            FROM billing_item_upgrades
            WHERE billing_item_id = ANY($1)
            ORDER BY billing_item_id, position
            "#,
        )
        .bind(&item_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut upgrades_by_item: HashMap<Uuid, Vec<BillingItemUpgrade>> = HashMap::new();
        for row in upgrade_rows {
            upgrades_by_item
                .entry(row.billing_item_id)
                .or_default()
                .push(BillingItemUpgrade {
                    id: row.id,
                    billing_item_id: row.billing_item_id,
                    upgrade_id: row.upgrade_id,
                    upgrade_price_id: row.upgrade_price_id,
                    upgrade_name: row.upgrade_name,
                    quantity: row.quantity,
                    unit_rate: row.unit_rate,
                    total_amount: row.total_amount,
                });
        }

        let mut items_by_billing: HashMap<Uuid, Vec<BillingItem>> = HashMap::new();
        for row in item_rows {
            let upgrades = upgrades_by_item.remove(&row.id).unwrap_or_default();
            items_by_billing
                .entry(row.billing_id)
                .or_default()
                .push(BillingItem {
                    id: row.id,
                    billing_id: row.billing_id,
                    booking_id: row.booking_id,
                    room_price_id: row.room_price_id,
                    start_time: row.start_time,
                    end_time: row.end_time,
                    duration_minutes: row.duration_minutes,
                    resting_minutes: row.resting_minutes,
                    client_alias: row.client_alias,
                    room_name: row.room_name,
                    room_rate: row.room_rate,
                    subtotal_room: row.subtotal_room,
                    subtotal_upgrades: row.subtotal_upgrades,
                    total_amount: row.total_amount,
                    upgrades,
                });
        }

        Ok(rows
            .into_iter()
            .map(|row| Billing {
                items: items_by_billing.remove(&row.id).unwrap_or_default(),
                id: row.id,
                provider_id: row.provider_id,
                provider_name: row.provider_name,
                period_start: row.period_start,
                period_end: row.period_end,
                total_amount: row.total_amount,
                created_at: row.created_at,
            })
            .collect())
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn find_bookings(&self, ids: &[Uuid]) -> StoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT
                b.id, b.provider_id, p.name AS provider_name,
                b.room_id, r.name AS room_name,
                b.start_time, b.duration_minutes, b.resting_minutes, b.client_alias
            FROM bookings b
            JOIN providers p ON p.id = b.provider_id
            JOIN rooms r ON r.id = b.room_id
            WHERE b.id = ANY($1)
            ORDER BY b.start_time, b.id
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let upgrade_rows = sqlx::query_as::<_, BookingUpgradeRow>(
            r#"
            SELECT bu.booking_id, bu.upgrade_id, u.name AS upgrade_name, bu.quantity
            FROM booking_upgrades bu
            JOIN upgrades u ON u.id = bu.upgrade_id
            WHERE bu.booking_id = ANY($1)
            ORDER BY bu.booking_id, u.name
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut upgrades: HashMap<Uuid, Vec<BookingUpgrade>> = HashMap::new();
        for row in upgrade_rows {
            upgrades.entry(row.booking_id).or_default().push(BookingUpgrade {
                upgrade_id: row.upgrade_id,
                upgrade_name: row.upgrade_name,
                quantity: row.quantity,
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| Booking {
                upgrades: upgrades.remove(&row.id).unwrap_or_default(),
                id: row.id,
                provider_id: row.provider_id,
                provider_name: row.provider_name,
                room_id: row.room_id,
                room_name: row.room_name,
                start_time: row.start_time,
                duration_minutes: row.duration_minutes,
                resting_minutes: row.resting_minutes,
                client_alias: row.client_alias,
            })
            .collect())
    }

    async fn billed_booking_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Uuid>> {
        let billed = sqlx::query_scalar::<_, Uuid>(
            "SELECT booking_id FROM billing_items WHERE booking_id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(billed)
    }
}

#[async_trait]
impl PriceStore for PgStore {
    async fn find_price_valid_at(
        &self,
        target: PriceTarget,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Price>> {
        let (table, owner) = price_table(target);
        let price = sqlx::query_as::<_, Price>(&format!(
            r#"
            SELECT id, {owner} AS owner_id, rate, valid_from, valid_to
            FROM {table}
            WHERE {owner} = $1
              AND valid_from <= $2
              AND (valid_to IS NULL OR valid_to > $2)
            ORDER BY valid_from DESC
            LIMIT 1
            "#
        ))
        .bind(target.owner_id())
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(price)
    }

    async fn find_open_price(&self, target: PriceTarget) -> StoreResult<Option<Price>> {
        let (table, owner) = price_table(target);
        let price = sqlx::query_as::<_, Price>(&format!(
            r#"
            SELECT id, {owner} AS owner_id, rate, valid_from, valid_to
            FROM {table}
            WHERE {owner} = $1 AND valid_to IS NULL
            "#
        ))
        .bind(target.owner_id())
        .fetch_optional(&self.pool)
        .await?;

        Ok(price)
    }

    async fn find_price(&self, target: PriceTarget, price_id: Uuid) -> StoreResult<Option<Price>> {
        let (table, owner) = price_table(target);
        let price = sqlx::query_as::<_, Price>(&format!(
            r#"
            SELECT id, {owner} AS owner_id, rate, valid_from, valid_to
            FROM {table}
            WHERE id = $1 AND {owner} = $2
            "#
        ))
        .bind(price_id)
        .bind(target.owner_id())
        .fetch_optional(&self.pool)
        .await?;

        Ok(price)
    }

    async fn supersede_price(
        &self,
        target: PriceTarget,
        expected_open: Option<Uuid>,
        valid_from: DateTime<Utc>,
        rate: Decimal,
    ) -> StoreResult<Price> {
        let (table, owner) = price_table(target);
        let mut tx = self.pool.begin().await?;

        match expected_open {
            Some(open_id) => {
                let closed = sqlx::query(&format!(
                    r#"
                    UPDATE {table}
                    SET valid_to = $3
                    WHERE id = $1 AND {owner} = $2 AND valid_to IS NULL
                    "#
                ))
                .bind(open_id)
                .bind(target.owner_id())
                .bind(valid_from)
                .execute(&mut *tx)
                .await?;

                if closed.rows_affected() != 1 {
                    return Err(StoreError::Conflict(format!(
                        "price {} for {} is no longer open",
                        open_id, target
                    )));
                }
            }
            None => {
                let has_open: bool = sqlx::query_scalar(&format!(
                    "SELECT EXISTS (SELECT 1 FROM {table} WHERE {owner} = $1 AND valid_to IS NULL)"
                ))
                .bind(target.owner_id())
                .fetch_one(&mut *tx)
                .await?;

                if has_open {
                    return Err(StoreError::Conflict(format!(
                        "{} already has an open price",
                        target
                    )));
                }
            }
        }

        let inserted = sqlx::query_as::<_, Price>(&format!(
            r#"
            INSERT INTO {table} (id, {owner}, rate, valid_from, valid_to)
            VALUES ($1, $2, $3, $4, NULL)
            RETURNING id, {owner} AS owner_id, rate, valid_from, valid_to
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(target.owner_id())
        .bind(rate)
        .bind(valid_from)
        .fetch_one(&mut *tx)
        .await;

        let price = match inserted {
            Ok(price) => price,
            // Partial unique index: another writer opened a price first
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                return Err(StoreError::Conflict(format!(
                    "{} already has an open price",
                    target
                )));
            }
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_foreign_key_violation() => {
                return Err(StoreError::NotFound {
                    entity: target.label(),
                    id: target.owner_id(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;
        Ok(price)
    }
}

#[async_trait]
impl PriceTierStore for PgStore {
    async fn list_tiers(&self, price_id: Uuid) -> StoreResult<Vec<PriceTier>> {
        let rows = sqlx::query_as::<_, TierRow>(
            r#"
            SELECT id, price_id, from_minutes, to_minutes, kind, rate, sort_order
            FROM price_tiers
            WHERE price_id = $1
            ORDER BY from_minutes, sort_order
            "#,
        )
        .bind(price_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PriceTier::try_from).collect()
    }

    async fn find_tier(&self, tier_id: Uuid) -> StoreResult<Option<PriceTier>> {
        let row = sqlx::query_as::<_, TierRow>(
            r#"
            SELECT id, price_id, from_minutes, to_minutes, kind, rate, sort_order
            FROM price_tiers
            WHERE id = $1
            "#,
        )
        .bind(tier_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PriceTier::try_from).transpose()
    }

    async fn save_tier(&self, tier: &PriceTier) -> StoreResult<PriceTier> {
        let saved = sqlx::query_as::<_, TierRow>(
            r#"
            INSERT INTO price_tiers (id, price_id, from_minutes, to_minutes, kind, rate, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                from_minutes = EXCLUDED.from_minutes,
                to_minutes = EXCLUDED.to_minutes,
                kind = EXCLUDED.kind,
                rate = EXCLUDED.rate,
                sort_order = EXCLUDED.sort_order
            RETURNING id, price_id, from_minutes, to_minutes, kind, rate, sort_order
            "#,
        )
        .bind(tier.id)
        .bind(tier.price_id)
        .bind(tier.from_minutes)
        .bind(tier.to_minutes)
        .bind(tier.kind.as_str())
        .bind(tier.rate)
        .bind(tier.sort_order)
        .fetch_one(&self.pool)
        .await;

        match saved {
            Ok(row) => PriceTier::try_from(row),
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_foreign_key_violation() => {
                Err(StoreError::NotFound {
                    entity: "room price",
                    id: tier.price_id,
                })
            }
            Err(sqlx::Error::Database(ref db_err))
                if db_err.code().as_deref() == Some(EXCLUSION_VIOLATION) =>
            {
                Err(StoreError::Conflict(format!(
                    "tier {} overlaps another tier of price {}",
                    tier.id, tier.price_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_tier(&self, tier_id: Uuid) -> StoreResult<()> {
        let deleted = sqlx::query("DELETE FROM price_tiers WHERE id = $1")
            .bind(tier_id)
            .execute(&self.pool)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "price tier",
                id: tier_id,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BillingStore for PgStore {
    async fn save_billings(&self, billings: &[Billing]) -> StoreResult<()> {
        let booking_ids: Vec<Uuid> = billings.iter().flat_map(|b| b.booking_ids()).collect();
        let mut tx = self.pool.begin().await?;

        let already = sqlx::query_scalar::<_, Uuid>(
            "SELECT booking_id FROM billing_items WHERE booking_id = ANY($1) FOR UPDATE",
        )
        .bind(&booking_ids)
        .fetch_all(&mut *tx)
        .await?;
        if !already.is_empty() {
            return Err(StoreError::AlreadyBilled(already));
        }

        for billing in billings {
            sqlx::query(
                r#"
                INSERT INTO billings
                    (id, provider_id, provider_name, period_start, period_end, total_amount, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(billing.id)
            .bind(billing.provider_id)
            .bind(&billing.provider_name)
            .bind(billing.period_start)
            .bind(billing.period_end)
            .bind(billing.total_amount)
            .bind(billing.created_at)
            .execute(&mut *tx)
            .await?;

            for (position, item) in billing.items.iter().enumerate() {
                let inserted = sqlx::query(
                    r#"
                    INSERT INTO billing_items (
                        id, billing_id, position, booking_id, room_price_id,
                        start_time, end_time, duration_minutes, resting_minutes,
                        client_alias, room_name, room_rate,
                        subtotal_room, subtotal_upgrades, total_amount
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                    "#,
                )
                .bind(item.id)
                .bind(billing.id)
                .bind(position as i32)
                .bind(item.booking_id)
                .bind(item.room_price_id)
                .bind(item.start_time)
                .bind(item.end_time)
                .bind(item.duration_minutes)
                .bind(item.resting_minutes)
                .bind(&item.client_alias)
                .bind(&item.room_name)
                .bind(item.room_rate)
                .bind(item.subtotal_room)
                .bind(item.subtotal_upgrades)
                .bind(item.total_amount)
                .execute(&mut *tx)
                .await;

                match inserted {
                    Ok(_) => {}
                    // Lost a race with a concurrent batch. Report every booking of
                    // this batch the winner billed, not just the one that clashed.
                    Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                        tx.rollback().await?;
                        let mut billed = self.billed_booking_ids(&booking_ids).await?;
                        if billed.is_empty() {
                            billed.push(item.booking_id);
                        }
                        return Err(StoreError::AlreadyBilled(billed));
                    }
                    Err(e) => return Err(e.into()),
                }

                for (line, upgrade) in item.upgrades.iter().enumerate() {
                    sqlx::query(
                        r#"
                        INSERT INTO billing_item_upgrades (
                            id, billing_item_id, position, upgrade_id, upgrade_price_id,
                            upgrade_name, quantity, unit_rate, total_amount
                        )
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                        "#,
                    )
                    .bind(upgrade.id)
                    .bind(item.id)
                    .bind(line as i32)
                    .bind(upgrade.upgrade_id)
                    .bind(upgrade.upgrade_price_id)
                    .bind(&upgrade.upgrade_name)
                    .bind(upgrade.quantity)
                    .bind(upgrade.unit_rate)
                    .bind(upgrade.total_amount)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_billing(&self, billing_id: Uuid) -> StoreResult<Option<Billing>> {
        let rows = sqlx::query_as::<_, BillingRow>(
            r#"
            SELECT id, provider_id, provider_name, period_start, period_end, total_amount, created_at
            FROM billings
            WHERE id = $1
            "#,
        )
        .bind(billing_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(self.hydrate_billings(rows).await?.into_iter().next())
    }

    async fn list_billings(&self) -> StoreResult<Vec<Billing>> {
        let rows = sqlx::query_as::<_, BillingRow>(
            r#"
            SELECT id, provider_id, provider_name, period_start, period_end, total_amount, created_at
            FROM billings
            ORDER BY created_at DESC, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        self.hydrate_billings(rows).await
    }

    async fn list_billings_for_provider(&self, provider_id: Uuid) -> StoreResult<Vec<Billing>> {
        let rows = sqlx::query_as::<_, BillingRow>(
            r#"
            SELECT id, provider_id, provider_name, period_start, period_end, total_amount, created_at
            FROM billings
            WHERE provider_id = $1
            ORDER BY created_at DESC, id
            "#,
        )
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate_billings(rows).await
    }
}
