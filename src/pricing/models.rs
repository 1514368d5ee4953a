//! Price and tier models.
//!
//! Room prices and upgrade prices share one shape; a `PriceTarget` says which
//! owner a record belongs to.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The entity a price record is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceTarget {
    Room(Uuid),
    Upgrade(Uuid),
}

impl PriceTarget {
    pub fn owner_id(&self) -> Uuid {
        match self {
            PriceTarget::Room(id) | PriceTarget::Upgrade(id) => *id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PriceTarget::Room(_) => "room",
            PriceTarget::Upgrade(_) => "upgrade",
        }
    }
}

impl fmt::Display for PriceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.label(), self.owner_id())
    }
}

/// Rate record valid over `[valid_from, valid_to)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Price {
    pub id: Uuid,
    pub owner_id: Uuid,
    #[serde(with = "rust_decimal::serde::str")]
    pub rate: Decimal,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl Price {
    /// Check if the price is in effect at the given time
    pub fn is_valid_at(&self, check_time: DateTime<Utc>) -> bool {
        if self.valid_from > check_time {
            return false;
        }
        match self.valid_to {
            Some(end) => check_time < end,
            None => true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.valid_to.is_none()
    }
}

/// How a tier charges for the minutes that fall inside it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    /// Flat amount charged once any minute falls in the tier
    Fixed,
    /// Rate per hour, pro-rated by minute
    Hourly,
}

impl TierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Fixed => "fixed",
            TierKind::Hourly => "hourly",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(TierKind::Fixed),
            "hourly" => Ok(TierKind::Hourly),
            other => Err(format!("unknown tier kind '{}'", other)),
        }
    }
}

/// Duration band of a room price, `[from_minutes, to_minutes)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTier {
    pub id: Uuid,
    pub price_id: Uuid,
    pub from_minutes: i32,
    /// `None` means the tier is unbounded above
    pub to_minutes: Option<i32>,
    pub kind: TierKind,
    #[serde(with = "rust_decimal::serde::str")]
    pub rate: Decimal,
    pub sort_order: i32,
}

impl PriceTier {
    /// Half-open overlap test; a missing upper bound is +infinity.
    pub fn overlaps(&self, other: &PriceTier) -> bool {
        let starts_before_other_ends = match other.to_minutes {
            Some(end) => self.from_minutes < end,
            None => true,
        };
        let ends_after_other_starts = match self.to_minutes {
            Some(end) => end > other.from_minutes,
            None => true,
        };
        starts_before_other_ends && ends_after_other_starts
    }
}

/// Fields an administrator supplies when creating or replacing a tier
#[derive(Debug, Clone)]
pub struct TierInput {
    pub from_minutes: i32,
    pub to_minutes: Option<i32>,
    pub kind: TierKind,
    pub rate: Decimal,
    pub sort_order: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn tier(from: i32, to: Option<i32>) -> PriceTier {
        PriceTier {
            id: Uuid::new_v4(),
            price_id: Uuid::nil(),
            from_minutes: from,
            to_minutes: to,
            kind: TierKind::Hourly,
            rate: dec!(10.00),
            sort_order: 0,
        }
    }

    #[test]
    fn test_price_valid_at_bounds() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let price = Price {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            rate: dec!(70.00),
            valid_from: from,
            valid_to: Some(to),
        };

        assert!(price.is_valid_at(from));
        assert!(price.is_valid_at(to - chrono::Duration::seconds(1)));
        assert!(!price.is_valid_at(to)); // exclusive upper bound
        assert!(!price.is_valid_at(from - chrono::Duration::seconds(1)));
        assert!(!price.is_open());
    }

    #[test]
    fn test_open_price_valid_forever() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let price = Price {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            rate: dec!(70.00),
            valid_from: from,
            valid_to: None,
        };
        assert!(price.is_open());
        assert!(price.is_valid_at(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_tier_overlap_half_open() {
        // Adjacent tiers share a boundary but do not overlap
        assert!(!tier(0, Some(30)).overlaps(&tier(30, None)));
        assert!(!tier(30, None).overlaps(&tier(0, Some(30))));

        assert!(tier(0, Some(31)).overlaps(&tier(30, None)));
        assert!(tier(60, None).overlaps(&tier(120, Some(180))));
        assert!(tier(10, Some(20)).overlaps(&tier(0, Some(60))));
    }

    #[test]
    fn test_tier_kind_parse() {
        assert_eq!("fixed".parse::<TierKind>(), Ok(TierKind::Fixed));
        assert_eq!("hourly".parse::<TierKind>(), Ok(TierKind::Hourly));
        assert!("weekly".parse::<TierKind>().is_err());
        assert_eq!(TierKind::Hourly.to_string(), "hourly");
    }
}
