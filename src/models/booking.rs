//! Booking and catalog records owned by the scheduling side of the system.
//!
//! The billing core only reads these. They stay editable after billing and are
//! never referenced live by an invoice.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rentable studio room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
}

/// Service provider renting rooms; the counterparty of an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    pub name: String,
}

/// Add-on item that can be attached to a booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upgrade {
    pub id: Uuid,
    pub name: String,
}

/// Upgrade line on a booking, joined with the upgrade's current name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingUpgrade {
    pub upgrade_id: Uuid,
    pub upgrade_name: String,
    pub quantity: i32,
}

/// Room reservation as loaded for billing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub provider_name: String,
    pub room_id: Uuid,
    pub room_name: String,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    /// Buffer kept free after the session; not charged
    pub resting_minutes: Option<i32>,
    pub client_alias: Option<String>,
    pub upgrades: Vec<BookingUpgrade>,
}

impl Booking {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(i64::from(self.duration_minutes))
    }
}
