//! Room and upgrade pricing.
//!
//! Validity-windowed rates per room and upgrade, optional duration tiers on
//! room rates, and the tier engine that turns a duration into an amount.

pub mod calculators;
pub mod models;
pub mod requests;
pub mod responses;
pub mod routes;
pub mod services;

// Re-export commonly used items
pub use calculators::{compute_price, round_money};
pub use routes::router;
pub use services::{PreviewResult, PricingError, QuoteResult};
