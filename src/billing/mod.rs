//! Provider invoicing with frozen line items.

pub mod models;
pub mod requests;
pub mod responses;
pub mod routes;
pub mod services;

pub use models::{Billing, BillingItem, BillingItemUpgrade};
pub use routes::router;
pub use services::{generate_billings, BillingError};
