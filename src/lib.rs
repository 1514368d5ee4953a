//! Tiered room pricing and invoice generation for studio rentals.

pub mod billing;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pricing;
pub mod routes;

use std::sync::Arc;

use cache::AppCache;
use db::Store;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub cache: AppCache,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, cache: AppCache) -> Self {
        Self { store, cache }
    }
}
