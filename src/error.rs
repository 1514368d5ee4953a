//! Error handling for the application

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::billing::BillingError;
use crate::db::StoreError;
use crate::pricing::PricingError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Validation { message: String, errors: Vec<String> },

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Conflict { message: String, ids: Vec<Uuid> },

    /// Stored data cannot support the request (e.g. no price in effect)
    #[error("{0}")]
    Integrity(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Integrity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict { .. } => "conflict",
            AppError::Integrity(_) => "integrity_error",
            AppError::Database(_) => "database_error",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => AppError::NotFound(err.to_string()),
            StoreError::AlreadyBilled(ids) => AppError::Conflict {
                message: "One or more bookings are already billed".to_string(),
                ids,
            },
            StoreError::Conflict(message) => AppError::Conflict {
                message,
                ids: Vec::new(),
            },
            StoreError::Database(e) => AppError::Database(e),
        }
    }
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::PriceNotFound { .. } | PricingError::TierNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            PricingError::InvalidTier { errors } => AppError::Validation {
                message: "Invalid tier".to_string(),
                errors,
            },
            PricingError::InvalidRate(_)
            | PricingError::InvalidDuration(_)
            | PricingError::InvalidOrdering { .. } => AppError::validation(err.to_string()),
            PricingError::OverlappingTier {
                conflicting_tier_id,
                ..
            } => AppError::Conflict {
                message: err.to_string(),
                ids: vec![conflicting_tier_id],
            },
            PricingError::Store(e) => e.into(),
        }
    }
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::EmptyBatch
            | BillingError::InvalidPeriod { .. }
            | BillingError::InvalidDuration { .. }
            | BillingError::InvalidQuantity { .. } => AppError::validation(err.to_string()),
            BillingError::NoBookingsFound | BillingError::BillingNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            BillingError::AlreadyBilled(ids) => AppError::Conflict {
                message: "One or more bookings are already billed".to_string(),
                ids,
            },
            BillingError::RoomPriceMissing { .. } | BillingError::UpgradePriceMissing { .. } => {
                AppError::Integrity(err.to_string())
            }
            BillingError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (message, details) = match &self {
            AppError::Validation { message, errors } if !errors.is_empty() => {
                (message.clone(), Some(json!({ "errors": errors })))
            }
            AppError::Conflict { message, ids } if !ids.is_empty() => {
                (message.clone(), Some(json!({ "ids": ids })))
            }
            AppError::Integrity(msg) => {
                tracing::error!("Integrity error: {}", msg);
                (msg.clone(), None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                ("Database error".to_string(), None)
            }
            other => (other.to_string(), None),
        };

        let body = ErrorResponse {
            error_type: self.error_type().to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_already_billed_is_conflict_with_ids() {
        let id = Uuid::new_v4();
        let err: AppError = BillingError::AlreadyBilled(vec![id]).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        match err {
            AppError::Conflict { ids, .. } => assert_eq!(ids, vec![id]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_price_during_billing_is_integrity() {
        let err: AppError = BillingError::RoomPriceMissing {
            booking_id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            at: Utc::now(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_pricing_errors_map_to_status() {
        let tier: AppError = PricingError::InvalidTier {
            errors: vec!["rate must be positive".to_string()],
        }
        .into();
        assert_eq!(tier.status(), StatusCode::BAD_REQUEST);

        let missing: AppError = PricingError::TierNotFound(Uuid::new_v4()).into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let store: AppError = PricingError::Store(StoreError::Conflict("stale".into())).into();
        assert_eq!(store.status(), StatusCode::CONFLICT);

        let unknown_room: AppError = PricingError::Store(StoreError::NotFound {
            entity: "room",
            id: Uuid::new_v4(),
        })
        .into();
        assert_eq!(unknown_room.status(), StatusCode::NOT_FOUND);

        let sub_cent: AppError = PricingError::InvalidRate(rust_decimal_macros::dec!(70.005)).into();
        assert_eq!(sub_cent.status(), StatusCode::BAD_REQUEST);
    }
}
