//! API error types and handling

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scalehub_billing::{AccessDecision, BillingError, GuardRejection};
use serde_json::json;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authentication errors
    #[error("Please sign in")]
    Unauthorized,

    // Access errors
    #[error("Feature access denied")]
    FeatureDenied(Box<AccessDecision>),

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),

    // Resource errors
    #[error("Resource not found")]
    NotFound,
    #[error("No billing account found for team")]
    NoBillingCustomer,

    // Internal errors
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal server error")]
    Internal,
    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::FeatureDenied(decision) = &self {
            return feature_denied_response(decision);
        }

        let (status, code, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),

            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),

            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::NoBillingCustomer => (StatusCode::BAD_REQUEST, "NO_BILLING_CUSTOMER", self.to_string()),

            // Details are logged where the error is created, never returned
            ApiError::Database(_) | ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
            ApiError::ServiceUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", self.to_string()),

            ApiError::FeatureDenied(_) => (StatusCode::FORBIDDEN, "FEATURE_DENIED", self.to_string()),
        };

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

fn feature_denied_response(decision: &AccessDecision) -> Response {
    let message = decision
        .reason
        .map(|reason| reason.message(decision.feature))
        .unwrap_or_else(|| "Feature access denied".to_string());

    let body = Json(json!({
        "error": message,
        "code": "FEATURE_DENIED",
        "feature": decision.feature,
        "reason": decision.reason,
        "requiresUpgrade": decision.requires_upgrade,
        "currentPlan": decision.current_plan,
        "usage": decision.usage,
    }));

    (StatusCode::FORBIDDEN, body).into_response()
}

impl From<GuardRejection> for ApiError {
    fn from(rejection: GuardRejection) -> Self {
        match rejection {
            GuardRejection::Unauthenticated => ApiError::Unauthorized,
            GuardRejection::Denied(decision) => ApiError::FeatureDenied(Box::new(decision)),
            GuardRejection::Internal(err) => err.into(),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InvalidInput(msg) => ApiError::Validation(msg),
            BillingError::NoCustomer => ApiError::NoBillingCustomer,
            BillingError::WebhookSignatureInvalid => {
                ApiError::BadRequest("Invalid webhook signature".to_string())
            }
            BillingError::WebhookPayload(msg) => ApiError::BadRequest(msg),
            BillingError::Database(msg) => {
                tracing::error!(error = %msg, "Billing store error");
                ApiError::Database(msg)
            }
            other => {
                tracing::error!(error = %other, "Billing error");
                ApiError::Internal
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            _ => ApiError::Database(err.to_string()),
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
