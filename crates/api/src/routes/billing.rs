//! Billing routes for Stripe integration

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use scalehub_billing::PortalResponse;

use crate::{
    auth::SessionUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Create a Stripe billing portal session for the user's team
pub async fn create_portal_session(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> ApiResult<Json<PortalResponse>> {
    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;

    let subscription = state
        .entitlements
        .resolver()
        .resolve_subscription(user.user_id)
        .await?;
    let session = billing.portal.create_for_subscription(&subscription).await?;

    Ok(Json(session.into()))
}

/// Handle Stripe webhook events
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<StatusCode> {
    tracing::info!(body_len = body.len(), "Stripe webhook received");

    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Stripe webhook missing signature header");
            ApiError::BadRequest("Missing Stripe signature".to_string())
        })?;

    let event = billing
        .webhooks
        .verify_event(&body, signature)
        .map_err(|e| {
            tracing::warn!(error = ?e, "Stripe webhook signature verification failed");
            ApiError::BadRequest("Invalid webhook signature".to_string())
        })?;

    tracing::info!(
        event_type = %event.type_,
        event_id = %event.id,
        "Stripe webhook event verified"
    );

    let outcome = billing.webhooks.handle_event(event).await?;
    tracing::debug!(outcome = ?outcome, "Stripe webhook processed");

    Ok(StatusCode::OK)
}
