//! Session and feature gate middleware

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use scalehub_billing::AccessGuard;

use super::identity::IdentityResolver;
use crate::error::ApiError;
use crate::state::AppState;

/// Require a signed-in user; attaches [`super::SessionUser`] to the request
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = state
        .identity
        .resolve(request.headers())
        .await?
        .ok_or(ApiError::Unauthorized)?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// State of one feature-gated route
#[derive(Clone)]
pub struct FeatureGate {
    guard: AccessGuard,
    identity: Arc<dyn IdentityResolver>,
}

impl FeatureGate {
    pub fn new(guard: AccessGuard, identity: Arc<dyn IdentityResolver>) -> Self {
        Self { guard, identity }
    }
}

/// Run the route only if the signed-in user may use the gated feature.
///
/// Responses outside 2xx count as failures and consume no quota: a unit
/// reserved before the handler is refunded. The
/// [`scalehub_billing::AccessDecision`] and the session user are attached to
/// the request for the handler.
pub async fn require_feature(
    State(gate): State<FeatureGate>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = gate.identity.resolve(request.headers()).await?;
    let user_id = user.as_ref().map(|user| user.user_id);

    let outcome = gate
        .guard
        .run(user_id, |decision| async move {
            request.extensions_mut().insert(decision);
            if let Some(user) = user {
                request.extensions_mut().insert(user);
            }

            let response = next.run(request).await;
            if response.status().is_success() {
                Ok(response)
            } else {
                Err(response)
            }
        })
        .await?;

    Ok(match outcome {
        Ok(response) | Err(response) => response,
    })
}
