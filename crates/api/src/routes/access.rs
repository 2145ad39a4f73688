//! Feature access check endpoint

use std::convert::Infallible;

use axum::{extract::rejection::JsonRejection, extract::State, Extension, Json};
use scalehub_billing::{
    AccessDecision, AccessGuard, DenialReason, GuardOptions, GuardRejection, IncrementTiming,
    UsageSnapshot,
};
use scalehub_shared::{Feature, PlanId};
use serde::{Deserialize, Serialize};

use crate::{
    auth::SessionUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct AccessCheckRequest {
    pub feature: String,
    /// Consume one unit of quota when allowed
    #[serde(default)]
    pub consume: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCheckResponse {
    pub feature: Feature,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_upgrade: Option<PlanId>,
    pub current_plan: PlanId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSnapshot>,
}

impl From<AccessDecision> for AccessCheckResponse {
    fn from(decision: AccessDecision) -> Self {
        Self {
            feature: decision.feature,
            allowed: decision.allowed,
            reason: decision.reason,
            message: decision.reason.map(|reason| reason.message(decision.feature)),
            requires_upgrade: decision.requires_upgrade,
            current_plan: decision.current_plan,
            usage: decision.usage,
        }
    }
}

/// Check (and optionally consume) access to a feature.
///
/// A denial is a normal answer here and comes back as 200 with `allowed: false`.
pub async fn check_access(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    payload: Result<Json<AccessCheckRequest>, JsonRejection>,
) -> ApiResult<Json<AccessCheckResponse>> {
    let Json(request) = payload?;
    let feature: Feature = request
        .feature
        .parse()
        .map_err(|e: scalehub_shared::ScaleHubError| ApiError::Validation(e.to_string()))?;

    let guard = AccessGuard::new(
        state.entitlements.clone(),
        GuardOptions {
            feature,
            auto_increment: request.consume,
            timing: IncrementTiming::BeforeHandler,
        },
    );

    let decision = match guard
        .run(Some(user.user_id), |decision| async move {
            Ok::<_, Infallible>(decision)
        })
        .await
    {
        Ok(Ok(decision)) => decision,
        Ok(Err(never)) => match never {},
        Err(GuardRejection::Denied(decision)) => decision,
        Err(rejection) => return Err(rejection.into()),
    };

    Ok(Json(decision.into()))
}
