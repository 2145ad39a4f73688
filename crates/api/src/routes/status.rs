//! Subscription status endpoint

use axum::{extract::State, Extension, Json};
use scalehub_billing::{EntitlementStatus, UsageSnapshot};
use scalehub_shared::{Feature, PlanId, SubscriptionStatus};
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{
    auth::SessionUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusResponse {
    pub plan: PlanId,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<String>,
    pub usage_period: UsagePeriodInfo,
    pub usage: UsageReport,
    pub features: FeatureFlags,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsagePeriodInfo {
    pub key: String,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub searches: UsageSnapshot,
    pub scale_views: UsageSnapshot,
    pub ai_interpretations: UsageSnapshot,
    pub api_calls: UsageSnapshot,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    pub search: bool,
    pub scale_view: bool,
    pub ai_interpretation: bool,
    pub api_call: bool,
    pub case_study: bool,
    pub data_export: bool,
}

fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_default()
}

impl TryFrom<EntitlementStatus> for SubscriptionStatusResponse {
    type Error = ApiError;

    fn try_from(status: EntitlementStatus) -> Result<Self, Self::Error> {
        let usage = |feature: Feature| {
            status.usage_for(feature).ok_or_else(|| {
                tracing::error!(feature = %feature, "Status is missing a metered feature");
                ApiError::Internal
            })
        };
        let flag = |feature: Feature| {
            status
                .features
                .get(feature.as_str())
                .copied()
                .unwrap_or(false)
        };

        Ok(Self {
            plan: status.plan,
            status: status.status,
            current_period_end: status.current_period_end.map(rfc3339),
            usage_period: UsagePeriodInfo {
                key: status.usage_period.key.clone(),
                start: rfc3339(status.usage_period.start),
                end: rfc3339(status.usage_period.end),
            },
            usage: UsageReport {
                searches: usage(Feature::Search)?,
                scale_views: usage(Feature::ScaleView)?,
                ai_interpretations: usage(Feature::AiInterpretation)?,
                api_calls: usage(Feature::ApiCall)?,
            },
            features: FeatureFlags {
                search: flag(Feature::Search),
                scale_view: flag(Feature::ScaleView),
                ai_interpretation: flag(Feature::AiInterpretation),
                api_call: flag(Feature::ApiCall),
                case_study: flag(Feature::CaseStudy),
                data_export: flag(Feature::DataExport),
            },
        })
    }
}

/// Plan, status, usage and feature flags of the signed-in user
pub async fn subscription_status(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> ApiResult<Json<SubscriptionStatusResponse>> {
    let status = state.entitlements.subscription_status(user.user_id).await?;
    Ok(Json(status.try_into()?))
}
