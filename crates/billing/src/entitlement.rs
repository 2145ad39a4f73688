//! Entitlement Module
//!
//! Answers "may this user use this feature right now?" by combining the
//! resolved subscription, the plan catalog and the usage counters.
//!
//! ## Rules
//!
//! 1. An inactive subscription is evaluated as the free plan, whatever plan the
//!    team row still stores.
//! 2. A metered feature can be on the plan and still be denied once the period
//!    quota is used up.
//! 3. Every denial carries a machine-readable reason and, when one exists, the
//!    lowest plan that would allow the call.

use std::collections::BTreeMap;

use scalehub_shared::{Feature, PlanId, SubscriptionStatus, UserId};
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::BillingResult;
use crate::plans;
use crate::subscription::{Subscription, SubscriptionResolver};
use crate::usage::{QuotaCheck, UsageMeter, UsagePeriod, UsageSnapshot};

/// Why access was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The effective plan does not include the feature
    FeatureNotAvailable,
    /// The feature is on the stored plan, but that plan has expired
    SubscriptionExpired,
    /// The period quota for the feature is used up
    UsageLimitReached,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::FeatureNotAvailable => "feature_not_available",
            DenialReason::SubscriptionExpired => "subscription_expired",
            DenialReason::UsageLimitReached => "usage_limit_reached",
        }
    }

    /// Human-readable explanation for API clients
    pub fn message(&self, feature: Feature) -> String {
        match self {
            DenialReason::FeatureNotAvailable => {
                format!("Your plan does not include {}", feature)
            }
            DenialReason::SubscriptionExpired => {
                format!("Your subscription has expired; renew it to use {}", feature)
            }
            DenialReason::UsageLimitReached => {
                format!("You have used all {} requests for this billing period", feature)
            }
        }
    }
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a feature access check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    pub feature: Feature,
    pub allowed: bool,
    pub reason: Option<DenialReason>,
    /// Lowest plan that would unlock the call
    pub requires_upgrade: Option<PlanId>,
    /// Effective plan the decision was made against
    pub current_plan: PlanId,
    /// Counter state, when the counter was read
    pub usage: Option<UsageSnapshot>,
}

impl AccessDecision {
    fn allow(feature: Feature, plan: PlanId, usage: Option<UsageSnapshot>) -> Self {
        Self {
            feature,
            allowed: true,
            reason: None,
            requires_upgrade: None,
            current_plan: plan,
            usage,
        }
    }

    fn deny(
        feature: Feature,
        plan: PlanId,
        reason: DenialReason,
        requires_upgrade: Option<PlanId>,
        usage: Option<UsageSnapshot>,
    ) -> Self {
        Self {
            feature,
            allowed: false,
            reason: Some(reason),
            requires_upgrade,
            current_plan: plan,
            usage,
        }
    }
}

/// Status report of a user's subscription and usage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementStatus {
    pub plan: PlanId,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<OffsetDateTime>,
    pub usage_period: UsagePeriod,
    pub usage: BTreeMap<&'static str, UsageSnapshot>,
    pub features: BTreeMap<&'static str, bool>,
}

impl EntitlementStatus {
    pub fn usage_for(&self, feature: Feature) -> Option<UsageSnapshot> {
        self.usage.get(feature.as_str()).copied()
    }
}

/// Feature access evaluator
#[derive(Clone)]
pub struct EntitlementService {
    resolver: SubscriptionResolver,
    meter: UsageMeter,
}

impl EntitlementService {
    pub fn new(resolver: SubscriptionResolver, meter: UsageMeter) -> Self {
        Self { resolver, meter }
    }

    pub fn resolver(&self) -> &SubscriptionResolver {
        &self.resolver
    }

    pub fn meter(&self) -> &UsageMeter {
        &self.meter
    }

    pub async fn check_feature_access(
        &self,
        user_id: UserId,
        feature: Feature,
    ) -> BillingResult<AccessDecision> {
        let now = OffsetDateTime::now_utc();
        let subscription = self.resolver.resolve_subscription_at(user_id, now).await?;
        let period = UsagePeriod::containing(now)?;
        self.evaluate(user_id, feature, &subscription, &period).await
    }

    /// Evaluate access for an already resolved subscription
    pub async fn evaluate(
        &self,
        user_id: UserId,
        feature: Feature,
        subscription: &Subscription,
        period: &UsagePeriod,
    ) -> BillingResult<AccessDecision> {
        let plan = subscription.effective_plan();

        if !plans::is_feature_available(plan, feature) {
            let lapsed = subscription.is_expired()
                && subscription
                    .plan_id
                    .is_some_and(|stored| plans::is_feature_available(stored, feature));
            let reason = if lapsed {
                DenialReason::SubscriptionExpired
            } else {
                DenialReason::FeatureNotAvailable
            };
            let requires_upgrade = plans::upgrade_for_feature(plan, feature);

            tracing::info!(
                user_id = %user_id,
                feature = %feature,
                plan = %plan,
                reason = %reason,
                "Feature access denied"
            );
            return Ok(AccessDecision::deny(feature, plan, reason, requires_upgrade, None));
        }

        if !feature.is_metered() {
            return Ok(AccessDecision::allow(feature, plan, None));
        }

        match self.meter.check_quota(user_id, feature, plan, period).await? {
            QuotaCheck::Unlimited => Ok(AccessDecision::allow(feature, plan, None)),
            QuotaCheck::Within(usage) => Ok(AccessDecision::allow(feature, plan, Some(usage))),
            QuotaCheck::Exhausted(usage) => {
                tracing::info!(
                    user_id = %user_id,
                    feature = %feature,
                    plan = %plan,
                    used = usage.used,
                    limit = ?usage.limit,
                    "Usage limit reached"
                );
                Ok(AccessDecision::deny(
                    feature,
                    plan,
                    DenialReason::UsageLimitReached,
                    plans::upgrade_for_quota(plan, feature, usage.used),
                    Some(usage),
                ))
            }
        }
    }

    /// Plan, status, current-period usage and feature flags for a user
    pub async fn subscription_status(&self, user_id: UserId) -> BillingResult<EntitlementStatus> {
        let now = OffsetDateTime::now_utc();
        let subscription = self.resolver.resolve_subscription_at(user_id, now).await?;
        let period = UsagePeriod::containing(now)?;
        let plan = subscription.effective_plan();

        let mut usage = BTreeMap::new();
        for feature in Feature::METERED {
            let snapshot = self.meter.get_usage(user_id, feature, &period, plan).await?;
            usage.insert(feature.as_str(), snapshot);
        }

        let features = Feature::ALL
            .into_iter()
            .map(|feature| (feature.as_str(), plans::is_feature_available(plan, feature)))
            .collect();

        Ok(EntitlementStatus {
            plan,
            status: subscription.status(),
            current_period_end: subscription.expires_at,
            usage_period: period,
            usage,
            features,
        })
    }
}
