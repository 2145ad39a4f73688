//! Access guard around feature-gated handlers
//!
//! Framework-independent: the HTTP layer hands in the resolved identity and a
//! handler future, and maps [`GuardRejection`] to its own response type.

use std::future::Future;

use scalehub_shared::{Feature, PlanId, UserId};

use crate::entitlement::{AccessDecision, DenialReason, EntitlementService};
use crate::error::BillingError;
use crate::plans;
use crate::usage::{UsageMeter, UsagePeriod, UsageSnapshot};

/// When a metered feature's counter is incremented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncrementTiming {
    /// Consume quota atomically before running the handler; a request that
    /// loses the race for the last unit is denied and the handler never runs.
    /// The unit is refunded when the handler fails.
    BeforeHandler,
    /// Count the use after the handler succeeded, capped at the plan limit.
    /// Concurrent requests can all pass the check, so the limit is soft.
    #[default]
    AfterSuccess,
}

/// Per call-site guard configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardOptions {
    pub feature: Feature,
    pub auto_increment: bool,
    pub timing: IncrementTiming,
}

impl GuardOptions {
    /// Allow/deny check only; never touches counters
    pub fn check_only(feature: Feature) -> Self {
        Self {
            feature,
            auto_increment: false,
            timing: IncrementTiming::default(),
        }
    }

    /// Reserve one use before the handler runs; the hard-limit gate
    pub fn reserved(feature: Feature) -> Self {
        Self::metered(feature).with_timing(IncrementTiming::BeforeHandler)
    }

    /// Check and count one use after the handler succeeds
    pub fn metered(feature: Feature) -> Self {
        Self {
            feature,
            auto_increment: feature.is_metered(),
            timing: IncrementTiming::AfterSuccess,
        }
    }

    pub fn with_timing(mut self, timing: IncrementTiming) -> Self {
        self.timing = timing;
        self
    }

    fn increments(&self) -> bool {
        self.auto_increment && self.feature.is_metered()
    }
}

/// Why the guarded handler did not run
#[derive(Debug)]
pub enum GuardRejection {
    /// No resolvable identity
    Unauthenticated,
    /// Identity resolved, but plan or quota insufficient
    Denied(AccessDecision),
    /// Backing store failure
    Internal(BillingError),
}

impl From<BillingError> for GuardRejection {
    fn from(err: BillingError) -> Self {
        GuardRejection::Internal(err)
    }
}

/// Runs handlers behind a feature access check
#[derive(Clone)]
pub struct AccessGuard {
    entitlements: EntitlementService,
    options: GuardOptions,
}

impl AccessGuard {
    pub fn new(entitlements: EntitlementService, options: GuardOptions) -> Self {
        Self {
            entitlements,
            options,
        }
    }

    /// Check access for `identity`, then run `handler` with the decision.
    ///
    /// The handler's `Err` side marks an unsuccessful request, which ends up
    /// counting no usage under either timing. Usage writes that fail after the
    /// handler ran are logged and the handler's result is returned unchanged.
    pub async fn run<F, Fut, T, E>(
        &self,
        identity: Option<UserId>,
        handler: F,
    ) -> Result<Result<T, E>, GuardRejection>
    where
        F: FnOnce(AccessDecision) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let user_id = identity.ok_or(GuardRejection::Unauthenticated)?;
        let feature = self.options.feature;

        let now = time::OffsetDateTime::now_utc();
        let subscription = self
            .entitlements
            .resolver()
            .resolve_subscription_at(user_id, now)
            .await?;
        let period = UsagePeriod::containing(now)?;
        let mut decision = self
            .entitlements
            .evaluate(user_id, feature, &subscription, &period)
            .await?;

        if !decision.allowed {
            return Err(GuardRejection::Denied(decision));
        }

        let plan = decision.current_plan;
        let meter = self.entitlements.meter();
        let reserve =
            self.options.increments() && self.options.timing == IncrementTiming::BeforeHandler;

        if reserve {
            match meter.try_consume(user_id, feature, plan, &period).await? {
                Some(used) => {
                    decision.usage = decision.usage.map(|usage| UsageSnapshot { used, ..usage });
                }
                None => return Err(GuardRejection::Denied(quota_lost(decision))),
            }
        }

        let result = handler(decision).await;

        if reserve && result.is_err() {
            refund_failed(meter, user_id, feature, &period).await;
        } else if result.is_ok()
            && self.options.increments()
            && self.options.timing == IncrementTiming::AfterSuccess
        {
            record_after_success(meter, user_id, feature, plan, &period).await;
        }

        Ok(result)
    }
}

/// Denial for a request that passed the check but lost the last unit of quota
fn quota_lost(decision: AccessDecision) -> AccessDecision {
    let plan = decision.current_plan;
    let feature = decision.feature;
    let usage = decision
        .usage
        .map(|usage| UsageSnapshot {
            used: usage.limit.unwrap_or(usage.used),
            ..usage
        });
    let used = usage.map_or(0, |usage| usage.used);

    AccessDecision {
        allowed: false,
        reason: Some(DenialReason::UsageLimitReached),
        requires_upgrade: plans::upgrade_for_quota(plan, feature, used),
        usage,
        ..decision
    }
}

async fn record_after_success(
    meter: &UsageMeter,
    user_id: UserId,
    feature: Feature,
    plan: PlanId,
    period: &UsagePeriod,
) {
    match meter.try_consume(user_id, feature, plan, period).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            tracing::warn!(
                user_id = %user_id,
                feature = %feature,
                plan = %plan,
                "Request served past the usage limit by a concurrent caller"
            );
        }
        // The handler's side effects already happened and stay in place
        Err(e) => {
            tracing::error!(
                user_id = %user_id,
                feature = %feature,
                error = %e,
                "Failed to record usage after successful request"
            );
        }
    }
}

async fn refund_failed(meter: &UsageMeter, user_id: UserId, feature: Feature, period: &UsagePeriod) {
    if let Err(e) = meter.refund(user_id, feature, period).await {
        tracing::error!(
            user_id = %user_id,
            feature = %feature,
            error = %e,
            "Failed to refund usage of a failed request"
        );
    }
}
