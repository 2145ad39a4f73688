//! Usage metering service
//!
//! Per-user counters for metered features, scoped to a calendar-month period.
//! A counter only ever answers for its own period; rolling over to a new month
//! starts a fresh row.

use std::sync::Arc;

use scalehub_shared::{Feature, PlanId, UserId};
use serde::Serialize;
use time::{Date, Month, OffsetDateTime, Time};

use crate::error::{BillingError, BillingResult};
use crate::plans;
use crate::store::{UsageKey, UsageStore};

/// Calendar month in UTC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsagePeriod {
    /// `YYYY-MM`
    pub key: String,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl UsagePeriod {
    /// Period containing `at`
    pub fn containing(at: OffsetDateTime) -> BillingResult<Self> {
        let at = at.to_offset(time::UtcOffset::UTC);
        let (year, month) = (at.year(), at.month());
        let (next_year, next_month) = match month {
            Month::December => (year + 1, Month::January),
            _ => (year, month.next()),
        };

        let start = first_of_month(year, month)?;
        let end = first_of_month(next_year, next_month)?;

        Ok(Self {
            key: format!("{:04}-{:02}", year, u8::from(month)),
            start,
            end,
        })
    }

    pub fn current() -> BillingResult<Self> {
        Self::containing(OffsetDateTime::now_utc())
    }
}

fn first_of_month(year: i32, month: Month) -> BillingResult<OffsetDateTime> {
    Date::from_calendar_date(year, month, 1)
        .map(|date| date.with_time(Time::MIDNIGHT).assume_utc())
        .map_err(|e| BillingError::Internal(format!("Invalid usage period: {}", e)))
}

/// Usage of one metered feature within a period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub used: u64,
    /// `None` means unlimited
    pub limit: Option<u64>,
}

impl UsageSnapshot {
    pub fn is_within_limit(&self) -> bool {
        self.limit.map_or(true, |limit| self.used < limit)
    }
}

/// Outcome of a quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaCheck {
    /// The plan has no limit; the counter was not consulted
    Unlimited,
    Within(UsageSnapshot),
    Exhausted(UsageSnapshot),
}

impl QuotaCheck {
    pub fn allowed(&self) -> bool {
        !matches!(self, QuotaCheck::Exhausted(_))
    }

    pub fn snapshot(&self) -> Option<UsageSnapshot> {
        match self {
            QuotaCheck::Unlimited => None,
            QuotaCheck::Within(snapshot) | QuotaCheck::Exhausted(snapshot) => Some(*snapshot),
        }
    }
}

/// Usage metering service
#[derive(Clone)]
pub struct UsageMeter {
    store: Arc<dyn UsageStore>,
}

impl UsageMeter {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self { store }
    }

    /// Counter value and plan limit for a feature in a period
    pub async fn get_usage(
        &self,
        user_id: UserId,
        feature: Feature,
        period: &UsagePeriod,
        plan: PlanId,
    ) -> BillingResult<UsageSnapshot> {
        let used = self.store.count(&usage_key(user_id, feature, period)).await?;
        Ok(UsageSnapshot {
            used,
            limit: plans::limit_for(plan, feature),
        })
    }

    /// Compare the counter against the plan limit.
    /// Unlimited plans short-circuit without reading the counter.
    pub async fn check_quota(
        &self,
        user_id: UserId,
        feature: Feature,
        plan: PlanId,
        period: &UsagePeriod,
    ) -> BillingResult<QuotaCheck> {
        if plans::limit_for(plan, feature).is_none() {
            return Ok(QuotaCheck::Unlimited);
        }

        let snapshot = self.get_usage(user_id, feature, period, plan).await?;
        Ok(if snapshot.is_within_limit() {
            QuotaCheck::Within(snapshot)
        } else {
            QuotaCheck::Exhausted(snapshot)
        })
    }

    /// Count one use in the current period
    pub async fn increment_usage(&self, user_id: UserId, feature: Feature) -> BillingResult<u64> {
        let period = UsagePeriod::current()?;
        self.increment_usage_in(user_id, feature, &period).await
    }

    pub async fn increment_usage_in(
        &self,
        user_id: UserId,
        feature: Feature,
        period: &UsagePeriod,
    ) -> BillingResult<u64> {
        ensure_metered(feature)?;
        let count = self
            .store
            .increment(&usage_key(user_id, feature, period), None)
            .await?
            .ok_or_else(|| BillingError::Internal("uncapped increment was rejected".to_string()))?;

        tracing::debug!(user_id = %user_id, feature = %feature, period = %period.key, count, "Usage incremented");
        Ok(count)
    }

    /// Count one use only if the plan limit still allows it.
    /// Returns the new count, or `None` when the quota is exhausted.
    pub async fn try_consume(
        &self,
        user_id: UserId,
        feature: Feature,
        plan: PlanId,
        period: &UsagePeriod,
    ) -> BillingResult<Option<u64>> {
        ensure_metered(feature)?;
        let cap = plans::limit_for(plan, feature);
        let count = self
            .store
            .increment(&usage_key(user_id, feature, period), cap)
            .await?;

        if count.is_none() {
            tracing::info!(user_id = %user_id, feature = %feature, plan = %plan, "Usage limit reached");
        }
        Ok(count)
    }

    /// Return one unit taken by [`UsageMeter::try_consume`]
    pub async fn refund(
        &self,
        user_id: UserId,
        feature: Feature,
        period: &UsagePeriod,
    ) -> BillingResult<()> {
        ensure_metered(feature)?;
        self.store
            .decrement(&usage_key(user_id, feature, period))
            .await?;

        tracing::debug!(user_id = %user_id, feature = %feature, period = %period.key, "Usage refunded");
        Ok(())
    }
}

fn usage_key(user_id: UserId, feature: Feature, period: &UsagePeriod) -> UsageKey {
    UsageKey {
        user_id,
        feature,
        period_key: period.key.clone(),
    }
}

fn ensure_metered(feature: Feature) -> BillingResult<()> {
    if feature.is_metered() {
        Ok(())
    } else {
        Err(BillingError::InvalidInput(format!(
            "{} is not a metered feature",
            feature
        )))
    }
}
