//! Backing-store seam for subscription and usage state
//!
//! Components receive these as trait objects, so every request reads fresh
//! state from whichever store was injected at startup.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use scalehub_shared::{Feature, PlanId, TeamId, UserId};
use time::OffsetDateTime;

use crate::error::BillingResult;

/// Billing columns of a team joined through one of the user's active memberships
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamBilling {
    pub team_id: TeamId,
    /// Raw stored plan identifier
    pub plan_id: String,
    pub plan_expires_at: Option<OffsetDateTime>,
    pub billing_customer_id: Option<String>,
    pub joined_at: OffsetDateTime,
}

/// Plan change pushed by the payment provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamBillingUpdate {
    pub plan_id: PlanId,
    pub plan_expires_at: Option<OffsetDateTime>,
    /// Creation time of the event carrying the change
    pub event_at: Option<OffsetDateTime>,
}

/// Result of [`BillingStore::apply_team_billing`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingApply {
    Applied,
    /// The team already holds a change from a newer event
    Stale,
    /// No team carries the customer reference
    UnknownCustomer,
}

/// Counter address: one row per user, feature and period
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UsageKey {
    pub user_id: UserId,
    pub feature: Feature,
    pub period_key: String,
}

#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Teams reachable through the user's active memberships
    async fn active_memberships(&self, user_id: UserId) -> BillingResult<Vec<TeamBilling>>;

    /// Apply a plan change to the team owning `customer_id`, unless the team
    /// was last updated by an event created after `update.event_at`.
    async fn apply_team_billing(
        &self,
        customer_id: &str,
        update: &TeamBillingUpdate,
    ) -> BillingResult<BillingApply>;

    /// Record a webhook event id. Returns `false` if it was already recorded.
    async fn record_webhook_event(&self, event_id: &str, event_type: &str) -> BillingResult<bool>;

    /// Drop a recorded event id so a redelivery is processed again
    async fn release_webhook_event(&self, event_id: &str) -> BillingResult<()>;

    async fn ping(&self) -> BillingResult<()>;
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Current count, 0 when the period has no row yet
    async fn count(&self, key: &UsageKey) -> BillingResult<u64>;

    /// Atomically add one to the counter.
    ///
    /// With `cap = Some(n)` the increment only happens while the count is below `n`;
    /// `None` is returned when the cap is already reached.
    async fn increment(&self, key: &UsageKey, cap: Option<u64>) -> BillingResult<Option<u64>>;

    /// Give back one unit; the count never drops below zero
    async fn decrement(&self, key: &UsageKey) -> BillingResult<()>;
}
