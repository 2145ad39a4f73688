//! Subscription Resolver
//!
//! Derives a user's subscription from team membership and team billing state.
//! Nothing is cached: every call reads the store.

use std::cmp::Reverse;
use std::sync::Arc;

use scalehub_shared::{PlanId, SubscriptionStatus, TeamId, UserId};
use time::OffsetDateTime;

use crate::error::BillingResult;
use crate::store::{BillingStore, TeamBilling};

/// Subscription derived from a team at request time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Stored plan of the resolved team; `None` without an active membership
    pub plan_id: Option<PlanId>,
    pub expires_at: Option<OffsetDateTime>,
    pub is_active: bool,
    pub team_id: Option<TeamId>,
    pub billing_customer_id: Option<String>,
}

impl Subscription {
    /// Subscription of a user without any active membership
    pub fn none() -> Self {
        Self {
            plan_id: None,
            expires_at: None,
            is_active: false,
            team_id: None,
            billing_customer_id: None,
        }
    }

    fn from_team(team: &TeamBilling, now: OffsetDateTime) -> Self {
        Self {
            plan_id: Some(PlanId::from_str_lossy(&team.plan_id)),
            expires_at: team.plan_expires_at,
            is_active: is_active_at(team.plan_expires_at, now),
            team_id: Some(team.team_id),
            billing_customer_id: team.billing_customer_id.clone(),
        }
    }

    /// Plan the user is entitled to: an inactive subscription degrades to free
    pub fn effective_plan(&self) -> PlanId {
        match (self.is_active, self.plan_id) {
            (true, Some(plan)) => plan,
            _ => PlanId::Free,
        }
    }

    pub fn status(&self) -> SubscriptionStatus {
        match (self.team_id, self.is_active) {
            (None, _) => SubscriptionStatus::None,
            (Some(_), true) => SubscriptionStatus::Active,
            (Some(_), false) => SubscriptionStatus::Expired,
        }
    }

    /// True when a stored plan exists but its expiry has passed
    pub fn is_expired(&self) -> bool {
        self.status() == SubscriptionStatus::Expired
    }
}

fn is_active_at(expires_at: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
    expires_at.map_or(true, |expiry| expiry > now)
}

/// Resolves subscriptions through an injected [`BillingStore`]
#[derive(Clone)]
pub struct SubscriptionResolver {
    store: Arc<dyn BillingStore>,
}

impl SubscriptionResolver {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    pub async fn resolve_subscription(&self, user_id: UserId) -> BillingResult<Subscription> {
        self.resolve_subscription_at(user_id, OffsetDateTime::now_utc())
            .await
    }

    /// Resolve against an explicit clock.
    ///
    /// With several active memberships, an active subscription beats an expired
    /// one, then the higher tier wins, then the earlier membership.
    pub async fn resolve_subscription_at(
        &self,
        user_id: UserId,
        now: OffsetDateTime,
    ) -> BillingResult<Subscription> {
        let memberships = self.store.active_memberships(user_id).await?;

        let subscription = memberships
            .iter()
            .map(|team| Subscription::from_team(team, now))
            .zip(memberships.iter().map(|team| team.joined_at))
            .max_by_key(|(sub, joined_at)| (sub.is_active, sub.plan_id, Reverse(*joined_at)))
            .map(|(sub, _)| sub)
            .unwrap_or_else(Subscription::none);

        tracing::debug!(
            user_id = %user_id,
            memberships = memberships.len(),
            plan = ?subscription.plan_id,
            is_active = subscription.is_active,
            "Resolved subscription"
        );

        Ok(subscription)
    }
}
