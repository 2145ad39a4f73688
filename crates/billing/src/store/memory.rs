//! In-memory stores for tests and local development

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use scalehub_shared::{PlanId, TeamId, UserId};
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::{BillingApply, BillingStore, TeamBilling, TeamBillingUpdate, UsageKey, UsageStore};
use crate::error::{BillingError, BillingResult};

#[derive(Debug, Clone)]
struct TeamRecord {
    plan_id: String,
    plan_expires_at: Option<OffsetDateTime>,
    billing_customer_id: Option<String>,
    billing_event_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
struct MembershipRecord {
    team_id: TeamId,
    user_id: UserId,
    is_active: bool,
    joined_at: OffsetDateTime,
}

#[derive(Default)]
struct State {
    teams: HashMap<TeamId, TeamRecord>,
    memberships: Vec<MembershipRecord>,
    counters: HashMap<UsageKey, u64>,
    webhook_events: HashSet<String>,
}

/// Mutex-guarded maps implementing both store traits.
///
/// Each operation holds the lock for its whole read-modify-write, which gives
/// the same atomicity as the single-statement Postgres increment.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
    usage_writes_unavailable: AtomicBool,
    billing_writes_unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a team
    pub async fn insert_team(
        &self,
        team_id: TeamId,
        plan_id: &str,
        plan_expires_at: Option<OffsetDateTime>,
        billing_customer_id: Option<&str>,
    ) {
        self.state.lock().await.teams.insert(
            team_id,
            TeamRecord {
                plan_id: plan_id.to_string(),
                plan_expires_at,
                billing_customer_id: billing_customer_id.map(str::to_string),
                billing_event_at: None,
            },
        );
    }

    /// Convenience: create a team on `plan` with a single active member
    pub async fn team_with_member(
        &self,
        plan: PlanId,
        plan_expires_at: Option<OffsetDateTime>,
        user_id: UserId,
    ) -> TeamId {
        let team_id = TeamId::new();
        self.insert_team(team_id, plan.as_str(), plan_expires_at, None)
            .await;
        self.add_member(team_id, user_id).await;
        team_id
    }

    pub async fn add_member(&self, team_id: TeamId, user_id: UserId) {
        self.add_member_at(team_id, user_id, OffsetDateTime::now_utc())
            .await;
    }

    pub async fn add_member_at(&self, team_id: TeamId, user_id: UserId, joined_at: OffsetDateTime) {
        self.state.lock().await.memberships.push(MembershipRecord {
            team_id,
            user_id,
            is_active: true,
            joined_at,
        });
    }

    pub async fn deactivate_member(&self, team_id: TeamId, user_id: UserId) {
        let mut state = self.state.lock().await;
        for membership in state
            .memberships
            .iter_mut()
            .filter(|m| m.team_id == team_id && m.user_id == user_id)
        {
            membership.is_active = false;
        }
    }

    /// Stored plan identifier of a team
    pub async fn team_plan(&self, team_id: TeamId) -> Option<(String, Option<OffsetDateTime>)> {
        self.state
            .lock()
            .await
            .teams
            .get(&team_id)
            .map(|team| (team.plan_id.clone(), team.plan_expires_at))
    }

    /// Seed a counter value directly
    pub async fn set_count(&self, key: UsageKey, count: u64) {
        self.state.lock().await.counters.insert(key, count);
    }

    /// Make every operation fail with a database error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make only counter increments fail
    pub fn set_usage_writes_unavailable(&self, unavailable: bool) {
        self.usage_writes_unavailable
            .store(unavailable, Ordering::SeqCst);
    }

    /// Make only team plan changes fail
    pub fn set_billing_writes_unavailable(&self, unavailable: bool) {
        self.billing_writes_unavailable
            .store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> BillingResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BillingError::Database("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BillingStore for InMemoryStore {
    async fn active_memberships(&self, user_id: UserId) -> BillingResult<Vec<TeamBilling>> {
        self.check_available()?;
        let state = self.state.lock().await;

        let mut teams: Vec<TeamBilling> = state
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id && m.is_active)
            .filter_map(|m| {
                state.teams.get(&m.team_id).map(|team| TeamBilling {
                    team_id: m.team_id,
                    plan_id: team.plan_id.clone(),
                    plan_expires_at: team.plan_expires_at,
                    billing_customer_id: team.billing_customer_id.clone(),
                    joined_at: m.joined_at,
                })
            })
            .collect();
        teams.sort_by_key(|team| team.joined_at);
        Ok(teams)
    }

    async fn apply_team_billing(
        &self,
        customer_id: &str,
        update: &TeamBillingUpdate,
    ) -> BillingResult<BillingApply> {
        self.check_available()?;
        if self.billing_writes_unavailable.load(Ordering::SeqCst) {
            return Err(BillingError::Database("teams unavailable".to_string()));
        }
        let mut state = self.state.lock().await;

        let mut outcome = BillingApply::UnknownCustomer;
        for team in state
            .teams
            .values_mut()
            .filter(|team| team.billing_customer_id.as_deref() == Some(customer_id))
        {
            let stale = matches!(
                (team.billing_event_at, update.event_at),
                (Some(last), Some(event_at)) if last > event_at
            );
            if stale {
                outcome = BillingApply::Stale;
                continue;
            }

            team.plan_id = update.plan_id.as_str().to_string();
            team.plan_expires_at = update.plan_expires_at;
            team.billing_event_at = update.event_at.or(team.billing_event_at);
            outcome = BillingApply::Applied;
        }
        Ok(outcome)
    }

    async fn record_webhook_event(&self, event_id: &str, _event_type: &str) -> BillingResult<bool> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .await
            .webhook_events
            .insert(event_id.to_string()))
    }

    async fn release_webhook_event(&self, event_id: &str) -> BillingResult<()> {
        self.check_available()?;
        self.state.lock().await.webhook_events.remove(event_id);
        Ok(())
    }

    async fn ping(&self) -> BillingResult<()> {
        self.check_available()
    }
}

#[async_trait]
impl UsageStore for InMemoryStore {
    async fn count(&self, key: &UsageKey) -> BillingResult<u64> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .await
            .counters
            .get(key)
            .copied()
            .unwrap_or(0))
    }

    async fn increment(&self, key: &UsageKey, cap: Option<u64>) -> BillingResult<Option<u64>> {
        self.check_available()?;
        if self.usage_writes_unavailable.load(Ordering::SeqCst) {
            return Err(BillingError::Database("usage counters unavailable".to_string()));
        }

        let mut state = self.state.lock().await;
        let count = state.counters.entry(key.clone()).or_insert(0);
        if cap.is_some_and(|cap| *count >= cap) {
            return Ok(None);
        }
        *count += 1;
        Ok(Some(*count))
    }

    async fn decrement(&self, key: &UsageKey) -> BillingResult<()> {
        self.check_available()?;
        if self.usage_writes_unavailable.load(Ordering::SeqCst) {
            return Err(BillingError::Database("usage counters unavailable".to_string()));
        }

        if let Some(count) = self.state.lock().await.counters.get_mut(key) {
            *count = count.saturating_sub(1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scalehub_shared::Feature;
    use std::sync::Arc;
    use time::Duration;

    fn key(user_id: UserId) -> UsageKey {
        UsageKey {
            user_id,
            feature: Feature::Search,
            period_key: "2026-10".to_string(),
        }
    }

    #[tokio::test]
    async fn test_inactive_memberships_are_hidden() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        let team = store.team_with_member(PlanId::Starter, None, user).await;

        assert_eq!(store.active_memberships(user).await.unwrap().len(), 1);
        store.deactivate_member(team, user).await;
        assert!(store.active_memberships(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memberships_sorted_by_join_time() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        let now = OffsetDateTime::now_utc();
        let later = TeamId::new();
        let earlier = TeamId::new();
        store.insert_team(later, "free", None, None).await;
        store.insert_team(earlier, "starter", None, None).await;
        store.add_member_at(later, user, now).await;
        store.add_member_at(earlier, user, now - Duration::days(3)).await;

        let teams = store.active_memberships(user).await.unwrap();
        assert_eq!(teams[0].team_id, earlier);
        assert_eq!(teams[1].team_id, later);
    }

    #[tokio::test]
    async fn test_increment_respects_cap() {
        let store = InMemoryStore::new();
        let key = key(UserId::new());

        assert_eq!(store.increment(&key, Some(1)).await.unwrap(), Some(1));
        assert_eq!(store.increment(&key, Some(1)).await.unwrap(), None);
        assert_eq!(store.count(&key).await.unwrap(), 1);
        assert_eq!(store.increment(&key, None).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_parallel_increments() {
        let store = Arc::new(InMemoryStore::new());
        let key = key(UserId::new());

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let store = store.clone();
                let key = key.clone();
                tokio::spawn(async move { store.increment(&key, None).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.count(&key).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.ping().await,
            Err(BillingError::Database(_))
        ));
        store.set_unavailable(false);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_apply_team_billing_by_customer() {
        let store = InMemoryStore::new();
        let team = TeamId::new();
        store.insert_team(team, "free", None, Some("cus_123")).await;

        let update = TeamBillingUpdate {
            plan_id: PlanId::Enterprise,
            plan_expires_at: None,
            event_at: None,
        };
        assert_eq!(
            store.apply_team_billing("cus_123", &update).await.unwrap(),
            BillingApply::Applied
        );
        assert_eq!(
            store.apply_team_billing("cus_missing", &update).await.unwrap(),
            BillingApply::UnknownCustomer
        );
        assert_eq!(
            store.team_plan(team).await,
            Some(("enterprise".to_string(), None))
        );
    }

    #[tokio::test]
    async fn test_older_billing_event_is_stale() {
        let store = InMemoryStore::new();
        let team = TeamId::new();
        store.insert_team(team, "free", None, Some("cus_123")).await;
        let newer = OffsetDateTime::now_utc();

        let downgrade = TeamBillingUpdate {
            plan_id: PlanId::Free,
            plan_expires_at: None,
            event_at: Some(newer),
        };
        assert_eq!(
            store.apply_team_billing("cus_123", &downgrade).await.unwrap(),
            BillingApply::Applied
        );

        let late_upgrade = TeamBillingUpdate {
            plan_id: PlanId::Starter,
            plan_expires_at: None,
            event_at: Some(newer - Duration::minutes(5)),
        };
        assert_eq!(
            store.apply_team_billing("cus_123", &late_upgrade).await.unwrap(),
            BillingApply::Stale
        );
        assert_eq!(store.team_plan(team).await, Some(("free".to_string(), None)));
    }
}
