//! End-to-end access checks through the public API

use std::sync::Arc;

use futures::future::join_all;
use scalehub_billing::{
    entitlements, AccessGuard, DenialReason, GuardOptions, GuardRejection, InMemoryStore,
    IncrementTiming, UsagePeriod, UsageStore,
};
use scalehub_billing::store::UsageKey;
use scalehub_shared::{Feature, PlanId, UserId};
use time::{Duration, OffsetDateTime};

fn key(user_id: UserId, feature: Feature) -> UsageKey {
    UsageKey {
        user_id,
        feature,
        period_key: UsagePeriod::current().unwrap().key,
    }
}

#[tokio::test]
async fn free_user_exhausts_search_quota() {
    let store = Arc::new(InMemoryStore::new());
    let service = entitlements(store.clone());
    let guard = AccessGuard::new(service.clone(), GuardOptions::metered(Feature::Search));
    let user = UserId::new();
    store.team_with_member(PlanId::Free, None, user).await;

    for _ in 0..30 {
        guard
            .run(Some(user), |_| async { Ok::<_, ()>(()) })
            .await
            .unwrap()
            .unwrap();
    }

    match guard.run(Some(user), |_| async { Ok::<_, ()>(()) }).await {
        Err(GuardRejection::Denied(decision)) => {
            assert_eq!(decision.reason, Some(DenialReason::UsageLimitReached));
            assert_eq!(decision.requires_upgrade, Some(PlanId::Starter));
        }
        other => panic!("expected usage limit denial, got {:?}", other.map(|_| ())),
    }
    assert_eq!(store.count(&key(user, Feature::Search)).await.unwrap(), 30);
}

#[tokio::test]
async fn plan_expiry_takes_effect_without_restart() {
    let store = Arc::new(InMemoryStore::new());
    let service = entitlements(store.clone());
    let user = UserId::new();
    let team = scalehub_shared::TeamId::new();
    store
        .insert_team(team, "starter", None, Some("cus_expiring"))
        .await;
    store.add_member(team, user).await;

    let before = service
        .check_feature_access(user, Feature::DataExport)
        .await
        .unwrap();
    assert!(before.allowed);

    // Same store, same service instance: a later plan change is visible
    store
        .insert_team(
            team,
            "starter",
            Some(OffsetDateTime::now_utc() - Duration::minutes(1)),
            Some("cus_expiring"),
        )
        .await;
    let after = service
        .check_feature_access(user, Feature::DataExport)
        .await
        .unwrap();
    assert!(!after.allowed);
    assert_eq!(after.reason, Some(DenialReason::SubscriptionExpired));
}

#[tokio::test]
async fn concurrent_increments_are_not_lost() {
    let store = Arc::new(InMemoryStore::new());
    let service = entitlements(store.clone());
    let meter = service.meter().clone();
    let user = UserId::new();

    let counts = join_all(
        (0..50).map(|_| meter.increment_usage(user, Feature::ScaleView)),
    )
    .await
    .into_iter()
    .collect::<Result<Vec<_>, _>>()
    .unwrap();

    let mut sorted = counts.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, (1..=50).collect::<Vec<u64>>());
    assert_eq!(store.count(&key(user, Feature::ScaleView)).await.unwrap(), 50);
}

#[tokio::test]
async fn concurrent_consumers_never_exceed_limit() {
    let store = Arc::new(InMemoryStore::new());
    let service = entitlements(store.clone());
    let guard = AccessGuard::new(
        service,
        GuardOptions::metered(Feature::AiInterpretation)
            .with_timing(IncrementTiming::BeforeHandler),
    );
    let user = UserId::new();
    store.team_with_member(PlanId::Starter, None, user).await;

    let results = join_all(
        (0..80).map(|_| guard.run(Some(user), |_| async { Ok::<_, ()>(()) })),
    )
    .await;

    let allowed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(allowed, 50);
    assert_eq!(
        store.count(&key(user, Feature::AiInterpretation)).await.unwrap(),
        50
    );
}

#[tokio::test]
async fn unlimited_plan_still_counts_usage() {
    let store = Arc::new(InMemoryStore::new());
    let service = entitlements(store.clone());
    let guard = AccessGuard::new(service.clone(), GuardOptions::metered(Feature::Search));
    let user = UserId::new();
    store.team_with_member(PlanId::Enterprise, None, user).await;

    for _ in 0..3 {
        guard
            .run(Some(user), |_| async { Ok::<_, ()>(()) })
            .await
            .unwrap()
            .unwrap();
    }

    let status = service.subscription_status(user).await.unwrap();
    let search = status.usage_for(Feature::Search).unwrap();
    assert_eq!(search.used, 3);
    assert_eq!(search.limit, None);
}
