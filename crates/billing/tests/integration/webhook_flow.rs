//! Signed subscription events updating team plans

use std::sync::Arc;

use hmac::{Hmac, Mac};
use scalehub_billing::{
    entitlements, InMemoryStore, PriceIds, StripeConfig, WebhookHandler, WebhookOutcome,
};
use scalehub_shared::{Feature, PlanId, TeamId, UserId};
use sha2::Sha256;
use time::{Duration, OffsetDateTime};

const SECRET: &str = "whsec_integration";

fn config() -> StripeConfig {
    StripeConfig {
        secret_key: "sk_test_integration".to_string(),
        webhook_secret: SECRET.to_string(),
        price_ids: PriceIds {
            starter: "price_starter".to_string(),
            enterprise: "price_enterprise".to_string(),
        },
        app_base_url: "http://localhost:3000".to_string(),
    }
}

fn sign(payload: &str) -> String {
    let timestamp = OffsetDateTime::now_utc().unix_timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

fn subscription_event(id: &str, kind: &str, status: &str, price: &str, period_end: i64) -> String {
    let created = OffsetDateTime::now_utc().unix_timestamp();
    subscription_event_at(id, kind, status, price, period_end, created)
}

fn subscription_event_at(
    id: &str,
    kind: &str,
    status: &str,
    price: &str,
    period_end: i64,
    created: i64,
) -> String {
    serde_json::json!({
        "id": id,
        "type": kind,
        "created": created,
        "data": {
            "object": {
                "id": "sub_123",
                "customer": "cus_team",
                "status": status,
                "current_period_end": period_end,
                "items": { "data": [ { "price": { "id": price } } ] }
            }
        }
    })
    .to_string()
}

async fn deliver(handler: &WebhookHandler, payload: &str) -> WebhookOutcome {
    let event = handler.verify_event(payload, &sign(payload)).unwrap();
    handler.handle_event(event).await.unwrap()
}

async fn setup() -> (Arc<InMemoryStore>, WebhookHandler, UserId, TeamId) {
    let store = Arc::new(InMemoryStore::new());
    let handler = WebhookHandler::new(config(), store.clone());
    let user = UserId::new();
    let team = TeamId::new();
    store.insert_team(team, "free", None, Some("cus_team")).await;
    store.add_member(team, user).await;
    (store, handler, user, team)
}

#[tokio::test]
async fn subscription_created_upgrades_team() {
    let (store, handler, user, team) = setup().await;
    let period_end = (OffsetDateTime::now_utc() + Duration::days(30)).unix_timestamp();
    let payload = subscription_event(
        "evt_created",
        "customer.subscription.created",
        "active",
        "price_starter",
        period_end,
    );

    let outcome = deliver(&handler, &payload).await;
    assert!(matches!(outcome, WebhookOutcome::Applied { .. }));

    let (plan, expires_at) = store.team_plan(team).await.unwrap();
    assert_eq!(plan, "starter");
    assert_eq!(expires_at.map(|t| t.unix_timestamp()), Some(period_end));

    let decision = entitlements(store)
        .check_feature_access(user, Feature::DataExport)
        .await
        .unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.current_plan, PlanId::Starter);
}

#[tokio::test]
async fn duplicate_delivery_is_skipped() {
    let (_, handler, _, _) = setup().await;
    let period_end = (OffsetDateTime::now_utc() + Duration::days(30)).unix_timestamp();
    let payload = subscription_event(
        "evt_dup",
        "customer.subscription.updated",
        "active",
        "price_enterprise",
        period_end,
    );

    assert!(matches!(
        deliver(&handler, &payload).await,
        WebhookOutcome::Applied { .. }
    ));
    assert_eq!(deliver(&handler, &payload).await, WebhookOutcome::Duplicate);
}

#[tokio::test]
async fn subscription_deleted_returns_team_to_free() {
    let (store, handler, _, team) = setup().await;
    store
        .insert_team(
            team,
            "enterprise",
            Some(OffsetDateTime::now_utc() + Duration::days(10)),
            Some("cus_team"),
        )
        .await;
    let payload = subscription_event(
        "evt_deleted",
        "customer.subscription.deleted",
        "canceled",
        "price_enterprise",
        0,
    );

    deliver(&handler, &payload).await;
    assert_eq!(store.team_plan(team).await, Some(("free".to_string(), None)));
}

#[tokio::test]
async fn unknown_price_is_ignored() {
    let (store, handler, _, team) = setup().await;
    let payload = subscription_event(
        "evt_unknown_price",
        "customer.subscription.updated",
        "active",
        "price_legacy",
        0,
    );

    assert_eq!(deliver(&handler, &payload).await, WebhookOutcome::Ignored);
    assert_eq!(store.team_plan(team).await, Some(("free".to_string(), None)));
}

#[tokio::test]
async fn unrelated_event_types_are_ignored() {
    let (_, handler, _, _) = setup().await;
    let payload = serde_json::json!({
        "id": "evt_invoice",
        "type": "invoice.paid",
        "data": { "object": {} }
    })
    .to_string();

    assert_eq!(deliver(&handler, &payload).await, WebhookOutcome::Ignored);
}

#[tokio::test]
async fn bad_signature_is_rejected() {
    let (_, handler, _, _) = setup().await;
    let payload = subscription_event("evt_forged", "customer.subscription.created", "active", "price_enterprise", 0);
    let forged = sign("{}");
    assert!(handler.verify_event(&payload, &forged).is_err());
}

#[tokio::test]
async fn failed_apply_is_retried_on_redelivery() {
    let (store, handler, _, team) = setup().await;
    let period_end = (OffsetDateTime::now_utc() + Duration::days(30)).unix_timestamp();
    let payload = subscription_event(
        "evt_retry",
        "customer.subscription.created",
        "active",
        "price_starter",
        period_end,
    );

    store.set_billing_writes_unavailable(true);
    let event = handler.verify_event(&payload, &sign(&payload)).unwrap();
    assert!(handler.handle_event(event).await.is_err());
    assert_eq!(store.team_plan(team).await, Some(("free".to_string(), None)));

    store.set_billing_writes_unavailable(false);
    assert!(matches!(
        deliver(&handler, &payload).await,
        WebhookOutcome::Applied { .. }
    ));
    assert_eq!(store.team_plan(team).await.map(|(plan, _)| plan), Some("starter".to_string()));
    assert_eq!(deliver(&handler, &payload).await, WebhookOutcome::Duplicate);
}

#[tokio::test]
async fn late_update_after_deletion_is_stale() {
    let (store, handler, _, team) = setup().await;
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let period_end = now + 30 * 24 * 3600;

    let deleted = subscription_event_at(
        "evt_deleted_first",
        "customer.subscription.deleted",
        "canceled",
        "price_enterprise",
        period_end,
        now,
    );
    let late_update = subscription_event_at(
        "evt_updated_late",
        "customer.subscription.updated",
        "active",
        "price_enterprise",
        period_end,
        now - 60,
    );

    assert!(matches!(
        deliver(&handler, &deleted).await,
        WebhookOutcome::Applied { .. }
    ));
    assert_eq!(deliver(&handler, &late_update).await, WebhookOutcome::Stale);
    assert_eq!(store.team_plan(team).await, Some(("free".to_string(), None)));
}
