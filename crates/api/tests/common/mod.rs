//! Router test harness over in-memory stores

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use scalehub_api::{
    auth::SessionManager,
    catalog::{InMemoryScaleDirectory, Scale},
    create_router, AppState, Config,
};
use scalehub_billing::{
    store::UsageKey, BillingService, InMemoryStore, PriceIds, StripeClient, StripeConfig,
    UsagePeriod, UsageStore,
};
use scalehub_shared::{Feature, UserId};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub const SESSION_SECRET: &str = "router-test-session-secret-32-chars-min";
pub const WEBHOOK_SECRET: &str = "whsec_router_test";

pub fn config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".to_string(),
        cors_allowed_origins: Vec::new(),
        database_url: "postgres://unused".to_string(),
        database_max_connections: 1,
        session_secret: SESSION_SECRET.to_string(),
        session_cookie_name: "scalehub_session".to_string(),
        session_expiry_hours: 1,
        enable_billing: false,
    }
}

pub fn scale(slug: &str, name: &str, abbreviation: &str) -> Scale {
    Scale {
        id: Uuid::new_v4(),
        slug: slug.to_string(),
        name: name.to_string(),
        abbreviation: Some(abbreviation.to_string()),
        domain: "mental_health".to_string(),
        item_count: 9,
        description: None,
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub sessions: SessionManager,
}

pub fn stripe_config() -> StripeConfig {
    StripeConfig {
        secret_key: "sk_test_router".to_string(),
        webhook_secret: WEBHOOK_SECRET.to_string(),
        price_ids: PriceIds {
            starter: "price_starter".to_string(),
            enterprise: "price_enterprise".to_string(),
        },
        app_base_url: "http://localhost:3000".to_string(),
    }
}

pub fn app() -> TestApp {
    build(false)
}

/// App with Stripe services wired over the same store
pub fn billing_app() -> TestApp {
    build(true)
}

fn build(with_billing: bool) -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let scales = Arc::new(InMemoryScaleDirectory::new(vec![
        scale("phq-9", "Patient Health Questionnaire", "PHQ-9"),
        scale("gad-7", "Generalized Anxiety Disorder", "GAD-7"),
    ]));
    let billing = with_billing
        .then(|| BillingService::new(StripeClient::new(stripe_config()), store.clone()));
    let state = AppState::new(config(), store.clone(), scales, billing);
    let sessions = state.sessions.clone();

    TestApp {
        router: create_router(state),
        store,
        sessions,
    }
}

impl TestApp {
    fn cookie(&self, user: UserId) -> String {
        let token = self.sessions.issue(user, "reader@example.com").unwrap();
        format!("scalehub_session={}", token)
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str, user: Option<UserId>) -> (StatusCode, Value) {
        let mut request = Request::builder().uri(uri);
        if let Some(user) = user {
            request = request.header("cookie", self.cookie(user));
        }
        self.send(request.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        user: Option<UserId>,
        body: &str,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user) = user {
            request = request.header("cookie", self.cookie(user));
        }
        self.send(request.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn usage(&self, user: UserId, feature: Feature) -> u64 {
        self.store.count(&usage_key(user, feature)).await.unwrap()
    }

    pub async fn set_usage(&self, user: UserId, feature: Feature, count: u64) {
        self.store.set_count(usage_key(user, feature), count).await;
    }
}

fn usage_key(user_id: UserId, feature: Feature) -> UsageKey {
    UsageKey {
        user_id,
        feature,
        period_key: UsagePeriod::current().unwrap().key,
    }
}
