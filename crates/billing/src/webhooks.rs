//! Stripe webhook handling
//!
//! Subscription lifecycle events are the only writer of a team's plan and
//! expiry. Signatures are verified by hand with HMAC-SHA256, which keeps the
//! handler independent of the API version pinned in async-stripe's event types.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use scalehub_shared::PlanId;
use serde::Deserialize;
use sha2::Sha256;
use time::OffsetDateTime;

use crate::client::StripeConfig;
use crate::error::{BillingError, BillingResult};
use crate::store::{BillingApply, BillingStore, TeamBillingUpdate};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed payload, in seconds
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    /// Unix seconds at which the provider created the event
    #[serde(default)]
    pub created: Option<i64>,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// Subset of a Stripe subscription object
#[derive(Debug, Clone, Deserialize)]
struct SubscriptionObject {
    customer: String,
    status: String,
    current_period_end: Option<i64>,
    #[serde(default)]
    items: SubscriptionItems,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SubscriptionItems {
    #[serde(default)]
    data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct SubscriptionItem {
    price: Price,
}

#[derive(Debug, Clone, Deserialize)]
struct Price {
    id: String,
}

/// What handling an event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied {
        customer_id: String,
        update: TeamBillingUpdate,
    },
    /// Delivered before; nothing changed
    Duplicate,
    /// Older than the change the team already holds
    Stale,
    /// Event type, price or customer not relevant to any team
    Ignored,
}

/// Verifies and applies Stripe webhook events
#[derive(Clone)]
pub struct WebhookHandler {
    config: StripeConfig,
    store: Arc<dyn BillingStore>,
}

impl WebhookHandler {
    pub fn new(config: StripeConfig, store: Arc<dyn BillingStore>) -> Self {
        Self { config, store }
    }

    /// Verify the `stripe-signature` header and parse the event
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<WebhookEvent> {
        self.verify_event_at(payload, signature, OffsetDateTime::now_utc())
    }

    pub fn verify_event_at(
        &self,
        payload: &str,
        signature: &str,
        now: OffsetDateTime,
    ) -> BillingResult<WebhookEvent> {
        verify_signature(
            payload,
            signature,
            &self.config.webhook_secret,
            now.unix_timestamp(),
        )?;
        serde_json::from_str(payload).map_err(|e| BillingError::WebhookPayload(e.to_string()))
    }

    pub async fn handle_event(&self, event: WebhookEvent) -> BillingResult<WebhookOutcome> {
        if !is_subscription_event(&event.type_) {
            tracing::debug!(event_type = %event.type_, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored);
        }

        if !self
            .store
            .record_webhook_event(&event.id, &event.type_)
            .await?
        {
            tracing::info!(event_id = %event.id, "Duplicate webhook event skipped");
            return Ok(WebhookOutcome::Duplicate);
        }

        match self.apply(&event).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Let the provider's retry reprocess the event
                if let Err(release_err) = self.store.release_webhook_event(&event.id).await {
                    tracing::error!(
                        event_id = %event.id,
                        error = %release_err,
                        "Failed to release webhook event"
                    );
                }
                Err(e)
            }
        }
    }

    async fn apply(&self, event: &WebhookEvent) -> BillingResult<WebhookOutcome> {
        let subscription: SubscriptionObject = serde_json::from_value(event.data.object.clone())
            .map_err(|e| BillingError::WebhookPayload(e.to_string()))?;
        let event_at = unix_time(event.created)?;

        let update = if event.type_ == "customer.subscription.deleted"
            || is_terminated(&subscription.status)
        {
            TeamBillingUpdate {
                plan_id: PlanId::Free,
                plan_expires_at: None,
                event_at,
            }
        } else {
            let Some(plan_id) = subscription
                .items
                .data
                .iter()
                .find_map(|item| self.config.plan_for_price_id(&item.price.id))
            else {
                tracing::warn!(
                    event_id = %event.id,
                    customer_id = %subscription.customer,
                    "Subscription carries no known price"
                );
                return Ok(WebhookOutcome::Ignored);
            };

            TeamBillingUpdate {
                plan_id,
                plan_expires_at: unix_time(subscription.current_period_end)?,
                event_at,
            }
        };

        match self
            .store
            .apply_team_billing(&subscription.customer, &update)
            .await?
        {
            BillingApply::Applied => {}
            BillingApply::Stale => {
                tracing::info!(
                    event_id = %event.id,
                    customer_id = %subscription.customer,
                    "Out-of-order subscription event skipped"
                );
                return Ok(WebhookOutcome::Stale);
            }
            BillingApply::UnknownCustomer => {
                tracing::warn!(
                    customer_id = %subscription.customer,
                    "No team found for billing customer"
                );
                return Ok(WebhookOutcome::Ignored);
            }
        }

        tracing::info!(
            event_id = %event.id,
            event_type = %event.type_,
            customer_id = %subscription.customer,
            plan = %update.plan_id,
            "Applied subscription change"
        );

        Ok(WebhookOutcome::Applied {
            customer_id: subscription.customer,
            update,
        })
    }
}

fn is_subscription_event(event_type: &str) -> bool {
    matches!(
        event_type,
        "customer.subscription.created"
            | "customer.subscription.updated"
            | "customer.subscription.deleted"
    )
}

fn unix_time(seconds: Option<i64>) -> BillingResult<Option<OffsetDateTime>> {
    seconds
        .map(OffsetDateTime::from_unix_timestamp)
        .transpose()
        .map_err(|e| BillingError::WebhookPayload(e.to_string()))
}

fn is_terminated(status: &str) -> bool {
    matches!(status, "canceled" | "unpaid" | "incomplete_expired")
}

/// Check a `t=<unix>,v1=<hex>[,v1=<hex>]` header against the payload
pub fn verify_signature(
    payload: &str,
    header: &str,
    secret: &str,
    now_unix: i64,
) -> BillingResult<()> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(BillingError::WebhookSignatureInvalid)?;
    let age = now_unix
        .checked_sub(timestamp)
        .map(i64::unsigned_abs)
        .ok_or(BillingError::WebhookSignatureInvalid)?;
    if age > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(BillingError::WebhookSignatureInvalid);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BillingError::Config(format!("Invalid webhook secret: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());

    let valid = signatures.iter().any(|signature| {
        hex::decode(signature)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if valid {
        Ok(())
    } else {
        Err(BillingError::WebhookSignatureInvalid)
    }
}
