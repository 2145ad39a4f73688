//! ScaleHub subscription and feature access
//!
//! Plan catalog, subscription resolution, usage metering and the feature
//! access evaluator, plus the Stripe side that keeps team plans current.

pub mod client;
pub mod entitlement;
pub mod error;
pub mod guard;
pub mod plans;
pub mod portal;
pub mod store;
pub mod subscription;
pub mod usage;
pub mod webhooks;

use std::sync::Arc;

pub use client::{PriceIds, StripeClient, StripeConfig};
pub use entitlement::{AccessDecision, DenialReason, EntitlementService, EntitlementStatus};
pub use error::{BillingError, BillingResult};
pub use guard::{AccessGuard, GuardOptions, GuardRejection, IncrementTiming};
pub use plans::{Plan, PlanLimits};
pub use portal::{PortalResponse, PortalService};
pub use store::{BillingApply, BillingStore, InMemoryStore, PgStore, UsageStore};
pub use subscription::{Subscription, SubscriptionResolver};
pub use usage::{QuotaCheck, UsageMeter, UsagePeriod, UsageSnapshot};
pub use webhooks::{WebhookEvent, WebhookHandler, WebhookOutcome};

/// Stripe-backed services, present only when billing is enabled
#[derive(Clone)]
pub struct BillingService {
    pub portal: PortalService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    pub fn new(stripe: StripeClient, store: Arc<dyn BillingStore>) -> Self {
        let webhooks = WebhookHandler::new(stripe.config().clone(), store);
        Self {
            portal: PortalService::new(stripe),
            webhooks,
        }
    }

    pub fn from_env(store: Arc<dyn BillingStore>) -> BillingResult<Self> {
        Ok(Self::new(StripeClient::from_env()?, store))
    }
}

/// Wire the access components over a single store
pub fn entitlements<S>(store: Arc<S>) -> EntitlementService
where
    S: BillingStore + UsageStore + 'static,
{
    EntitlementService::new(
        SubscriptionResolver::new(store.clone()),
        UsageMeter::new(store),
    )
}
