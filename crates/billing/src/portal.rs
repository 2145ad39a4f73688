//! Stripe Billing Portal

use scalehub_shared::TeamId;
use stripe::{BillingPortalSession, CreateBillingPortalSession, CustomerId};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::subscription::Subscription;

/// Portal service for Stripe billing portal sessions
#[derive(Clone)]
pub struct PortalService {
    stripe: StripeClient,
}

impl PortalService {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }

    /// Create a portal session for the team behind a resolved subscription
    pub async fn create_for_subscription(
        &self,
        subscription: &Subscription,
    ) -> BillingResult<BillingPortalSession> {
        let (team_id, customer_id) = subscription
            .team_id
            .zip(subscription.billing_customer_id.as_deref())
            .ok_or(BillingError::NoCustomer)?;
        self.create_portal_session(team_id, customer_id).await
    }

    /// Create a billing portal session for a customer
    pub async fn create_portal_session(
        &self,
        team_id: TeamId,
        customer_id: &str,
    ) -> BillingResult<BillingPortalSession> {
        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::InvalidInput(format!("Invalid customer ID: {}", e)))?;

        let return_url = format!("{}/account/billing", self.stripe.config().app_base_url);

        let mut params = CreateBillingPortalSession::new(customer_id);
        params.return_url = Some(&return_url);

        let session = BillingPortalSession::create(self.stripe.inner(), params).await?;

        tracing::info!(
            team_id = %team_id,
            customer_id = %session.customer,
            "Created billing portal session"
        );

        Ok(session)
    }
}

/// Response for creating a portal session
#[derive(Debug, serde::Serialize)]
pub struct PortalResponse {
    pub url: String,
}

impl From<BillingPortalSession> for PortalResponse {
    fn from(session: BillingPortalSession) -> Self {
        Self { url: session.url }
    }
}
