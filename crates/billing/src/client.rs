//! Stripe client configuration

use scalehub_shared::PlanId;
use stripe::Client;

use crate::error::{BillingError, BillingResult};

/// Configuration for Stripe billing
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key
    pub secret_key: String,
    /// Stripe webhook signing secret
    pub webhook_secret: String,
    /// Price IDs for each paid plan
    pub price_ids: PriceIds,
    /// Base URL for portal return redirects
    pub app_base_url: String,
}

/// Stripe price IDs for paid plans. Free has no price.
#[derive(Debug, Clone)]
pub struct PriceIds {
    pub starter: String,
    pub enterprise: String,
}

impl StripeConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: required_env("STRIPE_SECRET_KEY")?,
            webhook_secret: required_env("STRIPE_WEBHOOK_SECRET")?,
            price_ids: PriceIds {
                starter: required_env("STRIPE_PRICE_STARTER")?,
                enterprise: required_env("STRIPE_PRICE_ENTERPRISE")?,
            },
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        })
    }

    /// Get price ID for a paid plan
    pub fn price_id_for_plan(&self, plan: PlanId) -> Option<&str> {
        match plan {
            PlanId::Free => None,
            PlanId::Starter => Some(&self.price_ids.starter),
            PlanId::Enterprise => Some(&self.price_ids.enterprise),
        }
    }

    /// Get plan from price ID
    pub fn plan_for_price_id(&self, price_id: &str) -> Option<PlanId> {
        if price_id == self.price_ids.starter {
            Some(PlanId::Starter)
        } else if price_id == self.price_ids.enterprise {
            Some(PlanId::Enterprise)
        } else {
            None
        }
    }
}

fn required_env(name: &str) -> BillingResult<String> {
    std::env::var(name).map_err(|_| BillingError::Config(format!("{} not set", name)))
}

/// Stripe billing client
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::new(&config.secret_key);
        Self { client, config }
    }

    pub fn from_env() -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StripeConfig {
        StripeConfig {
            secret_key: "sk_test_123".to_string(),
            webhook_secret: "whsec_test".to_string(),
            price_ids: PriceIds {
                starter: "price_starter".to_string(),
                enterprise: "price_enterprise".to_string(),
            },
            app_base_url: "http://localhost:3000".to_string(),
        }
    }

    #[test]
    fn test_price_mapping() {
        let config = config();
        assert_eq!(config.plan_for_price_id("price_starter"), Some(PlanId::Starter));
        assert_eq!(config.plan_for_price_id("price_enterprise"), Some(PlanId::Enterprise));
        assert_eq!(config.plan_for_price_id("price_unknown"), None);
        assert_eq!(config.price_id_for_plan(PlanId::Free), None);
        assert_eq!(config.price_id_for_plan(PlanId::Starter), Some("price_starter"));
    }
}
