//! Shared application state

use std::sync::Arc;

use scalehub_billing::{
    AccessGuard, BillingService, BillingStore, EntitlementService, GuardOptions, UsageStore,
};

use crate::auth::{CookieSessionResolver, FeatureGate, IdentityResolver, SessionManager};
use crate::catalog::ScaleDirectory;
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: SessionManager,
    pub identity: Arc<dyn IdentityResolver>,
    pub store: Arc<dyn BillingStore>,
    pub entitlements: EntitlementService,
    pub scales: Arc<dyn ScaleDirectory>,
    /// Stripe services; `None` when billing is disabled
    pub billing: Option<BillingService>,
}

impl AppState {
    /// Wire state over one store implementing both billing traits
    pub fn new<S>(
        config: Config,
        store: Arc<S>,
        scales: Arc<dyn ScaleDirectory>,
        billing: Option<BillingService>,
    ) -> Self
    where
        S: BillingStore + UsageStore + 'static,
    {
        let sessions = SessionManager::new(&config.session_secret, config.session_expiry_hours);
        let identity = Arc::new(CookieSessionResolver::new(
            sessions.clone(),
            config.session_cookie_name.clone(),
        ));

        Self {
            config: Arc::new(config),
            sessions,
            identity,
            entitlements: scalehub_billing::entitlements(store.clone()),
            store,
            scales,
            billing,
        }
    }

    /// Gate state for a route guarded with `options`
    pub fn feature_gate(&self, options: GuardOptions) -> FeatureGate {
        FeatureGate::new(
            AccessGuard::new(self.entitlements.clone(), options),
            self.identity.clone(),
        )
    }
}
