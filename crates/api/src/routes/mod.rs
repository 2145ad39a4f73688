//! API routes

pub mod access;
pub mod billing;
pub mod health;
pub mod scales;
pub mod status;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use scalehub_billing::GuardOptions;
use scalehub_shared::Feature;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{
    auth::{require_feature, require_session},
    state::AppState,
};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Stripe webhook (public, uses signature verification)
    let mut public_api_routes = Router::new();
    if state.billing.is_some() {
        public_api_routes = public_api_routes.route("/billing/webhook", post(billing::webhook));
    }

    // Session required
    let mut protected_api_routes = Router::new()
        .route("/access/check", post(access::check_access))
        .route("/subscription/status", get(status::subscription_status));
    if state.billing.is_some() {
        protected_api_routes = protected_api_routes
            .route("/billing/portal", post(billing::create_portal_session));
    }
    let protected_api_routes = protected_api_routes.route_layer(middleware::from_fn_with_state(
        state.clone(),
        require_session,
    ));

    // Feature-gated scale routes
    let gated_api_routes = Router::new()
        .route(
            "/scales/search",
            get(scales::search).route_layer(middleware::from_fn_with_state(
                state.feature_gate(GuardOptions::reserved(Feature::Search)),
                require_feature,
            )),
        )
        .route(
            "/scales/export",
            get(scales::export).route_layer(middleware::from_fn_with_state(
                state.feature_gate(GuardOptions::check_only(Feature::DataExport)),
                require_feature,
            )),
        )
        .route(
            "/scales/:slug",
            get(scales::get_scale).route_layer(middleware::from_fn_with_state(
                state.feature_gate(GuardOptions::reserved(Feature::ScaleView)),
                require_feature,
            )),
        );

    let api_routes = public_api_routes
        .merge(protected_api_routes)
        .merge(gated_api_routes);

    let mut router = Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    if let Some(cors) = cors_layer(&state.config.cors_allowed_origins) {
        router = router.layer(cors);
    }

    router
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true),
    )
}
