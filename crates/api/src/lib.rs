//! ScaleHub API Library
//!
//! HTTP surface of the ScaleHub access core: session resolution, feature
//! gates and the subscription endpoints.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
