//! Authentication and access gating

pub mod identity;
pub mod middleware;
pub mod session;

pub use identity::{CookieSessionResolver, IdentityResolver, SessionUser};
pub use middleware::{require_feature, require_session, FeatureGate};
pub use session::{Claims, SessionError, SessionManager};
