//! Request identity resolution

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use axum_extra::extract::cookie::CookieJar;
use scalehub_shared::UserId;

use super::session::SessionManager;
use crate::error::ApiResult;

/// Signed-in user attached to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub user_id: UserId,
    pub email: String,
}

/// Maps request headers to a signed-in user.
///
/// `Ok(None)` means anonymous; `Err` is reserved for backend failures.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> ApiResult<Option<SessionUser>>;
}

/// Reads the session cookie, falling back to an `Authorization: Bearer` token
#[derive(Clone)]
pub struct CookieSessionResolver {
    sessions: SessionManager,
    cookie_name: String,
}

impl CookieSessionResolver {
    pub fn new(sessions: SessionManager, cookie_name: impl Into<String>) -> Self {
        Self {
            sessions,
            cookie_name: cookie_name.into(),
        }
    }

    fn token<'a>(&self, jar: &'a CookieJar, headers: &'a HeaderMap) -> Option<&'a str> {
        jar.get(&self.cookie_name)
            .map(|cookie| cookie.value())
            .or_else(|| {
                headers
                    .get(AUTHORIZATION)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.strip_prefix("Bearer "))
            })
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

#[async_trait]
impl IdentityResolver for CookieSessionResolver {
    async fn resolve(&self, headers: &HeaderMap) -> ApiResult<Option<SessionUser>> {
        let jar = CookieJar::from_headers(headers);
        let Some(token) = self.token(&jar, headers) else {
            return Ok(None);
        };

        match self.sessions.validate(token) {
            Ok(claims) => Ok(Some(SessionUser {
                user_id: claims.user_id(),
                email: claims.email,
            })),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unusable session credential");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-session-secret-at-least-32-chars";

    fn resolver() -> (SessionManager, CookieSessionResolver) {
        let sessions = SessionManager::new(SECRET, 24);
        (
            sessions.clone(),
            CookieSessionResolver::new(sessions, "scalehub_session"),
        )
    }

    #[tokio::test]
    async fn test_cookie_session() {
        let (sessions, resolver) = resolver();
        let user = UserId::new();
        let token = sessions.issue(user, "reader@example.com").unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_str(&format!("theme=dark; scalehub_session={}", token)).unwrap(),
        );

        let identity = resolver.resolve(&headers).await.unwrap().unwrap();
        assert_eq!(identity.user_id, user);
    }

    #[tokio::test]
    async fn test_bearer_fallback() {
        let (sessions, resolver) = resolver();
        let user = UserId::new();
        let token = sessions.issue(user, "reader@example.com").unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );

        let identity = resolver.resolve(&headers).await.unwrap().unwrap();
        assert_eq!(identity.user_id, user);
    }

    #[tokio::test]
    async fn test_missing_or_invalid_credential_is_anonymous() {
        let (_, resolver) = resolver();
        assert_eq!(resolver.resolve(&HeaderMap::new()).await.unwrap(), None);

        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("scalehub_session=forged"));
        assert_eq!(resolver.resolve(&headers).await.unwrap(), None);
    }
}
