//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use creation_core::GenerationError;
use std::sync::Arc;
use tracing::{debug, error};

use crate::web::{response::rejected, state::AppState};
use creation_core::ports::PortError;

/// The cookie Clerk's frontend SDK keeps the session token in.
const SESSION_COOKIE: &str = "__session";

/// Finds the session token in the `Authorization: Bearer` header or, failing that,
/// in the session cookie.
fn session_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    bearer.or_else(|| {
        headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())?
            .split(';')
            .find_map(|c| c.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
            .filter(|t| !t.is_empty())
    })
}

/// Middleware that resolves the caller from the session token.
///
/// If valid, inserts the `CallerId` into request extensions for handlers to use.
/// If invalid or missing, answers 401 with the standard failure envelope.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    // 1. Extract the session token
    let Some(token) = session_token(req.headers()) else {
        debug!("Request without session token");
        return rejected(GenerationError::Unauthorized);
    };

    // 2. Resolve the caller with the identity provider
    let caller = match state.identity.resolve_session(token).await {
        Ok(caller) => caller,
        Err(PortError::Unauthorized) | Err(PortError::NotFound(_)) => {
            debug!("Session token rejected");
            return rejected(GenerationError::Unauthorized);
        }
        Err(e) => {
            error!("Failed to resolve session: {:?}", e);
            return rejected(GenerationError::EntitlementStore(e.to_string()));
        }
    };

    // 3. Insert the caller into request extensions
    req.extensions_mut().insert(caller);

    // 4. Continue to the handler
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("__session=xyz"));
        assert_eq!(session_token(&headers), Some("abc"));
    }

    #[test]
    fn cookie_is_used_when_no_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; __session=xyz; __session_other=1"),
        );
        assert_eq!(session_token(&headers), Some("xyz"));
    }

    #[test]
    fn missing_or_empty_tokens_are_none() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        headers.insert(header::COOKIE, HeaderValue::from_static("__session_x=1"));
        assert_eq!(session_token(&headers), None);
    }
}
