//! Guard chain for authenticated endpoints.
//!
//! [`resolve_caller`] runs on every route and classifies the request as
//! [`Caller::Authenticated`] or [`Caller::Anonymous`] from its
//! `Authorization: Bearer <token>` header. [`require_auth`] sits in front of
//! protected routes, rejects anonymous callers with `401`, and hands the
//! [`AuthContext`] to handlers as an extension:
//!
//! ```rust,no_run
//! use axum::extract::Extension;
//! use blood_analyzer::auth::AuthContext;
//!
//! async fn protected_handler(Extension(ctx): Extension<AuthContext>) -> String {
//!     format!("Authenticated as user {}", ctx.user_id)
//! }
//! # let _ = protected_handler;
//! ```

use axum::{
    Json,
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use blood_analyzer::auth::AuthContext;

use super::{AppState, error::ErrorResponse};

/// Who is making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Authenticated(AuthContext),
    Anonymous,
}

impl Caller {
    pub fn context(&self) -> Option<&AuthContext> {
        match self {
            Caller::Authenticated(ctx) => Some(ctx),
            Caller::Anonymous => None,
        }
    }
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Verify the bearer token, if any, and record the [`Caller`].
///
/// A missing or unverifiable token is not an error here; the request simply
/// proceeds as anonymous.
pub async fn resolve_caller(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let caller = match bearer_token(&request) {
        Some(token) => match state.auth_manager.authenticate(token) {
            Ok(ctx) => Caller::Authenticated(ctx),
            Err(e) => {
                tracing::debug!(error = %e, "Bearer token rejected");
                Caller::Anonymous
            }
        },
        None => Caller::Anonymous,
    };

    request.extensions_mut().insert(caller);
    next.run(request).await
}

/// Reject anonymous callers and expose their [`AuthContext`] to handlers.
pub async fn require_auth(mut request: Request, next: Next) -> Response {
    let ctx = request
        .extensions()
        .get::<Caller>()
        .and_then(Caller::context)
        .cloned();

    match ctx {
        Some(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        None => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Authentication required".to_string(),
            }),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use uuid::Uuid;

    #[test]
    fn test_bearer_token_parsing() {
        let request = HttpRequest::builder()
            .header(AUTHORIZATION, "Bearer abc.def.ghi")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), Some("abc.def.ghi"));

        let basic = HttpRequest::builder()
            .header(AUTHORIZATION, "Basic dXNlcg==")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&basic), None);

        let empty = HttpRequest::builder()
            .header(AUTHORIZATION, "Bearer ")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&empty), None);
    }

    #[test]
    fn test_caller_context() {
        let ctx = AuthContext {
            user_id: Uuid::new_v4(),
            email: "a@x.com".to_string(),
        };
        assert_eq!(
            Caller::Authenticated(ctx.clone()).context(),
            Some(&ctx)
        );
        assert_eq!(Caller::Anonymous.context(), None);
    }
}
