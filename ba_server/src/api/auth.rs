//! Authentication API handlers.
//!
//! Every login method answers with the same session body:
//!
//! ```json
//! {
//!   "access_token": "eyJhbGciOiJIUzI1NiIs...",
//!   "refresh_token": "eyJhbGciOiJIUzI1NiIs...",
//!   "expires_in": 900,
//!   "user": { "id": "5f0c...", "email": "analyst@example.com", "display_name": null }
//! }
//! ```
//!
//! # Examples
//!
//! Request a magic link:
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/auth/magic-link/request \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "analyst@example.com"}'
//! ```
//!
//! Refresh a session:
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/auth/refresh \
//!   -H "Content-Type: application/json" \
//!   -d '{"refresh_token": "eyJhbGciOiJIUzI1NiIs..."}'
//! ```

use axum::{
    Json,
    extract::{Extension, Query, State},
    http::StatusCode,
};
use blood_analyzer::auth::{AuthContext, AuthError, AuthSession, UserView};
use serde::{Deserialize, Serialize};

use super::{AppState, error::ApiError, request_id::RequestId};
use crate::{logging::log_security_event, metrics};

#[derive(Debug, Deserialize)]
pub struct MagicLinkRequestPayload {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ConsumeQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshPayload {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct CredentialsPayload {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Email a single-use login link.
///
/// Returns `201 Created` with `{"success": true}`. Any previous link for the
/// same address stops working.
///
/// # Errors
///
/// - `400 Bad Request`: Malformed email address
/// - `502 Bad Gateway`: The email could not be sent
pub async fn request_magic_link(
    State(state): State<AppState>,
    Json(payload): Json<MagicLinkRequestPayload>,
) -> Result<(StatusCode, Json<SuccessResponse>), ApiError> {
    state.auth_manager.request_magic_link(&payload.email).await?;
    metrics::magic_links_issued_total();

    Ok((StatusCode::CREATED, Json(SuccessResponse { success: true })))
}

/// Exchange a magic-link token (`?token=`) for a session.
///
/// # Errors
///
/// - `404 Not Found`: Unknown, used, superseded or expired link. All four
///   cases return the same body.
pub async fn consume_magic_link(
    State(state): State<AppState>,
    request_id: RequestId,
    Query(query): Query<ConsumeQuery>,
) -> Result<Json<AuthSession>, ApiError> {
    let token = query.token.unwrap_or_default();

    match state.auth_manager.consume_magic_link(&token).await {
        Ok(session) => {
            metrics::login_attempts_total("magic_link", "success");
            metrics::sessions_issued_total("magic_link");
            Ok(Json(session))
        }
        Err(e) => {
            metrics::login_attempts_total("magic_link", "failure");
            if matches!(e, AuthError::MagicLinkExpired) {
                log_security_event(
                    "magic_link_expired",
                    None,
                    Some(request_id.as_str()),
                    "Expired magic link presented",
                );
            }
            Err(e.into())
        }
    }
}

/// Rotate a session: the presented refresh token is spent and a new pair issued.
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid, expired, already rotated or revoked token
pub async fn refresh(
    State(state): State<AppState>,
    request_id: RequestId,
    Json(payload): Json<RefreshPayload>,
) -> Result<Json<AuthSession>, ApiError> {
    match state.auth_manager.refresh_session(&payload.refresh_token).await {
        Ok(session) => {
            metrics::sessions_issued_total("refresh");
            Ok(Json(session))
        }
        Err(e) => {
            if matches!(e, AuthError::Unauthorized) {
                metrics::refresh_rejections_total();
                log_security_event(
                    "refresh_rejected",
                    None,
                    Some(request_id.as_str()),
                    "Refresh token rejected",
                );
            }
            Err(e.into())
        }
    }
}

/// Revoke the caller's refresh token. Access tokens stay valid until expiry.
///
/// Returns `204 No Content`.
pub async fn logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<StatusCode, ApiError> {
    state.auth_manager.logout(ctx.user_id).await?;
    tracing::info!(user_id = %ctx.user_id, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}

/// The authenticated caller's public profile.
pub async fn me(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<UserView>, ApiError> {
    let user = state
        .auth_manager
        .current_user(ctx.user_id)
        .await
        .map_err(|e| match e {
            // Token outlived its user
            AuthError::UserNotFound => AuthError::TokenInvalid,
            other => other,
        })?;
    Ok(Json(user))
}

/// Register a password account and log it in.
///
/// Returns `201 Created` with a session.
///
/// # Errors
///
/// - `400 Bad Request`: Invalid username or weak password
/// - `409 Conflict`: Username already taken
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsPayload>,
) -> Result<(StatusCode, Json<AuthSession>), ApiError> {
    let session = state
        .auth_manager
        .register_with_password(&payload.username, &payload.password)
        .await?;
    metrics::sessions_issued_total("password");

    Ok((StatusCode::CREATED, Json(session)))
}

/// Log in with username and password.
///
/// # Errors
///
/// - `401 Unauthorized`: Unknown username or wrong password (same body for both)
pub async fn login(
    State(state): State<AppState>,
    request_id: RequestId,
    Json(payload): Json<CredentialsPayload>,
) -> Result<Json<AuthSession>, ApiError> {
    match state
        .auth_manager
        .login_with_password(&payload.username, &payload.password)
        .await
    {
        Ok(session) => {
            metrics::login_attempts_total("password", "success");
            metrics::sessions_issued_total("password");
            Ok(Json(session))
        }
        Err(e) => {
            metrics::login_attempts_total("password", "failure");
            if matches!(e, AuthError::InvalidCredentials) {
                log_security_event(
                    "failed_login",
                    None,
                    Some(request_id.as_str()),
                    "Invalid password attempt",
                );
            }
            Err(e.into())
        }
    }
}
