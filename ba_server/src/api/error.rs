//! Mapping of authentication errors onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use blood_analyzer::auth::AuthError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error returned by every auth handler.
#[derive(Debug)]
pub struct ApiError(pub AuthError);

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AuthError::InvalidCredentials
            | AuthError::TokenInvalid
            | AuthError::TokenExpired
            | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::UsernameTaken | AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::InvalidUsername(_) | AuthError::WeakPassword(_) | AuthError::InvalidEmail => {
                StatusCode::BAD_REQUEST
            }
            AuthError::MagicLinkNotFound | AuthError::MagicLinkExpired | AuthError::UserNotFound => {
                StatusCode::NOT_FOUND
            }
            AuthError::EmailDelivery(_) => StatusCode::BAD_GATEWAY,
            AuthError::Store(_) | AuthError::HashingFailed | AuthError::Signing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if !self.0.is_client_error() {
            tracing::error!(status = %status, error = %self.0, "Auth request failed");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.0.client_message(),
            }),
        )
            .into_response()
    }
}
