//! Authentication error types.

use crate::db::StoreError;
use crate::email::EmailError;
use thiserror::Error;

/// Shared client message for every magic-link failure, so callers cannot tell
/// "never issued" from "already used" from "expired".
pub const MAGIC_LINK_UNAVAILABLE: &str = "Magic link is invalid or has expired";

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Credential store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// Token signing failed
    #[error("Token signing failed: {0}")]
    Signing(jsonwebtoken::errors::Error),

    /// Unknown username or wrong password
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Username already exists
    #[error("Username already exists")]
    UsernameTaken,

    /// Email already exists
    #[error("Email already exists")]
    EmailTaken,

    /// Invalid username format
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    /// Invalid email format
    #[error("Invalid email address")]
    InvalidEmail,

    /// Password too weak
    #[error("Password too weak: {0}")]
    WeakPassword(String),

    /// Malformed token or bad signature
    #[error("Invalid token")]
    TokenInvalid,

    /// Token past its expiry
    #[error("Token expired")]
    TokenExpired,

    /// Refresh token rejected (invalid, expired, rotated, or revoked)
    #[error("Invalid or expired refresh token")]
    Unauthorized,

    /// User not found
    #[error("User not found")]
    UserNotFound,

    /// Magic-link token absent or already consumed
    #[error("Magic link not found or already used")]
    MagicLinkNotFound,

    /// Magic-link token past its expiry
    #[error("Magic link expired")]
    MagicLinkExpired,

    /// Magic-link email could not be sent
    #[error("Failed to send magic link: {0}")]
    EmailDelivery(#[from] EmailError),
}

impl AuthError {
    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Store, hashing and signing errors are sanitized to prevent information
    /// disclosure about the internal system structure.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::Store(_) | AuthError::HashingFailed | AuthError::Signing(_) => {
                "Internal server error".to_string()
            }
            AuthError::EmailDelivery(_) => "Failed to process magic link request".to_string(),
            AuthError::MagicLinkNotFound | AuthError::MagicLinkExpired => {
                MAGIC_LINK_UNAVAILABLE.to_string()
            }
            // All other errors are safe to expose
            _ => self.to_string(),
        }
    }

    /// Whether the caller is at fault. Client errors are never retried and
    /// never logged as server failures.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            AuthError::Store(_)
                | AuthError::HashingFailed
                | AuthError::Signing(_)
                | AuthError::EmailDelivery(_)
        )
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
