//! Session lifecycle: issue, refresh, logout.
//!
//! A user holds at most one live refresh token. Its SHA-256 fingerprint is
//! stored on the user row; issuing a session overwrites it, refreshing swaps
//! it with a compare-and-set, and logout clears it. Access tokens are not
//! tracked and stay valid until they expire.

use std::sync::Arc;

use subtle::ConstantTimeEq;

use super::{
    codec::{TokenCodec, fingerprint},
    errors::{AuthError, AuthResult},
    identity::IdentityResolver,
    models::{AuthContext, AuthSession, OAuthProfile, User, UserId},
};
use crate::db::CredentialStore;

/// Issues and rotates sessions for resolved users
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    codec: TokenCodec,
    identities: Arc<IdentityResolver>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        codec: TokenCodec,
        identities: Arc<IdentityResolver>,
    ) -> Self {
        Self {
            store,
            codec,
            identities,
        }
    }

    /// Mint a new pair and return it with the fingerprint to store.
    fn mint(&self, user: &User) -> AuthResult<(AuthSession, String)> {
        let tokens = self.codec.issue_pair(user)?;
        let hash = fingerprint(&tokens.refresh_token);
        Ok((
            AuthSession {
                tokens,
                user: user.view(),
            },
            hash,
        ))
    }

    /// Issue a fresh session, replacing whatever refresh token the user had.
    ///
    /// # Errors
    ///
    /// * `AuthError::UserNotFound` - The user row no longer exists
    pub async fn issue_session(&self, user: &User) -> AuthResult<AuthSession> {
        let (session, hash) = self.mint(user)?;

        if !self.store.set_refresh_token_hash(user.id, Some(&hash)).await? {
            return Err(AuthError::UserNotFound);
        }

        log::debug!("Issued session for user {}", user.id);
        Ok(session)
    }

    /// Resolve a provider profile and log the user in.
    pub async fn handle_oauth_login(&self, profile: &OAuthProfile) -> AuthResult<AuthSession> {
        let identity = self.identities.resolve_oauth_identity(profile).await?;
        log::info!(
            "Login via {} for user {}",
            identity.method,
            identity.user.id
        );
        self.issue_session(&identity.user).await
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// The presented token must verify and must match the fingerprint on
    /// record. The swap to the new fingerprint is conditional on the old one
    /// still being current, so of two concurrent refreshes with the same
    /// token exactly one wins.
    ///
    /// # Errors
    ///
    /// * `AuthError::Unauthorized` - Token invalid, expired, superseded,
    ///   revoked, or its user is gone
    /// * `AuthError::Store` - Credential store failure
    pub async fn refresh(&self, presented: &str) -> AuthResult<AuthSession> {
        let claims = self.codec.verify_refresh_token(presented).map_err(|e| {
            log::warn!("Refresh rejected: {}", e);
            AuthError::Unauthorized
        })?;

        let user = self
            .store
            .find_user_by_id(claims.sub)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        let Some(stored) = user.refresh_token_hash.as_deref() else {
            log::warn!("Refresh for user {} with no active session", user.id);
            return Err(AuthError::Unauthorized);
        };

        let presented_hash = fingerprint(presented);
        if !bool::from(presented_hash.as_bytes().ct_eq(stored.as_bytes())) {
            log::warn!("Stale refresh token presented for user {}", user.id);
            return Err(AuthError::Unauthorized);
        }

        let (session, new_hash) = self.mint(&user)?;
        if !self
            .store
            .rotate_refresh_token_hash(user.id, &presented_hash, &new_hash)
            .await?
        {
            log::warn!("Lost refresh race for user {}", user.id);
            return Err(AuthError::Unauthorized);
        }

        Ok(session)
    }

    /// Revoke the user's refresh token. Succeeds whether or not one existed.
    pub async fn logout(&self, user_id: UserId) -> AuthResult<()> {
        self.store.set_refresh_token_hash(user_id, None).await?;
        log::debug!("Cleared session for user {}", user_id);
        Ok(())
    }

    /// Verify an access token and return the caller it names.
    pub fn authenticate(&self, access_token: &str) -> AuthResult<AuthContext> {
        let claims = self.codec.verify_access_token(access_token)?;
        Ok(AuthContext {
            user_id: claims.sub,
            email: claims.email,
        })
    }
}
