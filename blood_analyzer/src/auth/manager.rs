//! Authentication facade.

use std::sync::Arc;

use super::{
    codec::TokenCodec,
    config::AuthConfig,
    errors::{AuthError, AuthResult},
    identity::IdentityResolver,
    magic_link::MagicLinkIssuer,
    models::{AuthContext, AuthSession, OAuthProfile, ResolvedIdentity, UserId, UserView},
    session::SessionManager,
};
use crate::db::CredentialStore;
use crate::email::EmailTransport;

/// Single entry point for every login method and session operation.
///
/// Cheap to clone; all clones share the same components.
#[derive(Clone)]
pub struct AuthManager {
    store: Arc<dyn CredentialStore>,
    identities: Arc<IdentityResolver>,
    sessions: Arc<SessionManager>,
    magic_links: Arc<MagicLinkIssuer>,
}

impl AuthManager {
    /// Create a new authentication manager
    ///
    /// # Arguments
    ///
    /// * `store` - Credential store shared by every component
    /// * `mailer` - Transport for magic-link emails
    /// * `config` - Secrets, lifetimes and link settings
    pub fn new(
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn EmailTransport>,
        config: &AuthConfig,
    ) -> Self {
        let identities = Arc::new(IdentityResolver::new(
            store.clone(),
            config.password_pepper.clone(),
        ));
        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            TokenCodec::new(config),
            identities.clone(),
        ));
        let magic_links = Arc::new(MagicLinkIssuer::new(
            store.clone(),
            mailer,
            sessions.clone(),
            config,
        ));

        Self {
            store,
            identities,
            sessions,
            magic_links,
        }
    }

    async fn start_session(&self, identity: ResolvedIdentity) -> AuthResult<AuthSession> {
        log::info!(
            "Login via {} for user {}",
            identity.method,
            identity.user.id
        );
        self.sessions.issue_session(&identity.user).await
    }

    /// Email a magic link to `email`.
    pub async fn request_magic_link(&self, email: &str) -> AuthResult<()> {
        self.magic_links.request(email).await
    }

    /// Exchange a magic-link token for a session.
    pub async fn consume_magic_link(&self, token: &str) -> AuthResult<AuthSession> {
        self.magic_links.consume(token).await
    }

    /// Log in with a provider profile the caller has already verified.
    pub async fn handle_oauth_login(&self, profile: &OAuthProfile) -> AuthResult<AuthSession> {
        self.sessions.handle_oauth_login(profile).await
    }

    /// Rotate a session's tokens.
    pub async fn refresh_session(&self, refresh_token: &str) -> AuthResult<AuthSession> {
        self.sessions.refresh(refresh_token).await
    }

    /// Revoke the user's refresh token.
    pub async fn logout(&self, user_id: UserId) -> AuthResult<()> {
        self.sessions.logout(user_id).await
    }

    /// Register a password account and log it in
    ///
    /// # Errors
    ///
    /// * `AuthError::UsernameTaken` - Username already exists
    /// * `AuthError::InvalidUsername` - Username format invalid
    /// * `AuthError::WeakPassword` - Password too weak
    pub async fn register_with_password(
        &self,
        username: &str,
        password: &str,
    ) -> AuthResult<AuthSession> {
        let identity = self
            .identities
            .create_password_user(username, password)
            .await?;
        self.start_session(identity).await
    }

    /// Log in with username and password
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidCredentials` - Unknown user or wrong password
    pub async fn login_with_password(
        &self,
        username: &str,
        password: &str,
    ) -> AuthResult<AuthSession> {
        let identity = self
            .identities
            .resolve_password_identity(username, password)
            .await?;
        self.start_session(identity).await
    }

    /// Verify an access token
    pub fn authenticate(&self, access_token: &str) -> AuthResult<AuthContext> {
        self.sessions.authenticate(access_token)
    }

    /// Public view of a user.
    pub async fn current_user(&self, user_id: UserId) -> AuthResult<UserView> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .map(|user| user.view())
            .ok_or(AuthError::UserNotFound)
    }

    /// Delete magic links that have expired.
    pub async fn purge_expired_magic_links(&self) -> AuthResult<u64> {
        self.magic_links.purge_expired().await
    }

    /// Check the credential store is reachable.
    pub async fn health_check(&self) -> AuthResult<()> {
        Ok(self.store.health_check().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::{LoginMethod, OAuthProvider};
    use crate::db::InMemoryCredentialStore;
    use crate::email::LogTransport;

    fn manager() -> AuthManager {
        let mut config = AuthConfig::new(
            "access-secret-that-is-long-enough-for-hmac",
            "refresh-secret-that-is-long-enough-for-hmac",
        );
        config.password_pepper = "pepper-for-tests".to_string();
        AuthManager::new(
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(LogTransport),
            &config,
        )
    }

    #[tokio::test]
    async fn test_register_login_and_me() {
        let auth = manager();

        let registered = auth
            .register_with_password("alice", "Password123")
            .await
            .unwrap();
        let login = auth
            .login_with_password("alice", "Password123")
            .await
            .unwrap();
        assert_eq!(registered.user.id, login.user.id);

        let ctx = auth.authenticate(&login.tokens.access_token).unwrap();
        let me = auth.current_user(ctx.user_id).await.unwrap();
        assert_eq!(me.email, "alice");
    }

    #[tokio::test]
    async fn test_login_supersedes_registration_session() {
        let auth = manager();
        let registered = auth
            .register_with_password("alice", "Password123")
            .await
            .unwrap();
        auth.login_with_password("alice", "Password123")
            .await
            .unwrap();

        assert!(matches!(
            auth.refresh_session(&registered.tokens.refresh_token).await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_oauth_and_magic_link_share_account() {
        let auth = manager();
        let oauth = auth
            .handle_oauth_login(&OAuthProfile {
                provider: OAuthProvider::Facebook,
                provider_id: "fb-1".to_string(),
                email: "pat@x.com".to_string(),
                first_name: Some("Pat".to_string()),
                last_name: None,
                picture: None,
            })
            .await
            .unwrap();
        assert_eq!(oauth.user.display_name.as_deref(), Some("Pat"));

        let identity = auth
            .identities
            .resolve_or_create_by_email("pat@x.com")
            .await
            .unwrap();
        assert_eq!(identity.user.id, oauth.user.id);
        assert_eq!(
            identity.user.provider,
            Some(LoginMethod::OAuth(OAuthProvider::Facebook))
        );
    }

    #[tokio::test]
    async fn test_current_user_unknown() {
        let auth = manager();
        assert!(matches!(
            auth.current_user(uuid::Uuid::new_v4()).await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_health_check_in_memory() {
        assert!(manager().health_check().await.is_ok());
    }
}
