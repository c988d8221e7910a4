//! Passwordless login through single-use emailed links.
//!
//! Per email the token moves `NONE -> ISSUED -> CONSUMED | EXPIRED`, and at
//! most one token is ISSUED at a time. Replacement and redemption are single
//! store operations, so concurrent requests and consumes stay consistent.

use std::sync::Arc;

use chrono::Utc;

use super::{
    config::{AuthConfig, MAGIC_LINK_CONSUME_PATH},
    errors::{AuthError, AuthResult},
    identity::normalize_email,
    models::{AuthSession, MagicLinkRedemption, NewMagicLinkToken},
    session::SessionManager,
};
use crate::db::CredentialStore;
use crate::email::{EmailTransport, MagicLinkEmail};

/// Random token value: 256 bits, hex encoded.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// Issues magic links and exchanges them for sessions
pub struct MagicLinkIssuer {
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn EmailTransport>,
    sessions: Arc<SessionManager>,
    ttl_secs: i64,
    backend_url: String,
    email_from: String,
}

impl MagicLinkIssuer {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn EmailTransport>,
        sessions: Arc<SessionManager>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            store,
            mailer,
            sessions,
            ttl_secs: config.magic_link_ttl_secs,
            backend_url: config.backend_url.trim_end_matches('/').to_string(),
            email_from: config.email_from.clone(),
        }
    }

    fn consume_link(&self, token: &str) -> String {
        format!("{}{}?token={}", self.backend_url, MAGIC_LINK_CONSUME_PATH, token)
    }

    /// Issue a link for `email`, superseding any outstanding one, and send it.
    ///
    /// If the email cannot be sent the new token is deleted again, so a
    /// failed request leaves no usable token behind.
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidEmail` - Address is malformed
    /// * `AuthError::EmailDelivery` - Transport failed
    pub async fn request(&self, email: &str) -> AuthResult<()> {
        let email = normalize_email(email)?;
        let expires_at = Utc::now().timestamp() + self.ttl_secs;

        let issued = self
            .store
            .replace_magic_link_token(NewMagicLinkToken {
                token: generate_token(),
                email: email.clone(),
                expires_at,
            })
            .await?;

        let message = MagicLinkEmail {
            to: email.clone(),
            from: self.email_from.clone(),
            link: self.consume_link(&issued.token),
            expires_in_secs: self.ttl_secs,
        };

        if let Err(e) = self.mailer.send_magic_link(&message).await {
            log::error!("Magic link email to {} failed: {}", email, e);
            if let Err(cleanup) = self.store.delete_magic_link_token(issued.id).await {
                log::error!("Failed to delete unsent magic link {}: {}", issued.id, cleanup);
            }
            return Err(e.into());
        }

        log::info!("Issued magic link for {}", email);
        Ok(())
    }

    /// Redeem a token and log its owner in.
    ///
    /// # Errors
    ///
    /// * `AuthError::MagicLinkNotFound` - Never issued, already used, or superseded
    /// * `AuthError::MagicLinkExpired` - Past its expiry; the token is gone afterwards
    pub async fn consume(&self, token: &str) -> AuthResult<AuthSession> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MagicLinkNotFound);
        }

        let now = Utc::now().timestamp();
        match self.store.redeem_magic_link_token(token, now).await? {
            MagicLinkRedemption::NotFound => Err(AuthError::MagicLinkNotFound),
            MagicLinkRedemption::Expired => {
                log::warn!("Expired magic link presented");
                Err(AuthError::MagicLinkExpired)
            }
            MagicLinkRedemption::Redeemed(user) => {
                log::info!("Login via magic_link for user {}", user.id);
                self.sessions.issue_session(&user).await
            }
        }
    }

    /// Drop tokens that can no longer be redeemed. Returns how many went.
    pub async fn purge_expired(&self) -> AuthResult<u64> {
        let purged = self
            .store
            .purge_expired_magic_links(Utc::now().timestamp())
            .await?;
        if purged > 0 {
            log::debug!("Purged {} expired magic links", purged);
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{codec::TokenCodec, identity::IdentityResolver, models::LoginMethod};
    use crate::db::InMemoryCredentialStore;
    use crate::email::EmailError;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<MagicLinkEmail>>,
        fail: bool,
    }

    impl RecordingTransport {
        async fn last_token(&self) -> String {
            let sent = self.sent.lock().await;
            let link = &sent.last().unwrap().link;
            link.split("token=").nth(1).unwrap().to_string()
        }
    }

    #[async_trait]
    impl EmailTransport for RecordingTransport {
        async fn send_magic_link(&self, message: &MagicLinkEmail) -> Result<(), EmailError> {
            if self.fail {
                return Err(EmailError::Delivery("smtp down".to_string()));
            }
            self.sent.lock().await.push(message.clone());
            Ok(())
        }
    }

    fn issuer_with(
        transport: Arc<RecordingTransport>,
        ttl_secs: i64,
    ) -> (MagicLinkIssuer, Arc<InMemoryCredentialStore>) {
        let store = Arc::new(InMemoryCredentialStore::new());
        let mut config = AuthConfig::new(
            "access-secret-that-is-long-enough-for-hmac",
            "refresh-secret-that-is-long-enough-for-hmac",
        );
        config.magic_link_ttl_secs = ttl_secs;
        config.backend_url = "https://labs.example.com/".to_string();

        let identities = Arc::new(IdentityResolver::new(store.clone(), String::new()));
        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            TokenCodec::new(&config),
            identities,
        ));
        (
            MagicLinkIssuer::new(store.clone(), transport, sessions, &config),
            store,
        )
    }

    #[tokio::test]
    async fn test_request_then_consume() {
        let transport = Arc::new(RecordingTransport::default());
        let (issuer, store) = issuer_with(transport.clone(), 900);

        issuer.request(" New@X.com ").await.unwrap();
        {
            let sent = transport.sent.lock().await;
            assert_eq!(sent[0].to, "new@x.com");
            assert!(
                sent[0]
                    .link
                    .starts_with("https://labs.example.com/api/v1/auth/magic-link/consume?token=")
            );
        }

        let token = transport.last_token().await;
        let session = issuer.consume(&token).await.unwrap();
        assert_eq!(session.user.email, "new@x.com");

        let user = store.find_user_by_email("new@x.com").await.unwrap().unwrap();
        assert_eq!(user.provider, Some(LoginMethod::MagicLink));
        assert_eq!(store.magic_link_count().await, 0);
    }

    #[tokio::test]
    async fn test_token_is_single_use() {
        let transport = Arc::new(RecordingTransport::default());
        let (issuer, _) = issuer_with(transport.clone(), 900);

        issuer.request("a@x.com").await.unwrap();
        let token = transport.last_token().await;

        assert!(issuer.consume(&token).await.is_ok());
        assert!(matches!(
            issuer.consume(&token).await,
            Err(AuthError::MagicLinkNotFound)
        ));
    }

    #[tokio::test]
    async fn test_second_request_supersedes_first() {
        let transport = Arc::new(RecordingTransport::default());
        let (issuer, store) = issuer_with(transport.clone(), 900);

        issuer.request("a@x.com").await.unwrap();
        let first = transport.last_token().await;
        issuer.request("a@x.com").await.unwrap();
        let second = transport.last_token().await;

        assert_ne!(first, second);
        assert_eq!(store.magic_link_count().await, 1);
        assert!(matches!(
            issuer.consume(&first).await,
            Err(AuthError::MagicLinkNotFound)
        ));
        assert!(issuer.consume(&second).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected_and_removed() {
        let transport = Arc::new(RecordingTransport::default());
        let (issuer, store) = issuer_with(transport.clone(), -10);

        issuer.request("a@x.com").await.unwrap();
        let token = transport.last_token().await;

        assert!(matches!(
            issuer.consume(&token).await,
            Err(AuthError::MagicLinkExpired)
        ));
        assert_eq!(store.magic_link_count().await, 0);
        assert!(matches!(
            issuer.consume(&token).await,
            Err(AuthError::MagicLinkNotFound)
        ));
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_send_failure_leaves_no_token() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let (issuer, store) = issuer_with(transport, 900);

        let err = issuer.request("a@x.com").await.unwrap_err();
        assert!(matches!(err, AuthError::EmailDelivery(_)));
        assert_eq!(store.magic_link_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_email_rejected_before_store() {
        let transport = Arc::new(RecordingTransport::default());
        let (issuer, store) = issuer_with(transport.clone(), 900);

        assert!(matches!(
            issuer.request("not-an-email").await,
            Err(AuthError::InvalidEmail)
        ));
        assert_eq!(store.magic_link_count().await, 0);
        assert!(transport.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let transport = Arc::new(RecordingTransport::default());
        let (issuer, store) = issuer_with(transport, -10);

        issuer.request("a@x.com").await.unwrap();
        issuer.request("b@x.com").await.unwrap();

        assert_eq!(issuer.purge_expired().await.unwrap(), 2);
        assert_eq!(store.magic_link_count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_token_not_found() {
        let transport = Arc::new(RecordingTransport::default());
        let (issuer, _) = issuer_with(transport, 900);
        assert!(matches!(
            issuer.consume("  ").await,
            Err(AuthError::MagicLinkNotFound)
        ));
    }
}
