//! In-memory credential store.
//!
//! Holds all state behind one async mutex, so every trait method is trivially
//! atomic. Used by the test suites and for running the server without
//! PostgreSQL.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::errors::{StoreError, StoreResult};
use super::repository::CredentialStore;
use crate::auth::{
    LoginMethod, MagicLinkRedemption, MagicLinkToken, NewMagicLinkToken, NewUser, User, UserId,
    UserUpdate,
};

#[derive(Default)]
struct State {
    users: HashMap<UserId, User>,
    /// Keyed by token value
    magic_links: HashMap<String, MagicLinkToken>,
}

impl State {
    fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users.values().find(|u| u.email == email)
    }

    fn insert_user(&mut self, new_user: NewUser) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            provider: new_user.provider,
            provider_id: new_user.provider_id,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            picture: new_user.picture,
            password_hash: new_user.password_hash,
            refresh_token_hash: None,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(user.id, user.clone());
        user
    }

    fn find_or_insert_user(&mut self, new_user: NewUser) -> User {
        if let Some(user) = self.user_by_email(&new_user.email) {
            return user.clone();
        }
        self.insert_user(new_user)
    }

    fn remove_links_for(&mut self, email: &str) -> u64 {
        let before = self.magic_links.len();
        self.magic_links.retain(|_, link| link.email != email);
        (before - self.magic_links.len()) as u64
    }

    fn insert_link(&mut self, new_token: NewMagicLinkToken) -> MagicLinkToken {
        let link = MagicLinkToken {
            id: Uuid::new_v4(),
            token: new_token.token,
            email: new_token.email,
            expires_at: new_token.expires_at,
            created_at: Utc::now(),
        };
        self.magic_links.insert(link.token.clone(), link.clone());
        link
    }
}

/// [`CredentialStore`] kept entirely in process memory
#[derive(Default)]
pub struct InMemoryCredentialStore {
    state: Mutex<State>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of magic-link rows currently stored, live or expired.
    pub async fn magic_link_count(&self) -> usize {
        self.state.lock().await.magic_links.len()
    }

    /// Number of user rows.
    pub async fn user_count(&self) -> usize {
        self.state.lock().await.users.len()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.state.lock().await.user_by_email(email).cloned())
    }

    async fn find_user_by_id(&self, user_id: UserId) -> StoreResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        if state.user_by_email(&new_user.email).is_some() {
            return Err(StoreError::Duplicate("email"));
        }
        Ok(state.insert_user(new_user))
    }

    async fn find_or_create_user(&self, new_user: NewUser) -> StoreResult<User> {
        Ok(self.state.lock().await.find_or_insert_user(new_user))
    }

    async fn update_user(&self, user_id: UserId, update: UserUpdate) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::Missing {
                entity: "user",
                id: user_id.to_string(),
            })?;

        if update.provider.is_some() {
            user.provider = update.provider;
        }
        if update.provider_id.is_some() {
            user.provider_id = update.provider_id;
        }
        if update.first_name.is_some() {
            user.first_name = update.first_name;
        }
        if update.last_name.is_some() {
            user.last_name = update.last_name;
        }
        if update.picture.is_some() {
            user.picture = update.picture;
        }
        user.updated_at = Utc::now();

        Ok(user.clone())
    }

    async fn set_refresh_token_hash(
        &self,
        user_id: UserId,
        hash: Option<&str>,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.users.get_mut(&user_id) {
            Some(user) => {
                user.refresh_token_hash = hash.map(str::to_string);
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn rotate_refresh_token_hash(
        &self,
        user_id: UserId,
        expected: &str,
        replacement: &str,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.users.get_mut(&user_id) {
            Some(user) if user.refresh_token_hash.as_deref() == Some(expected) => {
                user.refresh_token_hash = Some(replacement.to_string());
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_magic_link_token(&self, token: &str) -> StoreResult<Option<MagicLinkToken>> {
        Ok(self.state.lock().await.magic_links.get(token).cloned())
    }

    async fn create_magic_link_token(
        &self,
        new_token: NewMagicLinkToken,
    ) -> StoreResult<MagicLinkToken> {
        let mut state = self.state.lock().await;
        if state
            .magic_links
            .values()
            .any(|link| link.email == new_token.email)
        {
            return Err(StoreError::Duplicate("magic link email"));
        }
        Ok(state.insert_link(new_token))
    }

    async fn delete_magic_link_token(&self, token_id: Uuid) -> StoreResult<()> {
        self.state
            .lock()
            .await
            .magic_links
            .retain(|_, link| link.id != token_id);
        Ok(())
    }

    async fn delete_magic_link_tokens_for_email(&self, email: &str) -> StoreResult<u64> {
        Ok(self.state.lock().await.remove_links_for(email))
    }

    async fn replace_magic_link_token(
        &self,
        new_token: NewMagicLinkToken,
    ) -> StoreResult<MagicLinkToken> {
        let mut state = self.state.lock().await;
        state.remove_links_for(&new_token.email);
        Ok(state.insert_link(new_token))
    }

    async fn redeem_magic_link_token(
        &self,
        token: &str,
        now: i64,
    ) -> StoreResult<MagicLinkRedemption> {
        let mut state = self.state.lock().await;
        let Some(link) = state.magic_links.remove(token) else {
            return Ok(MagicLinkRedemption::NotFound);
        };

        if link.is_expired(now) {
            return Ok(MagicLinkRedemption::Expired);
        }

        let user =
            state.find_or_insert_user(NewUser::for_email(&link.email, LoginMethod::MagicLink));
        Ok(MagicLinkRedemption::Redeemed(user))
    }

    async fn purge_expired_magic_links(&self, now: i64) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.magic_links.len();
        state.magic_links.retain(|_, link| !link.is_expired(now));
        Ok((before - state.magic_links.len()) as u64)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(token: &str, email: &str, expires_at: i64) -> NewMagicLinkToken {
        NewMagicLinkToken {
            token: token.to_string(),
            email: email.to_string(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicate_email() {
        let store = InMemoryCredentialStore::new();
        store
            .create_user(NewUser::for_email("a@x.com", LoginMethod::MagicLink))
            .await
            .expect("first insert");

        let err = store
            .create_user(NewUser::for_email("a@x.com", LoginMethod::Password))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("email")));
    }

    #[tokio::test]
    async fn test_find_or_create_is_idempotent() {
        let store = InMemoryCredentialStore::new();
        let first = store
            .find_or_create_user(NewUser::for_email("a@x.com", LoginMethod::MagicLink))
            .await
            .unwrap();
        let second = store
            .find_or_create_user(NewUser::for_email("a@x.com", LoginMethod::MagicLink))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_keeps_absent_fields() {
        let store = InMemoryCredentialStore::new();
        let mut new_user = NewUser::for_email("a@x.com", LoginMethod::MagicLink);
        new_user.first_name = Some("Ada".to_string());
        let user = store.create_user(new_user).await.unwrap();

        let updated = store
            .update_user(
                user.id,
                UserUpdate {
                    picture: Some("https://img/a.png".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.first_name.as_deref(), Some("Ada"));
        assert_eq!(updated.picture.as_deref(), Some("https://img/a.png"));
    }

    #[tokio::test]
    async fn test_update_missing_user_fails() {
        let store = InMemoryCredentialStore::new();
        let err = store
            .update_user(Uuid::new_v4(), UserUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Missing { entity: "user", .. }));
    }

    #[tokio::test]
    async fn test_rotate_is_compare_and_swap() {
        let store = InMemoryCredentialStore::new();
        let user = store
            .create_user(NewUser::for_email("a@x.com", LoginMethod::MagicLink))
            .await
            .unwrap();

        assert!(store.set_refresh_token_hash(user.id, Some("h1")).await.unwrap());
        assert!(store.rotate_refresh_token_hash(user.id, "h1", "h2").await.unwrap());
        assert!(!store.rotate_refresh_token_hash(user.id, "h1", "h3").await.unwrap());

        let stored = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token_hash.as_deref(), Some("h2"));
    }

    #[tokio::test]
    async fn test_replace_keeps_one_link_per_email() {
        let store = InMemoryCredentialStore::new();
        store.replace_magic_link_token(link("t1", "a@x.com", 100)).await.unwrap();
        store.replace_magic_link_token(link("t2", "a@x.com", 100)).await.unwrap();
        store.replace_magic_link_token(link("t3", "b@x.com", 100)).await.unwrap();

        assert_eq!(store.magic_link_count().await, 2);
        assert!(store.find_magic_link_token("t1").await.unwrap().is_none());
        assert!(store.find_magic_link_token("t2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_link_rejects_second_live_token() {
        let store = InMemoryCredentialStore::new();
        store.create_magic_link_token(link("t1", "a@x.com", 100)).await.unwrap();
        let err = store
            .create_magic_link_token(link("t2", "a@x.com", 100))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_redeem_removes_row_even_when_expired() {
        let store = InMemoryCredentialStore::new();
        store.replace_magic_link_token(link("old", "a@x.com", 10)).await.unwrap();

        let outcome = store.redeem_magic_link_token("old", 11).await.unwrap();
        assert!(matches!(outcome, MagicLinkRedemption::Expired));
        assert_eq!(store.magic_link_count().await, 0);
        assert_eq!(store.user_count().await, 0);

        let outcome = store.redeem_magic_link_token("old", 11).await.unwrap();
        assert!(matches!(outcome, MagicLinkRedemption::NotFound));
    }

    #[tokio::test]
    async fn test_purge_only_drops_expired_links() {
        let store = InMemoryCredentialStore::new();
        store.replace_magic_link_token(link("t1", "a@x.com", 10)).await.unwrap();
        store.replace_magic_link_token(link("t2", "b@x.com", 50)).await.unwrap();

        assert_eq!(store.purge_expired_magic_links(20).await.unwrap(), 1);
        assert!(store.find_magic_link_token("t2").await.unwrap().is_some());
    }
}
