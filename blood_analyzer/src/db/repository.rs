//! Credential store trait and its PostgreSQL implementation.
//!
//! The trait is the only seam between the authentication core and persistence.
//! Operations that must be atomic (magic-link replacement and redemption,
//! refresh-token rotation) are single trait methods so every implementation
//! can honor them with whatever isolation it has.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use super::errors::{StoreError, StoreResult};
use super::timeouts::{with_default_timeout, with_transaction_timeout};
use crate::auth::{
    LoginMethod, MagicLinkRedemption, MagicLinkToken, NewMagicLinkToken, NewUser, User, UserId,
    UserUpdate,
};

/// Persistent record of users, their refresh-token fingerprint, and
/// outstanding magic-link tokens.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find user by email, or by username for password accounts
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Find user by ID
    async fn find_user_by_id(&self, user_id: UserId) -> StoreResult<Option<User>>;

    /// Create a new user; fails with `StoreError::Duplicate("email")` when taken
    async fn create_user(&self, new_user: NewUser) -> StoreResult<User>;

    /// Return the user with `new_user.email`, creating it if absent.
    ///
    /// Safe to retry: concurrent callers converge on one row.
    async fn find_or_create_user(&self, new_user: NewUser) -> StoreResult<User>;

    /// Apply the present fields of `update`; returns the updated row
    async fn update_user(&self, user_id: UserId, update: UserUpdate) -> StoreResult<User>;

    /// Overwrite (or clear, with `None`) the refresh-token fingerprint.
    ///
    /// Returns `false` if the user does not exist.
    async fn set_refresh_token_hash(&self, user_id: UserId, hash: Option<&str>)
    -> StoreResult<bool>;

    /// Replace the fingerprint only if it still equals `expected`.
    ///
    /// Linearizable per user: of several callers presenting the same
    /// `expected`, at most one gets `true`.
    async fn rotate_refresh_token_hash(
        &self,
        user_id: UserId,
        expected: &str,
        replacement: &str,
    ) -> StoreResult<bool>;

    /// Find magic-link token by its value
    async fn find_magic_link_token(&self, token: &str) -> StoreResult<Option<MagicLinkToken>>;

    /// Insert a magic-link token
    async fn create_magic_link_token(&self, new_token: NewMagicLinkToken)
    -> StoreResult<MagicLinkToken>;

    /// Delete magic-link token by ID; deleting a missing row is not an error
    async fn delete_magic_link_token(&self, token_id: Uuid) -> StoreResult<()>;

    /// Delete every magic-link token for an email
    async fn delete_magic_link_tokens_for_email(&self, email: &str) -> StoreResult<u64>;

    /// Delete all tokens for the email and insert the new one, atomically
    async fn replace_magic_link_token(
        &self,
        new_token: NewMagicLinkToken,
    ) -> StoreResult<MagicLinkToken>;

    /// Remove the token row and, if it was still valid, find or create the
    /// magic-link user for its email, all in one atomic step.
    ///
    /// Two concurrent calls with the same token never both see `Redeemed`.
    async fn redeem_magic_link_token(
        &self,
        token: &str,
        now: i64,
    ) -> StoreResult<MagicLinkRedemption>;

    /// Delete tokens that expired before `now`
    async fn purge_expired_magic_links(&self, now: i64) -> StoreResult<u64>;

    /// Check the store is reachable
    async fn health_check(&self) -> StoreResult<()>;
}

const USER_COLUMNS: &str = "id, email, provider, provider_id, first_name, last_name, picture, \
                            password_hash, refresh_token_hash, created_at, updated_at";

const TOKEN_COLUMNS: &str = "id, token, email, expires_at, created_at";

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    let provider = row
        .try_get::<Option<String>, _>("provider")?
        .map(|tag| tag.parse::<LoginMethod>())
        .transpose()
        .map_err(|e| StoreError::Corrupt {
            column: "provider",
            reason: e.to_string(),
        })?;

    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        provider,
        provider_id: row.try_get("provider_id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        picture: row.try_get("picture")?,
        password_hash: row.try_get("password_hash")?,
        refresh_token_hash: row.try_get("refresh_token_hash")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn token_from_row(row: &PgRow) -> StoreResult<MagicLinkToken> {
    Ok(MagicLinkToken {
        id: row.try_get("id")?,
        token: row.try_get("token")?,
        email: row.try_get("email")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

/// PostgreSQL implementation of [`CredentialStore`]
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_or_create_in(
        tx: &mut Transaction<'_, Postgres>,
        new_user: &NewUser,
    ) -> StoreResult<User> {
        let inserted = sqlx::query(&format!(
            "INSERT INTO users (id, email, provider, provider_id, first_name, last_name, picture, password_hash)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (email) DO NOTHING
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new_user.email)
        .bind(new_user.provider.map(|p| p.as_str()))
        .bind(&new_user.provider_id)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&new_user.picture)
        .bind(&new_user.password_hash)
        .fetch_optional(&mut **tx)
        .await?;

        let row = match inserted {
            Some(row) => row,
            None => {
                sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
                    .bind(&new_user.email)
                    .fetch_one(&mut **tx)
                    .await?
            }
        };

        user_from_row(&row)
    }

    async fn find_or_create_tx(&self, new_user: &NewUser) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;
        let user = Self::find_or_create_in(&mut tx, new_user).await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn replace_magic_link_tx(
        &self,
        new_token: &NewMagicLinkToken,
    ) -> StoreResult<MagicLinkToken> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM magic_link_tokens WHERE email = $1")
            .bind(&new_token.email)
            .execute(&mut *tx)
            .await?;

        // A racing request that slipped in after our DELETE is overwritten,
        // never duplicated: email is unique.
        let row = sqlx::query(&format!(
            "INSERT INTO magic_link_tokens (id, token, email, expires_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (email) DO UPDATE
             SET id = EXCLUDED.id,
                 token = EXCLUDED.token,
                 expires_at = EXCLUDED.expires_at,
                 created_at = NOW()
             RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new_token.token)
        .bind(&new_token.email)
        .bind(new_token.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        token_from_row(&row)
    }

    async fn redeem_magic_link_tx(&self, token: &str, now: i64) -> StoreResult<MagicLinkRedemption> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(&format!(
            "DELETE FROM magic_link_tokens WHERE token = $1 RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;

        // Dropping the transaction rolls it back.
        let Some(row) = deleted else {
            return Ok(MagicLinkRedemption::NotFound);
        };
        let link = token_from_row(&row)?;

        if link.is_expired(now) {
            tx.commit().await?;
            return Ok(MagicLinkRedemption::Expired);
        }

        let user = Self::find_or_create_in(
            &mut tx,
            &NewUser::for_email(&link.email, LoginMethod::MagicLink),
        )
        .await?;

        tx.commit().await?;
        Ok(MagicLinkRedemption::Redeemed(user))
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = with_default_timeout(
            sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
                .bind(email)
                .fetch_optional(&self.pool),
        )
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_id(&self, user_id: UserId) -> StoreResult<Option<User>> {
        let row = with_default_timeout(
            sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(user_id)
                .fetch_optional(&self.pool),
        )
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        let row = with_default_timeout(async {
            sqlx::query(&format!(
                "INSERT INTO users (id, email, provider, provider_id, first_name, last_name, picture, password_hash)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 RETURNING {USER_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(&new_user.email)
            .bind(new_user.provider.map(|p| p.as_str()))
            .bind(&new_user.provider_id)
            .bind(&new_user.first_name)
            .bind(&new_user.last_name)
            .bind(&new_user.picture)
            .bind(&new_user.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::from_insert(e, "email"))
        })
        .await?;

        user_from_row(&row)
    }

    async fn find_or_create_user(&self, new_user: NewUser) -> StoreResult<User> {
        with_transaction_timeout(self.find_or_create_tx(&new_user)).await
    }

    async fn update_user(&self, user_id: UserId, update: UserUpdate) -> StoreResult<User> {
        let row = with_default_timeout(
            sqlx::query(&format!(
                "UPDATE users
                 SET provider    = COALESCE($2, provider),
                     provider_id = COALESCE($3, provider_id),
                     first_name  = COALESCE($4, first_name),
                     last_name   = COALESCE($5, last_name),
                     picture     = COALESCE($6, picture),
                     updated_at  = NOW()
                 WHERE id = $1
                 RETURNING {USER_COLUMNS}"
            ))
            .bind(user_id)
            .bind(update.provider.map(|p| p.as_str()))
            .bind(&update.provider_id)
            .bind(&update.first_name)
            .bind(&update.last_name)
            .bind(&update.picture)
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or_else(|| StoreError::Missing {
            entity: "user",
            id: user_id.to_string(),
        })?;

        user_from_row(&row)
    }

    async fn set_refresh_token_hash(
        &self,
        user_id: UserId,
        hash: Option<&str>,
    ) -> StoreResult<bool> {
        let result = with_default_timeout(
            sqlx::query(
                "UPDATE users SET refresh_token_hash = $2, updated_at = NOW() WHERE id = $1",
            )
            .bind(user_id)
            .bind(hash)
            .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn rotate_refresh_token_hash(
        &self,
        user_id: UserId,
        expected: &str,
        replacement: &str,
    ) -> StoreResult<bool> {
        // Row lock plus the re-checked WHERE clause makes this a compare-and-swap.
        let result = with_default_timeout(
            sqlx::query(
                "UPDATE users
                 SET refresh_token_hash = $3, updated_at = NOW()
                 WHERE id = $1 AND refresh_token_hash = $2",
            )
            .bind(user_id)
            .bind(expected)
            .bind(replacement)
            .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_magic_link_token(&self, token: &str) -> StoreResult<Option<MagicLinkToken>> {
        let row = with_default_timeout(
            sqlx::query(&format!(
                "SELECT {TOKEN_COLUMNS} FROM magic_link_tokens WHERE token = $1"
            ))
            .bind(token)
            .fetch_optional(&self.pool),
        )
        .await?;

        row.as_ref().map(token_from_row).transpose()
    }

    async fn create_magic_link_token(
        &self,
        new_token: NewMagicLinkToken,
    ) -> StoreResult<MagicLinkToken> {
        let row = with_default_timeout(async {
            sqlx::query(&format!(
                "INSERT INTO magic_link_tokens (id, token, email, expires_at)
                 VALUES ($1, $2, $3, $4)
                 RETURNING {TOKEN_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(&new_token.token)
            .bind(&new_token.email)
            .bind(new_token.expires_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::from_insert(e, "magic link email"))
        })
        .await?;

        token_from_row(&row)
    }

    async fn delete_magic_link_token(&self, token_id: Uuid) -> StoreResult<()> {
        with_default_timeout(
            sqlx::query("DELETE FROM magic_link_tokens WHERE id = $1")
                .bind(token_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn delete_magic_link_tokens_for_email(&self, email: &str) -> StoreResult<u64> {
        let result = with_default_timeout(
            sqlx::query("DELETE FROM magic_link_tokens WHERE email = $1")
                .bind(email)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected())
    }

    async fn replace_magic_link_token(
        &self,
        new_token: NewMagicLinkToken,
    ) -> StoreResult<MagicLinkToken> {
        with_transaction_timeout(self.replace_magic_link_tx(&new_token)).await
    }

    async fn redeem_magic_link_token(
        &self,
        token: &str,
        now: i64,
    ) -> StoreResult<MagicLinkRedemption> {
        with_transaction_timeout(self.redeem_magic_link_tx(token, now)).await
    }

    async fn purge_expired_magic_links(&self, now: i64) -> StoreResult<u64> {
        let result = with_default_timeout(
            sqlx::query("DELETE FROM magic_link_tokens WHERE expires_at < $1")
                .bind(now)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> StoreResult<()> {
        with_default_timeout(sqlx::query("SELECT 1").execute(&self.pool)).await?;
        Ok(())
    }
}
