//! Signing and verification of access and refresh tokens.
//!
//! Both kinds are HS256 JWTs carrying [`TokenClaims`], signed with independent
//! secrets and lifetimes. The codec holds no state beyond its keys.

use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{
    config::AuthConfig,
    errors::{AuthError, AuthResult},
    models::{TokenClaims, TokenKind, TokenPair, User, UserId},
};

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl SigningKeys {
    fn from_secret(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }
}

/// Stateless JWT codec for both token kinds
pub struct TokenCodec {
    access: SigningKeys,
    refresh: SigningKeys,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway_secs;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        Self {
            access: SigningKeys::from_secret(
                &config.access_token_secret,
                config.access_token_ttl_secs,
            ),
            refresh: SigningKeys::from_secret(
                &config.refresh_token_secret,
                config.refresh_token_ttl_secs,
            ),
            validation,
        }
    }

    fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Sign arbitrary claims with the secret for `claims.kind`.
    pub fn sign(&self, claims: &TokenClaims) -> AuthResult<String> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.keys(claims.kind).encoding,
        )
        .map_err(AuthError::Signing)
    }

    /// Issue a fresh token of `kind` for a user.
    pub fn issue(&self, kind: TokenKind, user_id: UserId, email: &str) -> AuthResult<String> {
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: user_id,
            email: email.to_string(),
            kind,
            jti: Uuid::new_v4().to_string(),
            exp: now + self.keys(kind).ttl_secs,
            iat: now,
        };
        self.sign(&claims)
    }

    pub fn issue_access_token(&self, user_id: UserId, email: &str) -> AuthResult<String> {
        self.issue(TokenKind::Access, user_id, email)
    }

    pub fn issue_refresh_token(&self, user_id: UserId, email: &str) -> AuthResult<String> {
        self.issue(TokenKind::Refresh, user_id, email)
    }

    /// Issue an access/refresh pair for a user
    pub fn issue_pair(&self, user: &User) -> AuthResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user.id, &user.email)?,
            refresh_token: self.issue_refresh_token(user.id, &user.email)?,
            expires_in: self.access.ttl_secs,
        })
    }

    /// Verify a token against the secret for `kind`
    ///
    /// # Errors
    ///
    /// * `AuthError::TokenExpired` - `exp` is in the past (beyond the leeway)
    /// * `AuthError::TokenInvalid` - bad signature, malformed token, or a
    ///   token of the other kind
    pub fn verify(&self, kind: TokenKind, token: &str) -> AuthResult<TokenClaims> {
        let data = decode::<TokenClaims>(token, &self.keys(kind).decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            })?;

        if data.claims.kind != kind {
            return Err(AuthError::TokenInvalid);
        }

        Ok(data.claims)
    }

    pub fn verify_access_token(&self, token: &str) -> AuthResult<TokenClaims> {
        self.verify(TokenKind::Access, token)
    }

    pub fn verify_refresh_token(&self, token: &str) -> AuthResult<TokenClaims> {
        self.verify(TokenKind::Refresh, token)
    }
}

/// Stored representation of a refresh token: its SHA-256 hex digest.
pub fn fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
