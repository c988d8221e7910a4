//! Authentication data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// User ID type
pub type UserId = Uuid;

/// External identity providers that can vouch for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    LinkedIn,
    Facebook,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::LinkedIn => "linkedin",
            OAuthProvider::Facebook => "facebook",
        }
    }
}

/// The way a user proved who they are.
///
/// Stored on the user row as the provider tag (`password`, `magic_link`,
/// `google`, `linkedin`, `facebook`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LoginMethod {
    Password,
    MagicLink,
    OAuth(OAuthProvider),
}

impl LoginMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginMethod::Password => "password",
            LoginMethod::MagicLink => "magic_link",
            LoginMethod::OAuth(provider) => provider.as_str(),
        }
    }
}

impl fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored provider tag is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown login provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for LoginMethod {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password" => Ok(LoginMethod::Password),
            "magic_link" => Ok(LoginMethod::MagicLink),
            "google" => Ok(LoginMethod::OAuth(OAuthProvider::Google)),
            "linkedin" => Ok(LoginMethod::OAuth(OAuthProvider::LinkedIn)),
            "facebook" => Ok(LoginMethod::OAuth(OAuthProvider::Facebook)),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

impl TryFrom<String> for LoginMethod {
    type Error = UnknownProvider;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LoginMethod> for String {
    fn from(method: LoginMethod) -> Self {
        method.as_str().to_string()
    }
}

/// User model
///
/// `email` holds the username for accounts created through the password flow;
/// it is unique across all users regardless of provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub provider: Option<LoginMethod>,
    pub provider_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub picture: Option<String>,
    #[serde(skip)]
    pub password_hash: Option<String>,
    /// SHA-256 of the only refresh token currently accepted for this user
    #[serde(skip)]
    pub refresh_token_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Projection that is safe to hand back to clients.
    pub fn view(&self) -> UserView {
        let display_name = match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.clone()),
            (None, Some(last)) => Some(last.clone()),
            (None, None) => None,
        };

        UserView {
            id: self.id,
            email: self.email.clone(),
            display_name,
        }
    }
}

/// Client-facing user projection. Never carries secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: UserId,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Fields for a user row that does not exist yet.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub provider: Option<LoginMethod>,
    pub provider_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub picture: Option<String>,
    pub password_hash: Option<String>,
}

impl NewUser {
    /// A bare account for an email address, tagged with the method that created it.
    pub fn for_email(email: &str, method: LoginMethod) -> Self {
        Self {
            email: email.to_string(),
            provider: Some(method),
            ..Default::default()
        }
    }
}

/// Partial update applied to an existing user; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub provider: Option<LoginMethod>,
    pub provider_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub picture: Option<String>,
}

/// Profile produced by an OAuth provider after its consent flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthProfile {
    pub provider: OAuthProvider,
    pub provider_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub picture: Option<String>,
}

/// A user together with the login method that vouched for them.
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub user: User,
    pub method: LoginMethod,
}

/// Single-use passwordless login credential.
#[derive(Debug, Clone)]
pub struct MagicLinkToken {
    pub id: Uuid,
    pub token: String,
    pub email: String,
    /// Absolute expiry, epoch seconds
    pub expires_at: i64,
    pub created_at: DateTime<Utc>,
}

impl MagicLinkToken {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at < now
    }
}

/// Magic-link row to insert in place of any existing one for the same email.
#[derive(Debug, Clone)]
pub struct NewMagicLinkToken {
    pub token: String,
    pub email: String,
    pub expires_at: i64,
}

/// Outcome of atomically redeeming a magic-link token.
#[derive(Debug, Clone)]
pub enum MagicLinkRedemption {
    /// No row for this token: never issued, already used, or superseded
    NotFound,
    /// The row existed but had expired; it has been removed
    Expired,
    /// The row was removed and the user for its email is returned
    Redeemed(User),
}

/// Which of the two secrets signed a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims shared by access and refresh tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: UserId,           // User ID
    pub email: String,
    pub kind: TokenKind,
    pub jti: String,           // Unique per token
    pub exp: i64,              // Expiration timestamp
    pub iat: i64,              // Issued at timestamp
}

/// Access and refresh token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Result of any successful login or refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: UserView,
}

/// Identity of the caller behind a verified access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: UserId,
    pub email: String,
}
