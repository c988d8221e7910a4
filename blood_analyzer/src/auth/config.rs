//! Authentication settings.

/// Default access token lifetime (15 minutes)
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 900;

/// Default refresh token lifetime (7 days)
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = 604_800;

/// Default magic-link lifetime (15 minutes)
pub const DEFAULT_MAGIC_LINK_TTL_SECS: i64 = 900;

/// Route that consumes a magic-link token, appended to `backend_url`
pub const MAGIC_LINK_CONSUME_PATH: &str = "/api/v1/auth/magic-link/consume";

/// Settings shared by the token codec, magic-link issuer and identity resolver
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret for access tokens
    pub access_token_secret: String,
    /// HMAC secret for refresh tokens; must differ from the access secret
    pub refresh_token_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    /// Clock-skew tolerance applied when checking `exp`
    pub leeway_secs: u64,
    pub magic_link_ttl_secs: i64,
    /// Public base URL used to build consume links
    pub backend_url: String,
    /// Sender address for magic-link emails
    pub email_from: String,
    /// Server-side pepper mixed into password hashes
    pub password_pepper: String,
}

impl AuthConfig {
    /// Settings with default lifetimes and zero leeway.
    pub fn new(
        access_token_secret: impl Into<String>,
        refresh_token_secret: impl Into<String>,
    ) -> Self {
        Self {
            access_token_secret: access_token_secret.into(),
            refresh_token_secret: refresh_token_secret.into(),
            access_token_ttl_secs: DEFAULT_ACCESS_TOKEN_TTL_SECS,
            refresh_token_ttl_secs: DEFAULT_REFRESH_TOKEN_TTL_SECS,
            leeway_secs: 0,
            magic_link_ttl_secs: DEFAULT_MAGIC_LINK_TTL_SECS,
            backend_url: "http://localhost:3000".to_string(),
            email_from: "noreply@localhost".to_string(),
            password_pepper: String::new(),
        }
    }
}
