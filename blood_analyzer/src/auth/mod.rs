//! Authentication core: login methods, sessions, and tokens.
//!
//! Every login method (password, magic link, OAuth) resolves to a single
//! [`User`] and then goes through the [`SessionManager`], which alone mints,
//! rotates and revokes token pairs:
//!
//! - [`TokenCodec`]: HS256 access and refresh tokens with separate secrets
//! - [`IdentityResolver`]: Argon2id password accounts, OAuth linking by email
//! - [`MagicLinkIssuer`]: single-use emailed login links
//! - [`AuthManager`]: facade over all of the above
//!
//! ## Example
//!
//! ```no_run
//! use blood_analyzer::auth::{AuthConfig, AuthManager};
//! use blood_analyzer::db::InMemoryCredentialStore;
//! use blood_analyzer::email::LogTransport;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuthConfig::new("access-secret-0123456789abcdef0123", "refresh-secret-0123456789abcdef012");
//!     let auth = AuthManager::new(
//!         Arc::new(InMemoryCredentialStore::new()),
//!         Arc::new(LogTransport),
//!         &config,
//!     );
//!
//!     let session = auth.register_with_password("analyst", "SecurePass123").await?;
//!     println!("Registered user: {}", session.user.id);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod errors;
pub mod identity;
pub mod magic_link;
pub mod manager;
pub mod models;
pub mod session;

pub use codec::TokenCodec;
pub use config::AuthConfig;
pub use errors::{AuthError, AuthResult, MAGIC_LINK_UNAVAILABLE};
pub use identity::IdentityResolver;
pub use magic_link::MagicLinkIssuer;
pub use manager::AuthManager;
pub use models::{
    AuthContext, AuthSession, LoginMethod, MagicLinkRedemption, MagicLinkToken,
    NewMagicLinkToken, NewUser, OAuthProfile, OAuthProvider, ResolvedIdentity, TokenClaims,
    TokenKind, TokenPair, User, UserId, UserUpdate, UserView,
};
pub use session::SessionManager;
