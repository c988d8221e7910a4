//! Identity resolution: map a verified credential to exactly one user.

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use super::{
    errors::{AuthError, AuthResult},
    models::{LoginMethod, NewUser, OAuthProfile, ResolvedIdentity, User, UserUpdate},
};
use crate::db::{CredentialStore, StoreError};

/// Trim and lowercase an email address, rejecting anything without a single
/// `@` followed by a dotted domain.
pub fn normalize_email(raw: &str) -> AuthResult<String> {
    let email = raw.trim().to_lowercase();

    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AuthError::InvalidEmail);
    };

    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..");
    if local.is_empty() || !domain_ok || email.chars().any(char::is_whitespace) {
        return Err(AuthError::InvalidEmail);
    }

    Ok(email)
}

/// Hash verified when no password account matches, so unknown usernames
/// cost the same Argon2 work as wrong passwords. Matches no password.
const DUMMY_PASSWORD_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$B7dkxX+WBiccXMQUFIsWRQ$VMSclZ6XPr8RrRSGqo7UpTnfdq3DS8B1IS/FJCxhjs0";

/// Validate username format.
///
/// Usernames never contain `@`, so a password account cannot claim an email
/// address that belongs to a magic-link or OAuth identity.
pub fn validate_username(username: &str) -> AuthResult<()> {
    let len = username.chars().count();
    if !(3..=64).contains(&len) {
        return Err(AuthError::InvalidUsername(
            "Username must be 3-64 characters".to_string(),
        ));
    }

    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(AuthError::InvalidUsername(
            "Username can only contain letters, numbers, and _ . -".to_string(),
        ));
    }

    Ok(())
}

/// Validate password strength
pub fn validate_password(password: &str) -> AuthResult<()> {
    if password.len() < 8 {
        return Err(AuthError::WeakPassword(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());

    if !has_digit || !has_uppercase || !has_lowercase {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one number, one uppercase and one lowercase letter"
                .to_string(),
        ));
    }

    Ok(())
}

/// Keep only non-blank values, so a provider can never blank out a field.
fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolves password, OAuth and email identities to users
pub struct IdentityResolver {
    store: Arc<dyn CredentialStore>,
    pepper: String,
}

impl IdentityResolver {
    /// Create a new resolver
    ///
    /// # Arguments
    ///
    /// * `store` - Credential store
    /// * `pepper` - Server-side pepper for password hashing
    pub fn new(store: Arc<dyn CredentialStore>, pepper: String) -> Self {
        Self { store, pepper }
    }

    /// Create a password account.
    ///
    /// The username is stored in the user's `email` column. It cannot contain
    /// `@`, so it never collides with an email identity.
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidUsername` - Username format invalid
    /// * `AuthError::WeakPassword` - Password too weak
    /// * `AuthError::UsernameTaken` - Username already exists
    pub async fn create_password_user(
        &self,
        username: &str,
        password: &str,
    ) -> AuthResult<ResolvedIdentity> {
        let username = username.trim();
        validate_username(username)?;
        validate_password(password)?;

        if self.store.find_user_by_email(username).await?.is_some() {
            return Err(AuthError::UsernameTaken);
        }

        let password_hash = self.hash_password(password)?;
        let new_user = NewUser {
            email: username.to_string(),
            provider: Some(LoginMethod::Password),
            password_hash: Some(password_hash),
            ..Default::default()
        };

        let user = match self.store.create_user(new_user).await {
            Ok(user) => user,
            // Lost a registration race for the same name
            Err(StoreError::Duplicate(_)) => return Err(AuthError::UsernameTaken),
            Err(e) => return Err(e.into()),
        };

        log::info!("Created password account {}", user.id);
        Ok(ResolvedIdentity {
            user,
            method: LoginMethod::Password,
        })
    }

    /// Verify a username and password.
    ///
    /// Unknown usernames, accounts without a password, and wrong passwords
    /// all produce the same `AuthError::InvalidCredentials` after the same
    /// amount of hashing work.
    pub async fn resolve_password_identity(
        &self,
        username: &str,
        password: &str,
    ) -> AuthResult<ResolvedIdentity> {
        let found = self.store.find_user_by_email(username.trim()).await?;

        // Always pay for one Argon2 verification, known user or not
        let hash = found
            .as_ref()
            .and_then(|user| user.password_hash.as_deref())
            .unwrap_or(DUMMY_PASSWORD_HASH);
        let verified = self.verify_password(password, hash);

        match found {
            Some(user) if user.password_hash.is_some() => {
                verified?;
                Ok(ResolvedIdentity {
                    user,
                    method: LoginMethod::Password,
                })
            }
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    /// Link a provider profile to a user, matching on email.
    ///
    /// A new user is created when the email is unknown. An existing user has
    /// its provider fields refreshed; blank profile fields never overwrite
    /// stored ones.
    pub async fn resolve_oauth_identity(
        &self,
        profile: &OAuthProfile,
    ) -> AuthResult<ResolvedIdentity> {
        let email = normalize_email(&profile.email)?;
        let method = LoginMethod::OAuth(profile.provider);

        let user = match self.store.find_user_by_email(&email).await? {
            Some(existing) => self.link_profile(existing, profile).await?,
            None => {
                let new_user = NewUser {
                    email: email.clone(),
                    provider: Some(method),
                    provider_id: non_empty(Some(&profile.provider_id)),
                    first_name: non_empty(profile.first_name.as_ref()),
                    last_name: non_empty(profile.last_name.as_ref()),
                    picture: non_empty(profile.picture.as_ref()),
                    password_hash: None,
                };

                match self.store.create_user(new_user).await {
                    Ok(user) => {
                        log::info!("Created {} account {}", method, user.id);
                        user
                    }
                    // A concurrent login created the row first; link to it
                    Err(StoreError::Duplicate(_)) => {
                        let existing = self
                            .store
                            .find_user_by_email(&email)
                            .await?
                            .ok_or(AuthError::UserNotFound)?;
                        self.link_profile(existing, profile).await?
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        Ok(ResolvedIdentity { user, method })
    }

    /// Return the user for an email address, creating a magic-link account
    /// when none exists.
    pub async fn resolve_or_create_by_email(&self, email: &str) -> AuthResult<ResolvedIdentity> {
        let email = normalize_email(email)?;
        let user = self
            .store
            .find_or_create_user(NewUser::for_email(&email, LoginMethod::MagicLink))
            .await?;

        Ok(ResolvedIdentity {
            user,
            method: LoginMethod::MagicLink,
        })
    }

    async fn link_profile(&self, user: User, profile: &OAuthProfile) -> AuthResult<User> {
        let update = UserUpdate {
            provider: Some(LoginMethod::OAuth(profile.provider)),
            provider_id: non_empty(Some(&profile.provider_id)),
            first_name: non_empty(profile.first_name.as_ref()),
            last_name: non_empty(profile.last_name.as_ref()),
            picture: non_empty(profile.picture.as_ref()),
        };

        Ok(self.store.update_user(user.id, update).await?)
    }

    /// Hash password with Argon2id + pepper
    fn hash_password(&self, password: &str) -> AuthResult<String> {
        let peppered = format!("{}{}", password, self.pepper);
        let salt = SaltString::generate(&mut OsRng);

        Argon2::default()
            .hash_password(peppered.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| AuthError::HashingFailed)
    }

    /// Verify password against hash
    fn verify_password(&self, password: &str, hash: &str) -> AuthResult<()> {
        let peppered = format!("{}{}", password, self.pepper);
        let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;

        Argon2::default()
            .verify_password(peppered.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::InvalidCredentials)
    }
}
