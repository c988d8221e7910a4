//! # Blood Analyzer
//!
//! Authentication core of the blood test analyzer backend.
//!
//! A user can log in with a password, a magic link sent by email, or an OAuth
//! provider profile. All three converge on one user record per email and one
//! session model: a short-lived access token plus a single rotating refresh
//! token whose fingerprint lives on the user row.
//!
//! ## Core Modules
//!
//! - [`auth`]: Token codec, identity resolution, magic links, sessions
//! - [`db`]: Credential store trait with PostgreSQL and in-memory backends
//! - [`email`]: Outbound magic-link email transport

/// Login methods, tokens and sessions.
pub mod auth;
pub use auth::{AuthConfig, AuthError, AuthManager, AuthResult, AuthSession};

/// Credential persistence.
pub mod db;

/// Magic-link email delivery.
pub mod email;
