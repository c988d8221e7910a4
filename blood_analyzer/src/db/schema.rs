//! Credential store schema.
//!
//! Applied idempotently at startup by [`Database::ensure_schema`](super::Database::ensure_schema).

/// DDL for users and magic-link tokens.
///
/// `magic_link_tokens.email` is unique: at most one live token per address.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id                 UUID PRIMARY KEY,
    email              TEXT NOT NULL UNIQUE,
    provider           TEXT,
    provider_id        TEXT,
    first_name         TEXT,
    last_name          TEXT,
    picture            TEXT,
    password_hash      TEXT,
    refresh_token_hash TEXT,
    created_at         TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at         TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_users_provider ON users (provider);

CREATE TABLE IF NOT EXISTS magic_link_tokens (
    id         UUID PRIMARY KEY,
    token      TEXT NOT NULL UNIQUE,
    email      TEXT NOT NULL UNIQUE,
    expires_at BIGINT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_magic_link_tokens_expires_at ON magic_link_tokens (expires_at);
"#;
