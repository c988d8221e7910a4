//! Integration tests for the PostgreSQL credential store.
//!
//! Skipped unless `DATABASE_URL` points at a database the tests may write to.
//! Every test uses fresh, random emails so runs do not interfere.

use blood_analyzer::auth::{LoginMethod, MagicLinkRedemption, NewMagicLinkToken, NewUser, UserUpdate};
use blood_analyzer::db::{CredentialStore, Database, DatabaseConfig, PgCredentialStore, StoreError};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Helper to connect to the test database, or `None` to skip
async fn setup_store() -> Option<PgCredentialStore> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping PostgreSQL store tests");
        return None;
    };

    let config = DatabaseConfig {
        database_url,
        max_connections: 5,
        min_connections: 1,
        connection_timeout_secs: 5,
        idle_timeout_secs: 300,
        max_lifetime_secs: 1800,
    };

    let db = Database::new(&config)
        .await
        .expect("Failed to create test database");
    db.ensure_schema().await.expect("Failed to apply schema");

    Some(db.credential_store())
}

fn unique_email() -> String {
    format!("pg-{}@test.local", Uuid::new_v4().simple())
}

#[tokio::test]
async fn test_create_and_find_user() {
    let Some(store) = setup_store().await else { return };
    let email = unique_email();

    let created = store
        .create_user(NewUser::for_email(&email, LoginMethod::MagicLink))
        .await
        .unwrap();
    let found = store.find_user_by_email(&email).await.unwrap().unwrap();

    assert_eq!(created.id, found.id);
    assert_eq!(found.provider, Some(LoginMethod::MagicLink));

    let duplicate = store
        .create_user(NewUser::for_email(&email, LoginMethod::Password))
        .await;
    assert!(matches!(duplicate, Err(StoreError::Duplicate(_))));
}

#[tokio::test]
async fn test_update_keeps_absent_fields() {
    let Some(store) = setup_store().await else { return };
    let email = unique_email();

    let user = store
        .create_user(NewUser {
            email: email.clone(),
            first_name: Some("Jo".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let updated = store
        .update_user(
            user.id,
            UserUpdate {
                picture: Some("https://img/jo.png".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.first_name.as_deref(), Some("Jo"));
    assert_eq!(updated.picture.as_deref(), Some("https://img/jo.png"));
}

#[tokio::test]
async fn test_rotate_is_compare_and_set() {
    let Some(store) = setup_store().await else { return };
    let user = store
        .create_user(NewUser::for_email(&unique_email(), LoginMethod::Password))
        .await
        .unwrap();

    assert!(store.set_refresh_token_hash(user.id, Some("h1")).await.unwrap());

    let store = Arc::new(store);
    let a = {
        let store = store.clone();
        tokio::spawn(async move { store.rotate_refresh_token_hash(user.id, "h1", "a").await })
    };
    let b = {
        let store = store.clone();
        tokio::spawn(async move { store.rotate_refresh_token_hash(user.id, "h1", "b").await })
    };

    let wins = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
    assert_eq!(wins.iter().filter(|w| **w).count(), 1);

    assert!(store.set_refresh_token_hash(user.id, None).await.unwrap());
    assert!(!store.set_refresh_token_hash(Uuid::new_v4(), None).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_replace_leaves_one_token() {
    let Some(store) = setup_store().await else { return };
    let store = Arc::new(store);
    let email = unique_email();
    let expires_at = Utc::now().timestamp() + 900;

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let store = store.clone();
            let email = email.clone();
            tokio::spawn(async move {
                store
                    .replace_magic_link_token(NewMagicLinkToken {
                        token: format!("{}-{}", Uuid::new_v4(), i),
                        email,
                        expires_at,
                    })
                    .await
            })
        })
        .collect();

    let mut last = None;
    for handle in handles {
        if let Ok(token) = handle.await.unwrap() {
            last = Some(token);
        }
    }
    assert!(last.is_some());

    // Exactly one live row remains; removing it clears the email
    assert_eq!(store.delete_magic_link_tokens_for_email(&email).await.unwrap(), 1);
}

#[tokio::test]
async fn test_redeem_at_most_once() {
    let Some(store) = setup_store().await else { return };
    let store = Arc::new(store);
    let email = unique_email();
    let token = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp();

    store
        .replace_magic_link_token(NewMagicLinkToken {
            token: token.clone(),
            email: email.clone(),
            expires_at: now + 900,
        })
        .await
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            let token = token.clone();
            tokio::spawn(async move { store.redeem_magic_link_token(&token, now).await })
        })
        .collect();

    let mut redeemed = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            MagicLinkRedemption::Redeemed(user) => {
                assert_eq!(user.email, email);
                redeemed += 1;
            }
            MagicLinkRedemption::NotFound => {}
            MagicLinkRedemption::Expired => panic!("token was not expired"),
        }
    }
    assert_eq!(redeemed, 1);
}

#[tokio::test]
async fn test_expired_token_is_removed_on_redeem() {
    let Some(store) = setup_store().await else { return };
    let email = unique_email();
    let token = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp();

    store
        .replace_magic_link_token(NewMagicLinkToken {
            token: token.clone(),
            email: email.clone(),
            expires_at: now - 1,
        })
        .await
        .unwrap();

    assert!(matches!(
        store.redeem_magic_link_token(&token, now).await.unwrap(),
        MagicLinkRedemption::Expired
    ));
    assert!(store.find_magic_link_token(&token).await.unwrap().is_none());
    assert!(store.find_user_by_email(&email).await.unwrap().is_none());
}

#[tokio::test]
async fn test_health_check() {
    let Some(store) = setup_store().await else { return };
    assert!(store.health_check().await.is_ok());
}
