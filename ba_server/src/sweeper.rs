//! Background removal of expired magic links.

use blood_analyzer::auth::AuthManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};

use crate::metrics;

/// Purge expired magic links every `every`, forever.
///
/// Failures are logged and retried on the next tick.
pub fn spawn_magic_link_sweeper(auth: Arc<AuthManager>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match auth.purge_expired_magic_links().await {
                Ok(0) => {}
                Ok(purged) => {
                    metrics::magic_links_purged_total(purged);
                    tracing::info!(purged, "Swept expired magic links");
                }
                Err(e) => tracing::warn!(error = %e, "Magic link sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use blood_analyzer::auth::{AuthConfig, NewMagicLinkToken};
    use blood_analyzer::db::{CredentialStore, InMemoryCredentialStore};
    use blood_analyzer::email::LogTransport;

    #[tokio::test]
    async fn test_sweeper_removes_expired_links() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let auth = Arc::new(AuthManager::new(
            store.clone(),
            Arc::new(LogTransport),
            &AuthConfig::new("a".repeat(32), "b".repeat(32)),
        ));

        store
            .replace_magic_link_token(NewMagicLinkToken {
                token: "old".to_string(),
                email: "a@x.com".to_string(),
                expires_at: 0,
            })
            .await
            .unwrap();

        let handle = spawn_magic_link_sweeper(auth, Duration::from_millis(10));
        for _ in 0..50 {
            if store.magic_link_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert_eq!(store.magic_link_count().await, 0);
    }
}
