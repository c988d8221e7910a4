//! Credential store module: the persistence seam of the authentication core.
//!
//! [`CredentialStore`] is implemented by [`PgCredentialStore`] (PostgreSQL via
//! sqlx) and [`InMemoryCredentialStore`]. Components receive the store as an
//! `Arc<dyn CredentialStore>` handle at construction.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

pub mod config;
pub mod errors;
pub mod memory;
pub mod repository;
pub mod schema;
pub mod timeouts;

pub use config::DatabaseConfig;
pub use errors::{StoreError, StoreResult};
pub use memory::InMemoryCredentialStore;
pub use repository::{CredentialStore, PgCredentialStore};

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    ///
    /// # Arguments
    ///
    /// * `config` - Database configuration
    ///
    /// # Returns
    ///
    /// * `StoreResult<Database>` - Database instance or error
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use blood_analyzer::db::{Database, DatabaseConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), blood_analyzer::db::StoreError> {
    ///     let db = Database::new(&DatabaseConfig::development()).await?;
    ///     db.ensure_schema().await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create the users and magic-link tables if they do not exist
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        timeouts::with_transaction_timeout(sqlx::raw_sql(schema::SCHEMA).execute(&self.pool))
            .await?;
        log::info!("Credential store schema ready");
        Ok(())
    }

    /// Credential store backed by this pool
    pub fn credential_store(&self) -> PgCredentialStore {
        PgCredentialStore::new(self.pool.clone())
    }

    /// Close the database connection pool
    pub async fn close(self) {
        self.pool.close().await;
    }
}
