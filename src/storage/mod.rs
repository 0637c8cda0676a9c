//! Ledger storage.
//!
//! The `LedgerStore` trait is the only way the accrual engine touches
//! persisted state. Backends:
//! - `memory`: `MockLedgerStore`, process-local
//! - `sqlite`: `SqliteLedgerStore` (feature `sqlite`)

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

pub mod helpers;
mod ledger_store;
pub mod mock;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use ledger_store::{LedgerStore, Result, StorageError};
pub use mock::MockLedgerStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLedgerStore;

/// Path value selecting a private in-memory SQLite database.
pub const SQLITE_MEMORY_PATH: &str = ":memory:";

/// Storage type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Sqlite,
    Memory,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// Path to the SQLite database file, or `:memory:`.
    pub path: String,
    /// Maximum pooled SQLite connections. Forced to 1 for `:memory:`.
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Sqlite,
            path: "./data/ledger.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Initialize storage based on configuration.
pub async fn init_storage(
    config: &StorageConfig,
) -> std::result::Result<Arc<dyn LedgerStore>, Box<dyn std::error::Error>> {
    match config.storage_type {
        StorageType::Memory => {
            info!("Storage: memory");
            Ok(Arc::new(MockLedgerStore::new()))
        }
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            use std::str::FromStr;

            use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

            info!("Storage: sqlite at {}", config.path);

            let (options, max_connections) = if config.path == SQLITE_MEMORY_PATH {
                // Every connection to :memory: opens its own database.
                (SqliteConnectOptions::from_str("sqlite::memory:")?, 1)
            } else {
                if let Some(parent) = std::path::Path::new(&config.path).parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path))?
                    .create_if_missing(true);
                (options, config.max_connections.max(1))
            };

            let pool = SqlitePoolOptions::new()
                .max_connections(max_connections)
                .connect_with(options)
                .await?;

            let store = SqliteLedgerStore::new(pool);
            store.init().await?;

            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => {
            tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err("SQLite feature not enabled".into())
        }
    }
}
