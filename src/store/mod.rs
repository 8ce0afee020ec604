//! Persisted in-flight transaction store
//!
//! Maps a destination chain name to the hash of the relay transaction
//! currently outstanding on it. Absence of a key means nothing is in flight.

use alloy::primitives::TxHash;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub mod file;
pub mod postgres;

pub use file::FileStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("stored value for {chain} is not a tx hash: {value}")]
    InvalidHash { chain: String, value: String },
}

#[async_trait]
pub trait PendingStore: Send + Sync {
    async fn get(&self, chain: &str) -> Result<Option<TxHash>, StoreError>;

    async fn set(&self, chain: &str, hash: TxHash) -> Result<(), StoreError>;

    async fn delete(&self, chain: &str) -> Result<(), StoreError>;
}

/// Open the store named by `location`: a `postgres://` URL or a JSON file path
pub async fn open(location: &str) -> Result<Arc<dyn PendingStore>, StoreError> {
    if location.starts_with("postgres://") || location.starts_with("postgresql://") {
        let store = PgStore::connect(location).await?;
        Ok(Arc::new(store))
    } else {
        let store = FileStore::open(location).await?;
        Ok(Arc::new(store))
    }
}

fn parse_hash(chain: &str, value: &str) -> Result<TxHash, StoreError> {
    value.parse().map_err(|_| StoreError::InvalidHash {
        chain: chain.to_string(),
        value: value.to_string(),
    })
}
