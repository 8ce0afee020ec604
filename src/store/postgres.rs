//! Postgres store
//!
//! One row per destination chain in `pending_transactions`.

use alloy::primitives::TxHash;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{error, info};

use super::{parse_hash, PendingStore, StoreError};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and run pending migrations
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Connected pending-tx store to Postgres");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PendingStore for PgStore {
    async fn get(&self, chain: &str) -> Result<Option<TxHash>, StoreError> {
        let row = sqlx::query("SELECT tx_hash FROM pending_transactions WHERE chain_name = $1")
            .bind(chain)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("SQL error reading pending tx for {}: {:?}", chain, e);
                e
            })?;

        match row {
            Some(row) => {
                let value: String = row.get("tx_hash");
                parse_hash(chain, &value).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, chain: &str, hash: TxHash) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pending_transactions (chain_name, tx_hash, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (chain_name)
            DO UPDATE SET tx_hash = EXCLUDED.tx_hash, updated_at = NOW()
            "#,
        )
        .bind(chain)
        .bind(hash.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, chain: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM pending_transactions WHERE chain_name = $1")
            .bind(chain)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
