//! JSON file store
//!
//! The whole map is rewritten on every change through a temp file and a
//! rename, so a crash never leaves a half-written store behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use alloy::primitives::TxHash;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{parse_hash, PendingStore, StoreError};

pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or start) the store at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(raw) if raw.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), entries = entries.len(), "Opened pending-tx file store");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(entries)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl PendingStore for FileStore {
    async fn get(&self, chain: &str) -> Result<Option<TxHash>, StoreError> {
        let entries = self.entries.lock().await;
        entries
            .get(chain)
            .map(|value| parse_hash(chain, value))
            .transpose()
    }

    async fn set(&self, chain: &str, hash: TxHash) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        next.insert(chain.to_string(), hash.to_string());
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }

    /// Memory only changes once the file has been rewritten
    async fn delete(&self, chain: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(chain) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(chain);
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }
}
