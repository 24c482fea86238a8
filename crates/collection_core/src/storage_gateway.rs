use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::{
    domain::{ItemId, OwnerId, ResolvedItem},
    protocol::SaveOutcome,
};
use storage::Storage;
use tracing::debug;

use crate::{ItemResolver, PersistenceGateway, StoredOrder, WriteToken};

/// Serves both persistence and item resolution from the local SQLite store.
pub struct StorageGateway {
    store: Storage,
}

impl StorageGateway {
    pub async fn initialize(database_url: &str) -> Result<Arc<Self>> {
        let store = Storage::new(database_url)
            .await
            .with_context(|| format!("failed to open collection storage at '{database_url}'"))?;
        Ok(Self::new(store))
    }

    pub fn new(store: Storage) -> Arc<Self> {
        Arc::new(Self { store })
    }

    pub fn storage(&self) -> &Storage {
        &self.store
    }

    pub fn sqlite_url_for_data_dir(base_dir: &Path) -> String {
        format!("sqlite://{}", base_dir.join("collections.sqlite3").display())
    }
}

#[async_trait]
impl PersistenceGateway for StorageGateway {
    async fn load(&self, owner_id: OwnerId) -> Result<Option<StoredOrder>> {
        let stored = self
            .store
            .load_collection(owner_id)
            .await
            .with_context(|| format!("failed to load collection for owner {}", owner_id.0))?;
        Ok(stored.map(|stored| StoredOrder {
            item_ids: stored.item_ids,
            version: stored.version,
        }))
    }

    async fn save(
        &self,
        owner_id: OwnerId,
        item_ids: &[ItemId],
        token: WriteToken,
    ) -> Result<SaveOutcome> {
        let outcome = self
            .store
            .save_collection_order(owner_id, item_ids, token.version)
            .await
            .with_context(|| {
                format!(
                    "failed to save collection version {} for owner {}",
                    token.version, owner_id.0
                )
            })?;
        debug!(
            owner_id = owner_id.0,
            version = token.version,
            ?outcome,
            "collection order saved"
        );
        Ok(outcome)
    }
}

#[async_trait]
impl ItemResolver for StorageGateway {
    async fn resolve(&self, item_ids: &[ItemId]) -> Result<Vec<ResolvedItem>> {
        self.store
            .load_items(item_ids)
            .await
            .context("failed to resolve collection items")
    }
}

#[cfg(test)]
#[path = "tests/storage_gateway_tests.rs"]
mod tests;
