pub mod memory;
pub mod mongo;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::cli::config::StorageSettings;
use crate::crawler::error::StoreError;
use crate::crawler::model::{GroupField, RecordGroup, WebsiteRecord};

// Re-export common types
pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Durable collection of website records, keyed by URL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebsiteStore: Send + Sync {
    /// Insert the record, or overwrite the one with the same URL keeping its
    /// id and bumping its version. Returns the stored record.
    async fn upsert(&self, record: WebsiteRecord) -> Result<WebsiteRecord, StoreError>;

    /// Get a record by URL
    async fn find_by_url(&self, url: &str) -> Result<Option<WebsiteRecord>, StoreError>;

    /// List every record ordered by URL
    async fn find_all(&self) -> Result<Vec<WebsiteRecord>, StoreError>;

    /// Delete every record, returning how many were removed
    async fn delete_all(&self) -> Result<u64, StoreError>;

    /// Group records by a field, ordered by key
    async fn group_by(&self, field: GroupField) -> Result<Vec<RecordGroup>, StoreError>;
}

/// Factory for creating a WebsiteStore implementation
pub struct StoreFactory;

impl StoreFactory {
    /// Create a new store based on the settings
    pub async fn create(settings: &StorageSettings) -> Result<Arc<dyn WebsiteStore>> {
        match settings.storage_type.as_str() {
            "mongodb" => {
                let store = MongoStore::new(settings).await?;
                Ok(Arc::new(store))
            },
            "memory" => Ok(Arc::new(MemoryStore::new())),
            _ => {
                anyhow::bail!("Unsupported storage type: {}", settings.storage_type);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_factory_memory_store() {
        let settings = StorageSettings {
            storage_type: "memory".to_string(),
            ..Default::default()
        };

        let store = StoreFactory::create(&settings).await.unwrap();
        assert!(store.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_factory_rejects_unknown_type() {
        let settings = StorageSettings {
            storage_type: "cassandra".to_string(),
            ..Default::default()
        };

        assert!(StoreFactory::create(&settings).await.is_err());
    }
}
