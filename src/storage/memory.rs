use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::crawler::error::StoreError;
use crate::crawler::model::{GroupField, RecordGroup, WebsiteRecord};
use crate::storage::WebsiteStore;

/// In-process store; one mutex guards the whole map so upserts are atomic
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, WebsiteRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebsiteStore for MemoryStore {
    async fn upsert(&self, record: WebsiteRecord) -> Result<WebsiteRecord, StoreError> {
        let mut records = self.records.lock().await;

        let stored = match records.get(&record.url) {
            Some(existing) => WebsiteRecord {
                id: existing.id.clone(),
                version: existing.version + 1,
                crawled_at: existing.crawled_at.max(record.crawled_at),
                ..record
            },
            None => WebsiteRecord { version: 1, ..record },
        };

        records.insert(stored.url.clone(), stored.clone());
        debug!("Stored {} at version {}", stored.url, stored.version);

        Ok(stored)
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<WebsiteRecord>, StoreError> {
        Ok(self.records.lock().await.get(url).cloned())
    }

    async fn find_all(&self) -> Result<Vec<WebsiteRecord>, StoreError> {
        Ok(self.records.lock().await.values().cloned().collect())
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let mut records = self.records.lock().await;
        let removed = records.len() as u64;
        records.clear();
        Ok(removed)
    }

    async fn group_by(&self, field: GroupField) -> Result<Vec<RecordGroup>, StoreError> {
        let records = self.records.lock().await;

        let mut groups: Vec<RecordGroup> = Vec::new();
        for record in records.values() {
            let key = field.key_of(record);
            match groups.iter_mut().find(|group| group.key == key) {
                Some(group) => {
                    group.count += 1;
                    group.websites.push(record.clone());
                },
                None => groups.push(RecordGroup {
                    key,
                    count: 1,
                    websites: vec![record.clone()],
                }),
            }
        }

        groups.sort_by(|a, b| compare_keys(&a.key, &b.key));
        Ok(groups)
    }
}

/// Null, then numbers, then strings, matching MongoDB's sort order
fn compare_keys(a: &serde_json::Value, b: &serde_json::Value) -> Ordering {
    fn rank(value: &serde_json::Value) -> u8 {
        match value {
            serde_json::Value::Null => 0,
            serde_json::Value::Number(_) => 1,
            _ => 2,
        }
    }

    rank(a).cmp(&rank(b)).then_with(|| match (a, b) {
        (serde_json::Value::Number(x), serde_json::Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (serde_json::Value::String(x), serde_json::Value::String(y)) => x.cmp(y),
        _ => Ordering::Equal,
    })
}
