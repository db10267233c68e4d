use anyhow::{Result, Context};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{Client, Collection, IndexModel};
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument};
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::cli::config::StorageSettings;
use crate::crawler::error::StoreError;
use crate::crawler::model::{GroupField, RecordGroup, RegistrationStatus, StarRating, WebsiteRecord};
use crate::storage::WebsiteStore;

const DUPLICATE_KEY: i32 = 11000;

/// Collection document. `crawledAt` is a BSON date so `$max` compares instants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredWebsite {
    id: String,
    url: String,
    business_name: String,
    city: String,
    star_rating: StarRating,
    registration_status: RegistrationStatus,
    crawled_at: bson::DateTime,
    version: i64,
}

impl From<&WebsiteRecord> for StoredWebsite {
    fn from(record: &WebsiteRecord) -> Self {
        Self {
            id: record.id.clone(),
            url: record.url.clone(),
            business_name: record.business_name.clone(),
            city: record.city.clone(),
            star_rating: record.star_rating,
            registration_status: record.registration_status,
            crawled_at: bson_date(&record.crawled_at),
            version: record.version,
        }
    }
}

impl TryFrom<StoredWebsite> for WebsiteRecord {
    type Error = StoreError;

    fn try_from(stored: StoredWebsite) -> Result<Self, StoreError> {
        let crawled_at = DateTime::<Utc>::from_timestamp_millis(stored.crawled_at.timestamp_millis())
            .ok_or_else(|| StoreError::Serialization(format!("crawledAt out of range for {}", stored.url)))?;

        Ok(WebsiteRecord {
            id: stored.id,
            url: stored.url,
            business_name: stored.business_name,
            city: stored.city,
            star_rating: stored.star_rating,
            registration_status: stored.registration_status,
            crawled_at,
            version: stored.version,
        })
    }
}

fn bson_date(time: &DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(time.timestamp_millis())
}

/// MongoDB implementation of WebsiteStore
pub struct MongoStore {
    collection: Collection<StoredWebsite>,
}

impl MongoStore {
    /// Connect, check the server answers and make sure the url index exists
    pub async fn new(settings: &StorageSettings) -> Result<Self> {
        let client_options = ClientOptions::parse(&settings.connection_string)
            .await
            .context(format!("Failed to parse MongoDB connection string: {}", settings.connection_string))?;

        let client = Client::with_options(client_options)
            .context("Failed to create MongoDB client")?;

        let database = client.database(&settings.database_name);

        database.run_command(doc! { "ping": 1 }, None)
            .await
            .context("Failed to connect to MongoDB")?;

        debug!("Connected to MongoDB database: {}", settings.database_name);

        let store = Self {
            collection: database.collection(&settings.collection_name),
        };
        store.ensure_indexes().await?;

        Ok(store)
    }

    /// Unique index backing the one-record-per-url guarantee
    async fn ensure_indexes(&self) -> Result<()> {
        let index = IndexModel::builder()
            .keys(doc! { "url": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        self.collection.create_index(index, None)
            .await
            .context("Failed to create unique url index")?;

        Ok(())
    }

    fn upsert_update(record: &WebsiteRecord) -> Result<Document, StoreError> {
        let star_rating = bson::to_bson(&record.star_rating)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        // crawledAt only moves forward, whichever concurrent write lands last
        Ok(doc! {
            "$set": {
                "businessName": record.business_name.as_str(),
                "city": record.city.as_str(),
                "starRating": star_rating,
                "registrationStatus": record.registration_status.as_str(),
            },
            "$max": { "crawledAt": bson_date(&record.crawled_at) },
            "$setOnInsert": { "id": record.id.as_str() },
            "$inc": { "version": 1_i64 },
        })
    }

    fn upsert_options() -> FindOneAndUpdateOptions {
        FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build()
    }

    async fn upsert_once(&self, filter: &Document, update: &Document) -> Result<Option<StoredWebsite>, MongoError> {
        self.collection
            .find_one_and_update(filter.clone(), update.clone(), Self::upsert_options())
            .await
    }
}

fn is_duplicate_key(error: &MongoError) -> bool {
    match error.kind.as_ref() {
        ErrorKind::Command(command) => command.code == DUPLICATE_KEY,
        ErrorKind::Write(WriteFailure::WriteError(write)) => write.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn store_error(error: MongoError) -> StoreError {
    if is_duplicate_key(&error) {
        return StoreError::ConstraintViolation(error.to_string());
    }

    match error.kind.as_ref() {
        ErrorKind::BsonDeserialization(_) | ErrorKind::BsonSerialization(_) => {
            StoreError::Serialization(error.to_string())
        },
        _ => StoreError::ConnectionLost(error.to_string()),
    }
}

fn group_from_document(document: &Document) -> Result<RecordGroup, StoreError> {
    let key = document.get("_id").cloned().unwrap_or(Bson::Null).into_relaxed_extjson();

    let count = match document.get("count") {
        Some(Bson::Int32(n)) => u64::try_from(*n).unwrap_or_default(),
        Some(Bson::Int64(n)) => u64::try_from(*n).unwrap_or_default(),
        _ => 0,
    };

    let data = document.get_array("data")
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    let websites = data.iter()
        .filter_map(|entry| entry.as_document())
        .map(|entry| {
            bson::from_document::<StoredWebsite>(entry.clone())
                .map_err(|e| StoreError::Serialization(e.to_string()))
                .and_then(WebsiteRecord::try_from)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RecordGroup { key, count, websites })
}

#[async_trait]
impl WebsiteStore for MongoStore {
    async fn upsert(&self, record: WebsiteRecord) -> Result<WebsiteRecord, StoreError> {
        let filter = doc! { "url": record.url.as_str() };
        let update = Self::upsert_update(&record)?;

        let stored = match self.upsert_once(&filter, &update).await {
            Ok(stored) => stored,
            // Two first-time upserts of one url can race on the unique index;
            // the loser retries and lands on the update path
            Err(e) if is_duplicate_key(&e) => {
                warn!("Duplicate key while upserting {}, retrying once", record.url);
                self.upsert_once(&filter, &update).await.map_err(store_error)?
            },
            Err(e) => return Err(store_error(e)),
        };

        // upsert with ReturnDocument::After always yields a document
        let stored = stored.ok_or_else(|| {
            StoreError::ConstraintViolation(format!("upsert of {} returned no document", record.url))
        })?;
        let stored = WebsiteRecord::try_from(stored)?;

        debug!("Stored {} at version {}", stored.url, stored.version);

        Ok(stored)
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<WebsiteRecord>, StoreError> {
        self.collection.find_one(doc! { "url": url }, None)
            .await
            .map_err(store_error)?
            .map(WebsiteRecord::try_from)
            .transpose()
    }

    async fn find_all(&self) -> Result<Vec<WebsiteRecord>, StoreError> {
        let options = FindOptions::builder().sort(doc! { "url": 1 }).build();

        let cursor = self.collection.find(None, options)
            .await
            .map_err(store_error)?;

        let stored: Vec<StoredWebsite> = cursor.try_collect().await.map_err(store_error)?;
        stored.into_iter().map(WebsiteRecord::try_from).collect()
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let result = self.collection.delete_many(doc! {}, None)
            .await
            .map_err(store_error)?;

        debug!("Deleted {} records", result.deleted_count);

        Ok(result.deleted_count)
    }

    async fn group_by(&self, field: GroupField) -> Result<Vec<RecordGroup>, StoreError> {
        let pipeline = vec![
            doc! {
                "$group": {
                    "_id": format!("${}", field.field_name()),
                    "count": { "$sum": 1 },
                    "data": { "$push": "$$ROOT" },
                }
            },
            doc! { "$sort": { "_id": 1 } },
        ];

        let documents: Vec<Document> = self.collection.aggregate(pipeline, None)
            .await
            .map_err(store_error)?
            .try_collect()
            .await
            .map_err(store_error)?;

        documents.iter().map(group_from_document).collect()
    }
}
