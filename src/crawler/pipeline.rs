use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::crawler::error::CrawlError;
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::model::{CrawlTarget, WebsiteRecord};
use crate::crawler::{extractor, mapper, validator};
use crate::storage::WebsiteStore;

/// Runs fetch, extract, validate, map and store for one URL at a time.
///
/// Holds no per-crawl state, so one pipeline can serve any number of
/// concurrent crawls; consistency per URL comes from the store's upsert.
#[derive(Clone)]
pub struct CrawlPipeline {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn WebsiteStore>,
}

impl CrawlPipeline {
    pub fn new(fetcher: Arc<dyn PageFetcher>, store: Arc<dyn WebsiteStore>) -> Self {
        Self { fetcher, store }
    }

    pub fn store(&self) -> &Arc<dyn WebsiteStore> {
        &self.store
    }

    /// Crawl one certificate page and persist its record
    pub async fn crawl(&self, url: &str) -> Result<WebsiteRecord, CrawlError> {
        let result = self.run(url).await;

        match &result {
            Ok(record) => info!(
                "Crawled {} (version {}, {} star, {})",
                record.url, record.version, record.star_rating, record.registration_status
            ),
            Err(e) => error!("Crawl of {} failed at {} stage: {}", url, e.stage(), e),
        }

        result
    }

    async fn run(&self, url: &str) -> Result<WebsiteRecord, CrawlError> {
        let target = CrawlTarget::parse(url)?;

        let document = self.fetcher.fetch(&target).await?;
        debug!("Fetched {} (HTTP {})", document.url, document.status);

        let fields = extractor::extract(&document)?;
        let fields = validator::validate(fields)?;
        let record = mapper::to_record(fields, Utc::now());

        Ok(self.store.upsert(record).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::error::{CrawlStage, ExtractError, FetchError, StoreError};
    use crate::crawler::fetcher::MockPageFetcher;
    use crate::crawler::model::{RawDocument, RegistrationStatus, StarRating};
    use crate::storage::{MemoryStore, MockWebsiteStore};
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    const SEAL_URL: &str = "https://example.com/trust-seal/123";

    fn seal_page(rating: &str) -> String {
        format!(
            r#"<html><head><title>Trust Seal</title></head><body>
                <table>
                    <tr><th>Business Name</th><td>Acme Shop</td></tr>
                    <tr><th>City</th><td>Springfield</td></tr>
                    <tr><th>Rating</th><td>{}</td></tr>
                    <tr><th>Status</th><td>valid</td></tr>
                </table>
            </body></html>"#,
            rating
        )
    }

    fn document(url: &str, body: String) -> RawDocument {
        RawDocument {
            url: url.to_string(),
            status: 200,
            content_type: Some("text/html".to_string()),
            body,
        }
    }

    /// Fetcher serving whatever page is currently set
    struct StaticFetcher {
        body: Mutex<String>,
    }

    impl StaticFetcher {
        fn new(body: String) -> Self {
            Self { body: Mutex::new(body) }
        }

        fn set(&self, body: String) {
            *self.body.lock().unwrap() = body;
        }
    }

    #[async_trait::async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, target: &CrawlTarget) -> Result<RawDocument, FetchError> {
            let body = self.body.lock().unwrap().clone();
            Ok(document(target.as_str(), body))
        }
    }

    #[tokio::test]
    async fn test_first_crawl_then_recrawl() {
        let fetcher = Arc::new(StaticFetcher::new(seal_page("4-star")));
        let store = Arc::new(MemoryStore::new());
        let pipeline = CrawlPipeline::new(fetcher.clone(), store.clone());

        let first = pipeline.crawl(SEAL_URL).await.unwrap();
        assert_eq!(first.url, SEAL_URL);
        assert_eq!(first.business_name, "Acme Shop");
        assert_eq!(first.city, "Springfield");
        assert_eq!(first.star_rating, StarRating::Four);
        assert_eq!(first.registration_status, RegistrationStatus::Valid);
        assert_eq!(first.version, 1);

        fetcher.set(seal_page("5-star"));
        let second = pipeline.crawl(SEAL_URL).await.unwrap();
        assert_eq!(second.star_rating, StarRating::Five);
        assert_eq!(second.version, 2);
        assert_eq!(second.id, first.id);
        assert!(second.crawled_at >= first.crawled_at);

        let all = store.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], second);
    }

    #[tokio::test]
    async fn test_identical_recrawl_increments_version_by_one() {
        let fetcher = Arc::new(StaticFetcher::new(seal_page("4-star")));
        let store = Arc::new(MemoryStore::new());
        let pipeline = CrawlPipeline::new(fetcher, store.clone());

        for expected in 1..=3 {
            let record = pipeline.crawl(SEAL_URL).await.unwrap();
            assert_eq!(record.version, expected);
        }
        assert_eq!(store.find_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_crawls_of_one_url() {
        let fetcher = Arc::new(StaticFetcher::new(seal_page("3-star")));
        let store = Arc::new(MemoryStore::new());
        let pipeline = CrawlPipeline::new(fetcher, store.clone());

        let crawls = (0..10).map(|_| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.crawl(SEAL_URL).await })
        });

        let mut latest = None;
        let mut returned = Vec::new();
        for handle in futures::future::join_all(crawls).await {
            let record = handle.unwrap().unwrap();
            if record.version == 10 {
                latest = Some(record.clone());
            }
            returned.push(record);
        }

        let all = store.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].version, 10);
        assert_eq!(Some(all[0].clone()), latest);
        assert!(returned.iter().all(|record| all[0].crawled_at >= record.crawled_at));
    }

    #[tokio::test]
    async fn test_fetch_timeout_leaves_store_untouched() {
        let mut fetcher = MockPageFetcher::new();
        fetcher.expect_fetch().times(1).returning(|_| Err(FetchError::Timeout));

        let mut store = MockWebsiteStore::new();
        store.expect_upsert().never();

        let pipeline = CrawlPipeline::new(Arc::new(fetcher), Arc::new(store));
        let error = assert_err!(pipeline.crawl(SEAL_URL).await);

        assert_eq!(error, CrawlError::Fetch(FetchError::Timeout));
        assert_eq!(error.stage(), CrawlStage::Fetch);
    }

    #[tokio::test]
    async fn test_invalid_url_fails_before_fetching() {
        let mut fetcher = MockPageFetcher::new();
        fetcher.expect_fetch().never();

        let pipeline = CrawlPipeline::new(Arc::new(fetcher), Arc::new(MemoryStore::new()));
        let error = assert_err!(pipeline.crawl("mailto:owner@example.com").await);

        assert!(matches!(error, CrawlError::Fetch(FetchError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_unrecognized_page_is_an_extract_failure() {
        let mut fetcher = MockPageFetcher::new();
        fetcher.expect_fetch().returning(|target| {
            Ok(document(target.as_str(), "<html><body><p>Just a blog</p></body></html>".to_string()))
        });

        let store = Arc::new(MemoryStore::new());
        let pipeline = CrawlPipeline::new(Arc::new(fetcher), store.clone());
        let error = assert_err!(pipeline.crawl(SEAL_URL).await);

        assert!(matches!(error, CrawlError::Extract(ExtractError::UnrecognizedDocument(_))));
        assert!(store.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_tagged() {
        let mut fetcher = MockPageFetcher::new();
        fetcher.expect_fetch().returning(|target| Ok(document(target.as_str(), seal_page("2-star"))));

        let mut store = MockWebsiteStore::new();
        store.expect_upsert()
            .times(1)
            .returning(|_| Err(StoreError::ConnectionLost("socket closed".to_string())));

        let pipeline = CrawlPipeline::new(Arc::new(fetcher), Arc::new(store));
        let error = assert_err!(pipeline.crawl(SEAL_URL).await);

        assert_eq!(error.stage(), CrawlStage::Store);
        assert!(matches!(error, CrawlError::Store(StoreError::ConnectionLost(_))));
    }

    #[tokio::test]
    async fn test_page_without_optional_fields_gets_defaults() {
        let mut fetcher = MockPageFetcher::new();
        fetcher.expect_fetch().returning(|target| {
            Ok(document(target.as_str(), r#"<div class="trust-seal"><p>City: Springfield</p></div>"#.to_string()))
        });

        let pipeline = CrawlPipeline::new(Arc::new(fetcher), Arc::new(MemoryStore::new()));
        let record = assert_ok!(pipeline.crawl(SEAL_URL).await);

        assert_eq!(record.city, "Springfield");
        assert_eq!(record.business_name, "unknown");
        assert_eq!(record.star_rating, StarRating::None);
        assert_eq!(record.registration_status, RegistrationStatus::Unknown);
    }
}
