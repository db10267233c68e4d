use std::fmt;
use thiserror::Error;

/// Network and URL level failures raised by the fetcher
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("remote returned HTTP {0}")]
    HttpError(u16),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("remote returned an empty body")]
    EmptyBody,
}

impl FetchError {
    /// Whether another attempt could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::ConnectionFailed(_) => true,
            FetchError::HttpError(status) => (500..600).contains(status),
            FetchError::InvalidUrl(_) | FetchError::EmptyBody => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = error.status() {
            FetchError::HttpError(status.as_u16())
        } else {
            FetchError::ConnectionFailed(error.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("document is not a certificate page: {0}")]
    UnrecognizedDocument(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),
}

/// Persistence failures; none of them leave a partial write behind
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store connection lost: {0}")]
    ConnectionLost(String),

    #[error("store constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("record could not be (de)serialized: {0}")]
    Serialization(String),
}

/// Pipeline stage a crawl failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlStage {
    Fetch,
    Extract,
    Validate,
    Store,
}

impl fmt::Display for CrawlStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrawlStage::Fetch => "fetch",
            CrawlStage::Extract => "extract",
            CrawlStage::Validate => "validate",
            CrawlStage::Store => "store",
        };
        f.write_str(name)
    }
}

/// First failure of a crawl, tagged with the stage that produced it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrawlError {
    #[error("fetch stage failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("extract stage failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("validate stage failed: {0}")]
    Validate(#[from] ValidationError),

    #[error("store stage failed: {0}")]
    Store(#[from] StoreError),
}

impl CrawlError {
    pub fn stage(&self) -> CrawlStage {
        match self {
            CrawlError::Fetch(_) => CrawlStage::Fetch,
            CrawlError::Extract(_) => CrawlStage::Extract,
            CrawlError::Validate(_) => CrawlStage::Validate,
            CrawlError::Store(_) => CrawlStage::Store,
        }
    }
}
