use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::crawler::error::FetchError;

/// A validated absolute http(s) URL to crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget(Url);

impl CrawlTarget {
    /// Parse and check a user supplied URL
    pub fn parse(input: &str) -> Result<Self, FetchError> {
        let url = Url::parse(input.trim())
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", input, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(FetchError::InvalidUrl(format!(
                "{}: unsupported scheme '{}'",
                input,
                url.scheme()
            )));
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(FetchError::InvalidUrl(format!("{}: missing host", input)));
        }

        Ok(Self(url))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for CrawlTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Page content handed from the fetcher to the extractor
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// URL the page was requested from
    pub url: String,

    /// HTTP status code of the final response
    pub status: u16,

    /// Content type header, if the server sent one
    pub content_type: Option<String>,

    /// Response body, never empty
    pub body: String,
}

/// Star badge shown on the certificate page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(into = "Option<u8>", try_from = "Option<u8>")]
pub enum StarRating {
    Zero,
    One,
    Two,
    Three,
    Four,
    Five,
    #[default]
    None,
}

impl StarRating {
    pub fn from_stars(stars: u32) -> Self {
        match stars {
            0 => StarRating::Zero,
            1 => StarRating::One,
            2 => StarRating::Two,
            3 => StarRating::Three,
            4 => StarRating::Four,
            5 => StarRating::Five,
            _ => StarRating::None,
        }
    }

    pub fn stars(self) -> Option<u8> {
        match self {
            StarRating::Zero => Some(0),
            StarRating::One => Some(1),
            StarRating::Two => Some(2),
            StarRating::Three => Some(3),
            StarRating::Four => Some(4),
            StarRating::Five => Some(5),
            StarRating::None => None,
        }
    }
}

impl From<StarRating> for Option<u8> {
    fn from(rating: StarRating) -> Self {
        rating.stars()
    }
}

impl TryFrom<Option<u8>> for StarRating {
    type Error = String;

    fn try_from(value: Option<u8>) -> Result<Self, Self::Error> {
        match value {
            None => Ok(StarRating::None),
            Some(stars) if stars <= 5 => Ok(StarRating::from_stars(u32::from(stars))),
            Some(stars) => Err(format!("star rating out of range: {}", stars)),
        }
    }
}

impl fmt::Display for StarRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stars() {
            Some(stars) => write!(f, "{}", stars),
            None => f.write_str("none"),
        }
    }
}

/// Registration state of the seal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Valid,
    Expired,
    Revoked,
    #[default]
    Unknown,
}

impl RegistrationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RegistrationStatus::Valid => "valid",
            RegistrationStatus::Expired => "expired",
            RegistrationStatus::Revoked => "revoked",
            RegistrationStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields pulled out of a certificate page; everything but the URL is optional
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub source_url: String,
    pub business_name: Option<String>,
    pub city: Option<String>,

    /// Rating text as found on the page, e.g. "4-star"
    pub raw_rating: Option<String>,
    pub star_rating: Option<StarRating>,

    /// Status badge text as found on the page
    pub raw_status: Option<String>,
    pub registration_status: Option<RegistrationStatus>,
}

/// Canonical persisted record, one per site URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteRecord {
    pub id: String,
    pub url: String,
    pub business_name: String,
    pub city: String,
    pub star_rating: StarRating,
    pub registration_status: RegistrationStatus,
    pub crawled_at: DateTime<Utc>,
    pub version: i64,
}

/// Record fields the collection can be grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    City,
    StarRating,
}

impl GroupField {
    /// Stored document field name
    pub fn field_name(self) -> &'static str {
        match self {
            GroupField::City => "city",
            GroupField::StarRating => "starRating",
        }
    }

    pub fn key_of(self, record: &WebsiteRecord) -> serde_json::Value {
        match self {
            GroupField::City => serde_json::Value::String(record.city.clone()),
            GroupField::StarRating => record
                .star_rating
                .stars()
                .map_or(serde_json::Value::Null, serde_json::Value::from),
        }
    }
}

impl std::str::FromStr for GroupField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "city" => Ok(GroupField::City),
            "star" | "stars" | "starrating" | "star_rating" => Ok(GroupField::StarRating),
            other => Err(format!("cannot group by '{}'", other)),
        }
    }
}

/// Records sharing one value of a [`GroupField`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordGroup {
    pub key: serde_json::Value,
    pub count: u64,
    pub websites: Vec<WebsiteRecord>,
}

impl RecordGroup {
    /// Human readable key, `none` for a missing value
    pub fn label(&self) -> String {
        match &self.key {
            serde_json::Value::Null => "none".to_string(),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
