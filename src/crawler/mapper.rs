use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::crawler::model::{ExtractedFields, WebsiteRecord};

/// Placeholder stored for text fields the page did not carry
pub const UNKNOWN: &str = "unknown";

/// Build the canonical record for validated fields.
///
/// The returned record is what a first insert would store: fresh id and
/// `version` 1. The store keeps the existing id and bumps the version when
/// the URL is already known.
pub fn to_record(fields: ExtractedFields, now: DateTime<Utc>) -> WebsiteRecord {
    WebsiteRecord {
        id: Uuid::new_v4().to_string(),
        url: fields.source_url,
        business_name: fields.business_name.unwrap_or_else(|| UNKNOWN.to_string()),
        city: fields.city.unwrap_or_else(|| UNKNOWN.to_string()),
        star_rating: fields.star_rating.unwrap_or_default(),
        registration_status: fields.registration_status.unwrap_or_default(),
        crawled_at: now,
        version: 1,
    }
}
