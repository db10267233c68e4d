//! CSV export of selected record fields.

use anyhow::{Result, Context};
use std::io::Write;
use std::str::FromStr;

use crate::crawler::model::WebsiteRecord;

/// Record field that can be exported as a CSV column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportField {
    Id,
    Url,
    BusinessName,
    City,
    StarRating,
    RegistrationStatus,
    CrawledAt,
    Version,
}

impl ExportField {
    /// Column header, same spelling as the stored field
    pub fn header(self) -> &'static str {
        match self {
            ExportField::Id => "id",
            ExportField::Url => "url",
            ExportField::BusinessName => "businessName",
            ExportField::City => "city",
            ExportField::StarRating => "starRating",
            ExportField::RegistrationStatus => "registrationStatus",
            ExportField::CrawledAt => "crawledAt",
            ExportField::Version => "version",
        }
    }

    fn value(self, record: &WebsiteRecord) -> String {
        match self {
            ExportField::Id => record.id.clone(),
            ExportField::Url => record.url.clone(),
            ExportField::BusinessName => record.business_name.clone(),
            ExportField::City => record.city.clone(),
            ExportField::StarRating => record.star_rating.to_string(),
            ExportField::RegistrationStatus => record.registration_status.to_string(),
            ExportField::CrawledAt => record.crawled_at.to_rfc3339(),
            ExportField::Version => record.version.to_string(),
        }
    }
}

impl FromStr for ExportField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s.trim().chars().filter(|c| *c != '_').collect::<String>().to_lowercase();
        match key.as_str() {
            "id" => Ok(ExportField::Id),
            "url" => Ok(ExportField::Url),
            "businessname" => Ok(ExportField::BusinessName),
            "city" => Ok(ExportField::City),
            "starrating" => Ok(ExportField::StarRating),
            "registrationstatus" => Ok(ExportField::RegistrationStatus),
            "crawledat" => Ok(ExportField::CrawledAt),
            "version" => Ok(ExportField::Version),
            _ => anyhow::bail!("Unknown export field: {}", s.trim()),
        }
    }
}

/// Parse a comma separated field list such as `url,businessName,city`
pub fn parse_fields(list: &str) -> Result<Vec<ExportField>> {
    let fields = list
        .split(',')
        .filter(|name| !name.trim().is_empty())
        .map(ExportField::from_str)
        .collect::<Result<Vec<_>>>()?;

    if fields.is_empty() {
        anyhow::bail!("No export fields given");
    }

    Ok(fields)
}

/// Write a header row followed by one row per record
pub fn write_csv<W: Write>(records: &[WebsiteRecord], fields: &[ExportField], writer: W) -> Result<usize> {
    let mut csv_writer = ::csv::Writer::from_writer(writer);

    csv_writer.write_record(fields.iter().map(|field| field.header()))
        .context("Failed to write CSV header")?;

    for record in records {
        csv_writer.write_record(fields.iter().map(|field| field.value(record)))
            .context(format!("Failed to write CSV row for {}", record.url))?;
    }

    csv_writer.flush().context("Failed to flush CSV output")?;

    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::model::{RegistrationStatus, StarRating};
    use chrono::{TimeZone, Utc};

    fn record(url: &str, business_name: &str, star_rating: StarRating) -> WebsiteRecord {
        WebsiteRecord {
            id: "id-1".to_string(),
            url: url.to_string(),
            business_name: business_name.to_string(),
            city: "Springfield".to_string(),
            star_rating,
            registration_status: RegistrationStatus::Valid,
            crawled_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            version: 2,
        }
    }

    #[test]
    fn test_parse_fields() {
        let fields = parse_fields("url, businessName,star_rating").unwrap();
        assert_eq!(fields, vec![ExportField::Url, ExportField::BusinessName, ExportField::StarRating]);

        assert!(parse_fields("url,owner").is_err());
        assert!(parse_fields(" , ").is_err());
    }

    #[test]
    fn test_write_selected_columns() {
        let records = vec![
            record("https://a.test/1", "Acme Shop", StarRating::Four),
            record("https://a.test/2", "Shop, Inc", StarRating::None),
        ];
        let fields = parse_fields("url,businessName,starRating,crawledAt,version").unwrap();

        let mut output = Vec::new();
        let written = write_csv(&records, &fields, &mut output).unwrap();
        assert_eq!(written, 2);

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "url,businessName,starRating,crawledAt,version");
        assert_eq!(lines[1], "https://a.test/1,Acme Shop,4,2024-03-01T12:00:00+00:00,2");
        assert_eq!(lines[2], "https://a.test/2,\"Shop, Inc\",none,2024-03-01T12:00:00+00:00,2");
    }

    #[test]
    fn test_empty_collection_writes_header_only() {
        let mut output = Vec::new();
        write_csv(&[], &[ExportField::City], &mut output).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "city\n");
    }
}
