use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use crate::crawler::error::ValidationError;
use crate::crawler::model::{ExtractedFields, RegistrationStatus, StarRating};

/// Normalize extracted fields and resolve raw tokens into closed enums
pub fn validate(mut fields: ExtractedFields) -> Result<ExtractedFields, ValidationError> {
    if fields.source_url.trim().is_empty() {
        return Err(ValidationError::MissingRequiredField("source_url"));
    }
    fields.source_url = fields.source_url.trim().to_string();

    fields.business_name = fields.business_name.as_deref().and_then(normalize_business_name);
    fields.city = fields.city.as_deref().and_then(normalize_city);

    if let Some(token) = &fields.raw_rating {
        let rating = parse_star_rating(token);
        debug!("Rating token {:?} -> {}", token, rating);
        fields.star_rating = Some(rating);
    }

    if let Some(token) = &fields.raw_status {
        let status = parse_registration_status(token);
        debug!("Status token {:?} -> {}", token, status);
        fields.registration_status = Some(status);
    }

    Ok(fields)
}

/// Map a rating token such as "4-star", "۴ ستاره" or "★★★" to a rating.
/// Anything unreadable or out of range becomes [`StarRating::None`].
pub fn parse_star_rating(token: &str) -> StarRating {
    let token = normalize_digits(token);

    let filled = token.chars().filter(|c| *c == '★').count();
    if filled > 0 {
        return u32::try_from(filled).map_or(StarRating::None, StarRating::from_stars);
    }

    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(number) = NUMBER.get_or_init(|| Regex::new(r"[0-9]+").ok()) else {
        return StarRating::None;
    };

    number
        .find(&token)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map_or(StarRating::None, StarRating::from_stars)
}

/// Map a status badge to a registration status by keyword.
/// Negated forms ("inactive", "غیرفعال") are checked before the positive words they contain.
pub fn parse_registration_status(token: &str) -> RegistrationStatus {
    let token = token.to_lowercase();

    if contains_any(&token, &["revoked", "revoke", "suspended", "ابطال", "لغو", "تعلیق"]) {
        RegistrationStatus::Revoked
    } else if contains_any(&token, &["expired", "expire", "منقضی", "پایان اعتبار"]) {
        RegistrationStatus::Expired
    } else if contains_any(&token, &[
        "invalid", "not valid", "inactive", "not active", "deactivated", "unverified", "not verified",
        "نامعتبر", "غیرفعال", "غیر فعال", "غیر معتبر",
    ]) {
        RegistrationStatus::Unknown
    } else if contains_any(&token, &["valid", "active", "verified", "معتبر", "فعال"]) {
        RegistrationStatus::Valid
    } else {
        RegistrationStatus::Unknown
    }
}

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|word| text.contains(*word))
}

fn normalize_business_name(raw: &str) -> Option<String> {
    let name = collapse(raw.trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace()));
    if name.is_empty() {
        return None;
    }

    let has_letters = name.chars().any(char::is_alphabetic);
    let shouting = has_letters && name.chars().filter(|c| c.is_alphabetic()).all(char::is_uppercase);
    Some(if shouting { title_case(&name) } else { name })
}

fn normalize_city(raw: &str) -> Option<String> {
    let city = collapse(raw);
    (!city.is_empty()).then(|| title_case(&city))
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replace Persian and Arabic-Indic digits with ASCII ones
fn normalize_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '۰'..='۹' => char::from(b'0' + (c as u32 - '۰' as u32) as u8),
            '٠'..='٩' => char::from(b'0' + (c as u32 - '٠' as u32) as u8),
            other => other,
        })
        .collect()
}
