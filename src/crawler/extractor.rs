//! Marker based extraction of certificate page fields.
//!
//! Each field has a named rule: dedicated CSS markers are tried first, then
//! label lookups ("City: Springfield", `<th>شهر</th><td>...</td>`). A field
//! whose markers are all missing is left empty rather than failing the page.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::crawler::error::ExtractError;
use crate::crawler::model::{ExtractedFields, RawDocument};

/// Lookup rule for one certificate field.
///
/// `generic_*` markers also show up on ordinary shop and review pages, so a
/// value found only through them does not make a page a certificate page.
struct FieldRule {
    name: &'static str,
    selectors: &'static [&'static str],
    labels: &'static [&'static str],
    generic_selectors: &'static [&'static str],
    generic_labels: &'static [&'static str],
}

const BUSINESS_NAME: FieldRule = FieldRule {
    name: "business_name",
    selectors: &["[data-field=\"business-name\"]", ".business-name", "#business-name", "#businessName"],
    labels: &["business name", "نام کسب و کار", "نام کسب وکار", "نام صاحب امتیاز"],
    generic_selectors: &[],
    generic_labels: &["business", "owner"],
};

const CITY: FieldRule = FieldRule {
    name: "city",
    selectors: &["[data-field=\"city\"]", ".city", "#city"],
    labels: &["city", "شهر", "استان / شهر", "استان/شهر"],
    generic_selectors: &[],
    generic_labels: &[],
};

const STAR_RATING: FieldRule = FieldRule {
    name: "star_rating",
    selectors: &["[data-field=\"star-rating\"]", ".star-rating", "#star-rating"],
    labels: &["star rating", "تعداد ستاره"],
    generic_selectors: &[".rating"],
    generic_labels: &["rating", "stars", "ستاره"],
};

const REGISTRATION_STATUS: FieldRule = FieldRule {
    name: "registration_status",
    selectors: &["[data-field=\"registration-status\"]", ".registration-status", "#registration-status"],
    labels: &["registration status", "وضعیت نماد"],
    generic_selectors: &[".status-badge"],
    generic_labels: &["status", "وضعیت"],
};

/// Value found for a field and whether a certificate-specific marker produced it
struct FieldMatch {
    value: String,
    specific: bool,
}

/// Elements that may carry a field label
const LABEL_SCOPE: &str = "th, td, dt, label, span, strong, b, p, li, div";

/// Star icons counted when no rating text is present; images are filtered by file name
const STAR_ICONS: &str = ".star-icon, i.fa-star";

/// Markers identifying a page as a trust-seal page even without field values
const SEAL_MARKERS: &str = ".trust-seal, #trust-seal, [class*=\"enamad\"], [id*=\"enamad\"], img[src*=\"enamad\"]";

const SEAL_TITLE_WORDS: &[&str] = &["enamad", "trust seal", "trust-seal", "اینماد", "نماد اعتماد"];

/// Value attributes read when a marker element has no text
const VALUE_ATTRIBUTES: &[&str] = &["data-value", "title", "alt"];

/// Extract certificate fields from a fetched page
pub fn extract(doc: &RawDocument) -> Result<ExtractedFields, ExtractError> {
    if doc.body.trim().is_empty() {
        return Err(ExtractError::UnrecognizedDocument("empty body".to_string()));
    }

    if let Some(content_type) = &doc.content_type {
        if !content_type.to_lowercase().contains("html") {
            return Err(ExtractError::UnrecognizedDocument(format!(
                "unsupported content type '{}'",
                content_type
            )));
        }
    }

    if !doc.body.contains('<') {
        return Err(ExtractError::UnrecognizedDocument("payload contains no markup".to_string()));
    }

    let html = Html::parse_document(&doc.body);

    let business_name = apply_rule(&html, &BUSINESS_NAME);
    let city = apply_rule(&html, &CITY);
    let rating = apply_rule(&html, &STAR_RATING);
    let status = apply_rule(&html, &REGISTRATION_STATUS);

    let specific = [&business_name, &city, &rating, &status]
        .into_iter()
        .flatten()
        .any(|found| found.specific);

    if !specific && !has_seal_marker(&html) {
        return Err(ExtractError::UnrecognizedDocument(
            "no certificate markers found".to_string(),
        ));
    }

    let mut fields = ExtractedFields {
        source_url: doc.url.clone(),
        business_name: business_name.map(|m| m.value),
        city: city.map(|m| m.value),
        raw_rating: rating.map(|m| m.value),
        raw_status: status.map(|m| m.value),
        ..Default::default()
    };

    if fields.raw_rating.is_none() {
        fields.raw_rating = count_star_icons(&html).map(|stars| format!("{}-star", stars));
    }

    debug!(
        "Extracted from {}: name={:?} city={:?} rating={:?} status={:?}",
        fields.source_url, fields.business_name, fields.city, fields.raw_rating, fields.raw_status
    );

    Ok(fields)
}

fn apply_rule(html: &Html, rule: &FieldRule) -> Option<FieldMatch> {
    let specific = by_selector(html, rule.selectors)
        .or_else(|| by_label(html, rule.labels))
        .map(|value| FieldMatch { value, specific: true });

    let found = specific.or_else(|| {
        by_selector(html, rule.generic_selectors)
            .or_else(|| by_label(html, rule.generic_labels))
            .map(|value| FieldMatch { value, specific: false })
    });

    if found.is_none() {
        debug!("No marker found for {}", rule.name);
    }
    found
}

fn by_selector(html: &Html, selectors: &[&str]) -> Option<String> {
    for raw in selectors {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };

        for element in html.select(&selector) {
            if let Some(text) = non_empty(&element_text(&element)) {
                return Some(text);
            }

            let attribute = VALUE_ATTRIBUTES
                .iter()
                .filter_map(|name| element.value().attr(name))
                .find_map(non_empty);
            if attribute.is_some() {
                return attribute;
            }
        }
    }
    None
}

fn by_label(html: &Html, labels: &[&str]) -> Option<String> {
    let selector = Selector::parse(LABEL_SCOPE).ok()?;

    for element in html.select(&selector) {
        let text = normalize_label(&element_text(&element));
        if text.is_empty() {
            continue;
        }

        for label in labels {
            let label = normalize_label(label);

            if text == label {
                if let Some(value) = sibling_value(&element) {
                    return Some(value);
                }
            } else if is_text_only(&element) {
                // Inline "Label: value" inside a single element
                if let Some(value) = inline_value(&element_text(&element), &label) {
                    return Some(value);
                }
            }
        }
    }
    None
}

/// First non-empty text following the label element within its parent
fn sibling_value(element: &ElementRef) -> Option<String> {
    element.next_siblings().find_map(|node| {
        if let Some(text) = node.value().as_text() {
            non_empty(text)
        } else {
            ElementRef::wrap(node).and_then(|sibling| non_empty(&element_text(&sibling)))
        }
    })
}

fn inline_value(text: &str, label: &str) -> Option<String> {
    let (head, tail) = text.split_once([':', '：'])?;
    if normalize_label(head) == label {
        non_empty(tail)
    } else {
        None
    }
}

fn count_star_icons(html: &Html) -> Option<usize> {
    let icons = Selector::parse(STAR_ICONS).ok()?;
    let images = Selector::parse("img[src]").ok()?;

    let count = html.select(&icons).count()
        + html
            .select(&images)
            .filter(|image| image.value().attr("src").is_some_and(is_star_image))
            .count();
    (count > 0).then_some(count)
}

/// `star.png`, `star-full.svg`, `rating_star.gif`; not `start.png` or `starbucks.png`
fn is_star_image(src: &str) -> bool {
    let path = src.split(['?', '#']).next().unwrap_or_default();
    let file = path.rsplit('/').next().unwrap_or_default().to_lowercase();
    let stem = file.split('.').next().unwrap_or_default();

    stem == "star"
        || stem.starts_with("star-")
        || stem.starts_with("star_")
        || stem.ends_with("-star")
        || stem.ends_with("_star")
}

fn has_seal_marker(html: &Html) -> bool {
    if let Ok(selector) = Selector::parse(SEAL_MARKERS) {
        if html.select(&selector).next().is_some() {
            return true;
        }
    }

    let Ok(title) = Selector::parse("title") else {
        return false;
    };

    html.select(&title).any(|element| {
        let text = element_text(&element).to_lowercase();
        SEAL_TITLE_WORDS.iter().any(|word| text.contains(word))
    })
}

fn is_text_only(element: &ElementRef) -> bool {
    element.children().all(|child| child.value().is_text())
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

fn non_empty(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Lowercase, collapse whitespace (ZWNJ included) and drop a trailing colon
fn normalize_label(text: &str) -> String {
    text.replace('\u{200c}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches([':', '：'])
        .trim()
        .to_lowercase()
}
