//! Sample-based field type inference for unmapped columns.
//!
//! Up to [`SAMPLE_SIZE`] non-blank values are examined. Tests run in a fixed
//! priority order and the first match wins, so a column holding addresses
//! like `a@b.com` is always `Email` even when later rules could also apply.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::{schema::FieldType, tokenizer::CsvDocument};

pub const SAMPLE_SIZE: usize = 20;
pub const NUMBER_PRECISION: u32 = 18;

const TEXT_SHORT: u32 = 80;
const TEXT_DEFAULT: u32 = 255;
const LONG_TEXT_DEFAULT: u32 = 32_768;
const LONG_TEXT_MAX: u32 = 131_072;
const PHONE_MIN_LEN: usize = 10;

const BOOLEAN_TOKENS: &[&str] = &["true", "false", "yes", "no", "1", "0"];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Proposed type plus the sizing parameters field creation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferredType {
    pub field_type: FieldType,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

impl InferredType {
    fn plain(field_type: FieldType) -> Self {
        Self {
            field_type,
            length: None,
            precision: None,
            scale: None,
        }
    }

    fn sized(field_type: FieldType, length: u32) -> Self {
        Self {
            length: Some(length),
            ..Self::plain(field_type)
        }
    }

    fn number(scale: u32) -> Self {
        Self {
            precision: Some(NUMBER_PRECISION),
            scale: Some(scale),
            ..Self::plain(FieldType::Number)
        }
    }
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"))
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9\s\-+().]+$").expect("phone pattern"))
}

pub fn looks_like_email(value: &str) -> bool {
    email_pattern().is_match(value)
}

/// Digits with spacing or punctuation, at least ten characters and ten digits.
///
/// The digit count keeps ISO dates such as `2024-01-31` out of this class. It
/// also rejects short numbers padded by punctuation, so `555-123-456` (nine
/// digits) is not a phone even though it is ten characters long.
pub fn looks_like_phone(value: &str) -> bool {
    value.chars().count() >= PHONE_MIN_LEN
        && phone_pattern().is_match(value)
        && value.chars().filter(char::is_ascii_digit).count() >= PHONE_MIN_LEN
}

pub fn looks_like_url(value: &str) -> bool {
    let lowered = value.to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}

pub fn is_boolean_token(value: &str) -> bool {
    let lowered = value.to_ascii_lowercase();
    BOOLEAN_TOKENS.contains(&lowered.as_str())
}

pub fn is_number(value: &str) -> bool {
    value.parse::<f64>().is_ok_and(f64::is_finite)
}

pub fn is_date_like(value: &str) -> bool {
    if DateTime::parse_from_rfc3339(value).is_ok() {
        return true;
    }
    DATE_FORMATS
        .iter()
        .any(|fmt| NaiveDate::parse_from_str(value, fmt).is_ok())
        || DATETIME_FORMATS
            .iter()
            .any(|fmt| NaiveDateTime::parse_from_str(value, fmt).is_ok())
}

/// First [`SAMPLE_SIZE`] non-blank values of `header`, trimmed.
pub fn sample_column<'a>(doc: &'a CsvDocument, header: &str) -> Vec<&'a str> {
    doc.column_values(header)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .take(SAMPLE_SIZE)
        .collect()
}

pub fn infer_column(doc: &CsvDocument, header: &str) -> InferredType {
    infer_from_samples(&sample_column(doc, header))
}

pub fn infer_from_samples(samples: &[&str]) -> InferredType {
    if samples.is_empty() {
        return InferredType::sized(FieldType::Text, TEXT_DEFAULT);
    }
    if samples.iter().any(|v| looks_like_email(v)) {
        return InferredType::plain(FieldType::Email);
    }
    if samples.iter().any(|v| looks_like_phone(v)) {
        return InferredType::plain(FieldType::Phone);
    }
    if samples.iter().any(|v| looks_like_url(v)) {
        return InferredType::plain(FieldType::Url);
    }
    if samples.iter().all(|v| is_boolean_token(v)) {
        return InferredType::plain(FieldType::Checkbox);
    }
    if samples.iter().all(|v| is_number(v)) {
        let scale = if samples.iter().any(|v| v.contains('.')) { 2 } else { 0 };
        return InferredType::number(scale);
    }
    if samples.iter().any(|v| is_date_like(v)) {
        return InferredType::plain(FieldType::Date);
    }

    let longest = samples
        .iter()
        .map(|v| v.chars().count())
        .max()
        .unwrap_or_default();
    match longest {
        0..=80 => InferredType::sized(FieldType::Text, TEXT_SHORT),
        81..=255 => InferredType::sized(FieldType::Text, TEXT_DEFAULT),
        256..=32_768 => InferredType::sized(FieldType::LongTextArea, LONG_TEXT_DEFAULT),
        _ => InferredType::sized(FieldType::LongTextArea, LONG_TEXT_MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_column_defaults_to_text_255() {
        let inferred = infer_from_samples(&[]);
        assert_eq!(inferred.field_type, FieldType::Text);
        assert_eq!(inferred.length, Some(255));
    }

    #[test]
    fn iso_dates_are_not_phones() {
        assert!(!looks_like_phone("2024-01-31"));
        assert!(!looks_like_phone("555-123-456"));
        assert!(looks_like_phone("(555) 123-4567"));
        assert!(looks_like_phone("+44 20 7946 0958"));
    }

    #[test]
    fn dates_detected_after_numbers() {
        let inferred = infer_from_samples(&["2024-01-31", "not a date"]);
        assert_eq!(inferred.field_type, FieldType::Date);
    }

    #[test]
    fn text_sizes_follow_longest_sample() {
        let long = "x".repeat(300);
        assert_eq!(infer_from_samples(&["short"]).length, Some(80));
        assert_eq!(
            infer_from_samples(&[long.as_str()]).field_type,
            FieldType::LongTextArea
        );
    }

    #[test]
    fn only_first_twenty_values_are_sampled() {
        let mut text = String::from("flag\n");
        for _ in 0..SAMPLE_SIZE {
            text.push_str("yes\n");
        }
        text.push_str("maybe\n");
        let doc = CsvDocument::parse(&text).expect("parse");
        assert_eq!(infer_column(&doc, "flag").field_type, FieldType::Checkbox);
    }
}
