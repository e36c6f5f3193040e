//! Column-to-field similarity scoring.
//!
//! Scores are pure functions of normalized strings:
//!
//! | Rule | Score |
//! |------|-------|
//! | header equals field name or label | 1.0 |
//! | header equals a synonym of the field's anchor token | 1.0 |
//! | header contains a synonym and field name contains the anchor | 0.9 |
//! | header and field name contain one another | 0.8 |
//! | header and label contain one another | 0.7 |
//!
//! Synonym scores are combined with the other rules by taking the maximum.

use crate::schema::TargetField;

/// Suggestions at or below this score leave the header unmapped.
pub const MATCH_THRESHOLD: f64 = 0.6;

const CUSTOM_FIELD_SUFFIX: &str = "__c";

/// Anchor token followed by the header tokens treated as its synonyms.
const SYNONYM_GROUPS: &[(&str, &[&str])] = &[
    ("firstname", &["firstname", "fname", "givenname", "forename"]),
    ("lastname", &["lastname", "lname", "surname", "familyname"]),
    ("email", &["email", "emailaddress", "emailaddr"]),
    (
        "phone",
        &["phone", "phonenumber", "telephone", "mobile", "mobilephone", "cellphone"],
    ),
    (
        "company",
        &["company", "companyname", "organization", "organisation", "employer", "business"],
    ),
    ("title", &["title", "jobtitle", "position", "role", "designation"]),
    (
        "street",
        &["street", "streetaddress", "address", "addressline1", "address1"],
    ),
    ("city", &["city", "town", "locality"]),
    ("state", &["state", "province", "region", "stateprovince"]),
    ("postalcode", &["postalcode", "zip", "zipcode", "postcode", "postal"]),
    ("country", &["country", "nation", "countrycode"]),
];

/// Lower-cases, keeps ASCII letters and digits, then drops a trailing `id`.
///
/// A bare `id` is kept so identifier columns still compare equal to each other.
pub fn normalize_name(value: &str) -> String {
    let cleaned = value
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .map(|ch| ch.to_ascii_lowercase())
        .collect::<String>();
    match cleaned.strip_suffix("id") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => cleaned,
    }
}

/// Field names drop a trailing custom suffix before normalizing, so a header
/// `Region` equals the field `Region__c` exactly rather than by containment.
fn normalize_field_name(name: &str) -> String {
    let base = name.strip_suffix(CUSTOM_FIELD_SUFFIX).unwrap_or(name);
    normalize_name(base)
}

fn contains_either(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a))
}

fn synonym_score(header: &str, name: &str, label: &str) -> f64 {
    let mut best = 0.0_f64;
    for (anchor, synonyms) in SYNONYM_GROUPS {
        if !name.contains(anchor) {
            continue;
        }
        let field_is_anchor = name == *anchor || label == *anchor;
        if field_is_anchor && synonyms.contains(&header) {
            return 1.0;
        }
        if synonyms.iter().any(|token| header.contains(token)) {
            best = best.max(0.9);
        }
    }
    best
}

/// Similarity in `[0, 1]` between a CSV header and a target field.
pub fn score_field(header: &str, field: &TargetField) -> f64 {
    let header = normalize_name(header);
    if header.is_empty() {
        return 0.0;
    }
    let name = normalize_field_name(&field.name);
    let label = normalize_name(&field.label);

    if header == name || (!label.is_empty() && header == label) {
        return 1.0;
    }

    let direct: f64 = if contains_either(&header, &name) {
        0.8
    } else if contains_either(&header, &label) {
        0.7
    } else {
        0.0
    };
    direct.max(synonym_score(&header, &name, &label))
}

/// Best-scoring field for one header.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate<'a> {
    pub header: &'a str,
    pub field: &'a TargetField,
    pub score: f64,
}

/// Evaluates every field for `header` and keeps the first one reaching the
/// highest score. Ties resolve to the earliest field in catalog order.
/// Returns `None` unless the best score exceeds [`MATCH_THRESHOLD`].
pub fn best_match<'a>(header: &'a str, fields: &'a [TargetField]) -> Option<MatchCandidate<'a>> {
    let mut best: Option<MatchCandidate<'a>> = None;
    for field in fields {
        let score = score_field(header, field);
        let current = best.as_ref().map_or(0.0, |candidate| candidate.score);
        if score > current {
            best = Some(MatchCandidate {
                header,
                field,
                score,
            });
        }
    }
    best.filter(|candidate| candidate.score > MATCH_THRESHOLD)
}

/// A suggested association of one header with one field.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSuggestion {
    pub header: String,
    pub field: String,
    pub score: f64,
}

/// Runs [`best_match`] for each header in order, skipping headers with no match.
pub fn suggest_mappings(headers: &[String], fields: &[TargetField]) -> Vec<MatchSuggestion> {
    headers
        .iter()
        .filter_map(|header| best_match(header, fields))
        .map(|candidate| MatchSuggestion {
            header: candidate.header.to_string(),
            field: candidate.field.name.clone(),
            score: candidate.score,
        })
        .collect()
}
