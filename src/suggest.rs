//! New-field proposals for CSV columns that have no target field.

use log::{info, warn};

use crate::{
    error::IngestError,
    infer::{self, InferredType},
    mapping::MappingTable,
    schema::{FieldType, SchemaApi, TargetField},
    tokenizer::CsvDocument,
};

pub const CUSTOM_FIELD_SUFFIX: &str = "__c";

/// Proposed definition for a field that does not exist yet. Never required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSuggestion {
    pub header: String,
    pub developer_name: String,
    pub label: String,
    pub field_type: FieldType,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub required: bool,
}

impl FieldSuggestion {
    pub fn from_header(header: &str, inferred: InferredType) -> Self {
        Self {
            header: header.to_string(),
            developer_name: developer_name(header),
            label: field_label(header),
            field_type: inferred.field_type,
            length: inferred.length,
            precision: inferred.precision,
            scale: inferred.scale,
            required: false,
        }
    }

    pub fn to_target_field(&self) -> TargetField {
        let mut field = TargetField::new(&self.developer_name, &self.label, self.field_type);
        field.length = self.length;
        field
    }
}

/// Schema-safe identifier for a header, e.g. `"Annual Revenue ($)"` becomes
/// `Annual_Revenue__c`.
///
/// An existing custom suffix on the header is kept rather than doubled.
pub fn developer_name(header: &str) -> String {
    let trimmed = header.trim();
    let base = match trimmed.len().checked_sub(CUSTOM_FIELD_SUFFIX.len()) {
        Some(split)
            if trimmed.is_char_boundary(split)
                && trimmed[split..].eq_ignore_ascii_case(CUSTOM_FIELD_SUFFIX) =>
        {
            &trimmed[..split]
        }
        _ => trimmed,
    };

    let kept = base
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || ch.is_whitespace())
        .collect::<String>();
    let mut name = kept.split_whitespace().collect::<Vec<_>>().join("_");
    name = name.trim_matches('_').to_string();
    if !name.starts_with(|ch: char| ch.is_ascii_alphabetic()) {
        name.insert(0, 'X');
    }
    name.push_str(CUSTOM_FIELD_SUFFIX);
    name
}

/// Display label: separators become spaces and each word starts upper-case.
pub fn field_label(header: &str) -> String {
    header
        .replace(['_', '-'], " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Suggestions for every header the mapping leaves unassigned, skipping
/// headers whose identifier already exists on the schema (case-insensitive).
pub fn suggest_fields(
    doc: &CsvDocument,
    mapping: &MappingTable,
    fields: &[TargetField],
) -> Vec<FieldSuggestion> {
    doc.headers()
        .iter()
        .filter(|header| mapping.target(header).is_none())
        .filter_map(|header| {
            let name = developer_name(header);
            if fields.iter().any(|f| f.name.eq_ignore_ascii_case(&name)) {
                return None;
            }
            Some(FieldSuggestion::from_header(
                header,
                infer::infer_column(doc, header),
            ))
        })
        .collect()
}

/// Outcome of a batch of field creations.
#[derive(Debug, Default)]
pub struct FieldCreationReport {
    pub created: Vec<String>,
    pub failed: Vec<(String, IngestError)>,
    /// Set when the fields were created but re-reading the schema afterwards failed.
    pub refresh_error: Option<IngestError>,
}

impl FieldCreationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Creates each suggested field in turn. A failure is recorded against its
/// suggestion and the remaining suggestions are still attempted.
pub async fn create_fields<A>(
    api: &A,
    object: &str,
    suggestions: &[FieldSuggestion],
) -> FieldCreationReport
where
    A: SchemaApi + ?Sized,
{
    let mut report = FieldCreationReport::default();
    for suggestion in suggestions {
        match api.create_field(object, suggestion).await {
            Ok(()) => report.created.push(suggestion.developer_name.clone()),
            Err(err) => {
                warn!(
                    "Creating field '{}' on {object} failed: {err}",
                    suggestion.developer_name
                );
                report.failed.push((suggestion.developer_name.clone(), err));
            }
        }
    }
    info!(
        "Field creation on {object}: {} created, {} failed",
        report.created.len(),
        report.failed.len()
    );
    report
}
