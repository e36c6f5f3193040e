//! Cell normalization and re-serialization of mapped columns into the upload payload.
//!
//! The payload is comma-delimited with LF line endings. Its header row holds
//! the target field names in the original column order, and a value is quoted
//! only when it contains a comma, a double quote or a line break.

use csv::{QuoteStyle, Terminator, WriterBuilder};
use log::debug;

use crate::{
    error::{IngestError, IngestResult},
    infer::{is_boolean_token, looks_like_phone},
    mapping::MappingTable,
    tokenizer::CsvDocument,
};

/// Canonical form of one cell value.
///
/// Values containing `@` are lower-cased, phone-shaped values keep only digits
/// and `+`, and boolean tokens (`yes`, `no`, `1`, `0`, ...) become `true`/`false`.
pub fn format_cell(raw: &str) -> String {
    let mut value = raw.trim().to_string();
    if value.contains('@') {
        value = value.to_lowercase();
    }
    if looks_like_phone(&value) {
        value.retain(|ch| ch.is_ascii_digit() || ch == '+');
    }
    if is_boolean_token(&value) {
        let truthy = matches!(value.to_ascii_lowercase().as_str(), "true" | "yes" | "1");
        value = if truthy { "true" } else { "false" }.to_string();
    }
    value
}

fn payload_writer() -> csv::Writer<Vec<u8>> {
    let mut builder = WriterBuilder::new();
    builder
        .delimiter(b',')
        .terminator(Terminator::Any(b'\n'))
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    builder.from_writer(Vec::new())
}

/// Renders the mapped columns of `doc` as CSV text, renamed to their target
/// fields and normalized cell by cell, rows in original order.
pub fn render_payload(doc: Option<&CsvDocument>, mapping: &MappingTable) -> IngestResult<String> {
    let doc = doc.ok_or_else(|| IngestError::State("no CSV document has been loaded".to_string()))?;
    if mapping.is_empty() {
        return Err(IngestError::State("mapping table is empty".to_string()));
    }
    let columns = mapping
        .ordered(doc.headers())
        .into_iter()
        .filter_map(|(header, field)| doc.column_index(header).map(|idx| (idx, field)))
        .collect::<Vec<_>>();
    if columns.is_empty() {
        return Err(IngestError::State(
            "mapping table names no column of the loaded document".to_string(),
        ));
    }

    let io_err = |err: csv::Error| IngestError::State(format!("writing payload: {err}"));
    let mut writer = payload_writer();
    writer
        .write_record(columns.iter().map(|(_, field)| *field))
        .map_err(io_err)?;
    for row in doc.rows() {
        writer
            .write_record(columns.iter().map(|(idx, _)| format_cell(&row[*idx])))
            .map_err(io_err)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| IngestError::State(format!("flushing payload: {err}")))?;
    let payload = String::from_utf8(bytes)
        .map_err(|err| IngestError::State(format!("payload is not UTF-8: {err}")))?;
    debug!(
        "Rendered payload with {} column(s) and {} row(s)",
        columns.len(),
        doc.row_count()
    );
    Ok(payload)
}
