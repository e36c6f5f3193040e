//! Quote-aware CSV tokenizer producing an in-memory [`CsvDocument`].
//!
//! The whole input is held in memory. Lines are split on line feeds that fall
//! outside quoted sections, so quoted values may carry embedded commas, quotes
//! and newlines. Each cell is trimmed of surrounding whitespace.

use std::collections::HashSet;

use log::debug;

use crate::error::{IngestError, IngestResult};

/// Parsed CSV content: ordered headers plus rows aligned positionally with them.
///
/// Every row holds exactly one cell per header; short rows are padded with
/// empty strings and surplus cells are dropped during parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvDocument {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvDocument {
    pub fn parse(text: &str) -> IngestResult<Self> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        if text.trim().is_empty() {
            return Err(IngestError::Parse("empty file".to_string()));
        }

        let mut lines = split_records(text)?.into_iter();
        let header_line = lines
            .next()
            .ok_or_else(|| IngestError::Parse("empty file".to_string()))?;
        let headers = parse_line(header_line);

        let mut seen = HashSet::with_capacity(headers.len());
        for header in &headers {
            if !seen.insert(header.as_str()) {
                return Err(IngestError::Parse(format!("duplicate header '{header}'")));
            }
        }

        let rows = lines
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let mut cells = parse_line(line);
                cells.resize(headers.len(), String::new());
                cells
            })
            .collect::<Vec<_>>();

        debug!(
            "Tokenized {} column(s) and {} row(s)",
            headers.len(),
            rows.len()
        );
        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    /// Cell value for `header` in row `row`, if both exist.
    pub fn value(&self, row: usize, header: &str) -> Option<&str> {
        let idx = self.column_index(header)?;
        self.rows.get(row).map(|cells| cells[idx].as_str())
    }

    /// All values of one column in row order. Unknown headers yield nothing.
    pub fn column_values<'a>(&'a self, header: &str) -> impl Iterator<Item = &'a str> + 'a {
        let idx = self.column_index(header);
        self.rows
            .iter()
            .filter_map(move |cells| idx.map(|i| cells[i].as_str()))
    }
}

/// Splits text into logical records on line feeds outside quoted sections.
/// A trailing carriage return is removed from each record.
///
/// A quote opens a quoted section only at the start of a field; elsewhere it
/// is a literal character. A quoted section still open at the end of input is
/// a parse error naming the line it started on.
fn split_records(text: &str) -> IngestResult<Vec<&str>> {
    let mut records = Vec::new();
    let mut in_quotes = false;
    let mut field_start = true;
    let mut start = 0usize;
    let mut line = 1usize;
    let mut quote_line = 0usize;
    let mut chars = text.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek().is_some_and(|(_, next)| *next == '"') {
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if field_start => {
                in_quotes = true;
                field_start = false;
                quote_line = line;
            }
            '\n' => {
                line += 1;
                if !in_quotes {
                    records.push(strip_cr(&text[start..idx]));
                    start = idx + 1;
                    field_start = true;
                }
            }
            ',' if !in_quotes => field_start = true,
            other if other.is_whitespace() => {}
            _ => field_start = false,
        }
    }
    if in_quotes {
        return Err(IngestError::Parse(format!(
            "unterminated quoted field starting on line {quote_line}"
        )));
    }
    if start < text.len() {
        records.push(strip_cr(&text[start..]));
    }
    Ok(records)
}

fn strip_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

/// Parses one logical CSV line into trimmed cell values.
///
/// A quote at the start of a field opens a quoted section, in which a doubled
/// quote yields one literal quote. A quote anywhere else is kept as written.
pub fn parse_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut field_start = true;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if field_start => {
                in_quotes = true;
                field_start = false;
            }
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
                field_start = true;
            }
            other => {
                if !other.is_whitespace() {
                    field_start = false;
                }
                current.push(other);
            }
        }
    }
    fields.push(current.trim().to_string());
    fields
}
