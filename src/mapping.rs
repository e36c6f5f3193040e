//! Column-to-field assignments and their validation.
//!
//! The table accepts any assignment; constraints are checked by
//! [`MappingTable::validate`], which reports every problem in one pass.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::Path,
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    bulk::Operation,
    config,
    error::{MappingError, MappingIssue},
    matching::MatchSuggestion,
    schema::{FieldType, TargetField},
};

/// CSV header → target field name. One target per header.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct MappingTable {
    entries: BTreeMap<String, String>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        config::load_document(path)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        config::save_document(path, self)
    }

    /// Assigns `field` to `header`, replacing any previous assignment.
    pub fn assign(&mut self, header: impl Into<String>, field: impl Into<String>) {
        self.entries.insert(header.into(), field.into());
    }

    /// Removes the assignment for `header`, returning the field it held.
    pub fn clear(&mut self, header: &str) -> Option<String> {
        self.entries.remove(header)
    }

    pub fn target(&self, header: &str) -> Option<&str> {
        self.entries.get(header).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Mapped `(header, field)` pairs in the order the headers appear.
    /// Entries for headers not in `headers` are left out.
    pub fn ordered<'a>(&'a self, headers: &'a [String]) -> Vec<(&'a str, &'a str)> {
        headers
            .iter()
            .filter_map(|header| {
                self.entries
                    .get(header)
                    .map(|field| (header.as_str(), field.as_str()))
            })
            .collect()
    }

    /// Applies match suggestions without overriding existing assignments or
    /// claiming a field another header already holds. Returns how many were applied.
    pub fn auto_assign(&mut self, suggestions: &[MatchSuggestion]) -> usize {
        let mut taken = self.entries.values().cloned().collect::<HashSet<_>>();
        let mut applied = 0usize;
        for suggestion in suggestions {
            if self.entries.contains_key(&suggestion.header) || taken.contains(&suggestion.field) {
                debug!(
                    "Skipping suggestion {} -> {} ({:.2})",
                    suggestion.header, suggestion.field, suggestion.score
                );
                continue;
            }
            taken.insert(suggestion.field.clone());
            self.assign(suggestion.header.clone(), suggestion.field.clone());
            applied += 1;
        }
        applied
    }

    /// Checks the table against the schema for `operation`.
    ///
    /// Reports fields mapped from more than one header, mapped fields missing
    /// from the schema or not writable for the operation, and required fields
    /// left unmapped. Inserts and upserts need every required field; updates
    /// and deletes need the record identifier.
    pub fn validate(
        &self,
        fields: &[TargetField],
        operation: Operation,
    ) -> Result<(), MappingError> {
        let mut issues = Vec::new();

        let mut by_target: HashMap<&str, Vec<String>> = HashMap::new();
        for (header, field) in &self.entries {
            by_target
                .entry(field.as_str())
                .or_default()
                .push(header.clone());
        }
        let mut duplicates = by_target
            .iter()
            .filter(|(_, headers)| headers.len() > 1)
            .map(|(field, headers)| MappingIssue::DuplicateTarget {
                field: (*field).to_string(),
                headers: headers.clone(),
            })
            .collect::<Vec<_>>();
        duplicates.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        issues.extend(duplicates);

        for (header, field_name) in &self.entries {
            match fields.iter().find(|f| &f.name == field_name) {
                None => issues.push(MappingIssue::UnknownField {
                    header: header.clone(),
                    field: field_name.clone(),
                }),
                Some(field) if !operation.writes(field) => {
                    issues.push(MappingIssue::NotWritable {
                        header: header.clone(),
                        field: field_name.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        let mapped = self
            .entries
            .values()
            .map(String::as_str)
            .collect::<HashSet<_>>();
        let needed = fields.iter().filter(|field| match operation {
            Operation::Insert | Operation::Upsert => field.required,
            Operation::Update | Operation::Delete => field.field_type == FieldType::Id,
        });
        for field in needed {
            if !mapped.contains(field.name.as_str()) {
                issues.push(MappingIssue::MissingRequired(field.name.clone()));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(MappingError { issues })
        }
    }
}
