//! Target record schema model and the field-catalog capability.
//!
//! [`TargetField`] mirrors what a remote describe call returns for one field.
//! [`SchemaApi`] is the capability the pipeline calls to list and create
//! fields; [`FileCatalog`] implements it over a saved catalog document so the
//! command line can work offline.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Mutex,
};

use anyhow::anyhow;
use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{
    config,
    error::{IngestError, IngestResult},
    suggest::FieldSuggestion,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Id,
    Text,
    TextArea,
    LongTextArea,
    Email,
    Phone,
    Url,
    Checkbox,
    Number,
    Currency,
    Percent,
    Date,
    DateTime,
    Picklist,
    MultiPicklist,
    Reference,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Id => "Id",
            FieldType::Text => "Text",
            FieldType::TextArea => "TextArea",
            FieldType::LongTextArea => "LongTextArea",
            FieldType::Email => "Email",
            FieldType::Phone => "Phone",
            FieldType::Url => "Url",
            FieldType::Checkbox => "Checkbox",
            FieldType::Number => "Number",
            FieldType::Currency => "Currency",
            FieldType::Percent => "Percent",
            FieldType::Date => "Date",
            FieldType::DateTime => "DateTime",
            FieldType::Picklist => "Picklist",
            FieldType::MultiPicklist => "MultiPicklist",
            FieldType::Reference => "Reference",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = anyhow::Error;

    // Accepts both display names and the lower-case type tokens found in
    // describe responses (e.g. `string`, `boolean`, `double`).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let token = value.trim().to_ascii_lowercase().replace(['_', '-', ' '], "");
        let parsed = match token.as_str() {
            "id" => FieldType::Id,
            "text" | "string" => FieldType::Text,
            "textarea" => FieldType::TextArea,
            "longtextarea" | "richtextarea" => FieldType::LongTextArea,
            "email" => FieldType::Email,
            "phone" => FieldType::Phone,
            "url" => FieldType::Url,
            "checkbox" | "boolean" | "bool" => FieldType::Checkbox,
            "number" | "double" | "int" | "integer" | "long" => FieldType::Number,
            "currency" => FieldType::Currency,
            "percent" => FieldType::Percent,
            "date" => FieldType::Date,
            "datetime" => FieldType::DateTime,
            "picklist" => FieldType::Picklist,
            "multipicklist" => FieldType::MultiPicklist,
            "reference" | "lookup" => FieldType::Reference,
            _ => return Err(anyhow!("Unknown field type '{value}'")),
        };
        Ok(parsed)
    }
}

impl Serialize for FieldType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        FieldType::from_str(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

fn default_true() -> bool {
    true
}

/// One field of the remote record schema. Read-only to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetField {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_true")]
    pub createable: bool,
    #[serde(default = "default_true")]
    pub updateable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub picklist_values: Vec<String>,
}

impl TargetField {
    pub fn new(name: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            field_type,
            required: false,
            createable: true,
            updateable: true,
            length: None,
            picklist_values: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.createable = false;
        self.updateable = false;
        self
    }

    /// Label used for display; falls back to the name when the label is blank.
    pub fn display_label(&self) -> &str {
        if self.label.trim().is_empty() {
            &self.name
        } else {
            &self.label
        }
    }
}

/// Saved describe result for one schema object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldCatalog {
    pub object: String,
    #[serde(default)]
    pub fields: Vec<TargetField>,
}

impl FieldCatalog {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        config::load_document(path)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        config::save_document(path, self)
    }

    pub fn field(&self, name: &str) -> Option<&TargetField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains_ignore_case(&self, name: &str) -> bool {
        self.fields
            .iter()
            .any(|f| f.name.eq_ignore_ascii_case(name))
    }
}

/// Remote schema capability: list the fields of an object and create new ones.
///
/// Field creation is not guaranteed idempotent; callers must not assume a
/// retried creation is safe.
#[async_trait]
pub trait SchemaApi: Send + Sync {
    async fn list_fields(&self, object: &str) -> IngestResult<Vec<TargetField>>;

    async fn create_field(&self, object: &str, suggestion: &FieldSuggestion) -> IngestResult<()>;
}

/// [`SchemaApi`] backed by a catalog file. Created fields are written back to disk.
pub struct FileCatalog {
    path: PathBuf,
    catalog: Mutex<FieldCatalog>,
}

impl FileCatalog {
    pub fn open(path: &Path) -> IngestResult<Self> {
        let catalog = FieldCatalog::load(path).map_err(|err| IngestError::Schema(format!("{err:#}")))?;
        Ok(Self {
            path: path.to_path_buf(),
            catalog: Mutex::new(catalog),
        })
    }

    pub fn snapshot(&self) -> IngestResult<FieldCatalog> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> IngestResult<std::sync::MutexGuard<'_, FieldCatalog>> {
        self.catalog
            .lock()
            .map_err(|_| IngestError::Schema("catalog lock poisoned".to_string()))
    }
}

#[async_trait]
impl SchemaApi for FileCatalog {
    async fn list_fields(&self, object: &str) -> IngestResult<Vec<TargetField>> {
        let catalog = self.lock()?;
        if !catalog.object.eq_ignore_ascii_case(object) {
            return Err(IngestError::Schema(format!(
                "object '{object}' is not described by {:?}",
                self.path
            )));
        }
        Ok(catalog.fields.clone())
    }

    async fn create_field(&self, object: &str, suggestion: &FieldSuggestion) -> IngestResult<()> {
        let mut catalog = self.lock()?;
        if !catalog.object.eq_ignore_ascii_case(object) {
            return Err(IngestError::Schema(format!(
                "object '{object}' is not described by {:?}",
                self.path
            )));
        }
        if catalog.contains_ignore_case(&suggestion.developer_name) {
            return Err(IngestError::Schema(format!(
                "field '{}' already exists on {object}",
                suggestion.developer_name
            )));
        }
        catalog.fields.push(suggestion.to_target_field());
        catalog
            .save(&self.path)
            .map_err(|err| IngestError::Schema(format!("{err:#}")))?;
        info!(
            "Created field '{}' ({}) on {object}",
            suggestion.developer_name, suggestion.field_type
        );
        Ok(())
    }
}
