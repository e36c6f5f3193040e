//! Configuration loading and document persistence.
//!
//! Catalogs, mapping tables and ingest settings are stored as YAML or JSON.
//! The format is chosen by extension: `.json` uses `serde_json`, anything else
//! is read and written as YAML.

use std::{
    fs::File,
    io::{BufReader, Read, Write},
    path::Path,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::bulk::{Operation, PollPolicy};

/// Settings for one ingest run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestConfig {
    pub object: String,
    #[serde(default)]
    pub operation: Operation,
    #[serde(default)]
    pub poll: PollPolicy,
}

impl IngestConfig {
    pub fn load(path: &Path) -> Result<Self> {
        load_document(path).with_context(|| format!("Loading ingest config {path:?}"))
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Opening {path:?}"))?;
    let mut reader = BufReader::new(file);
    if is_json(path) {
        serde_json::from_reader(reader).with_context(|| format!("Parsing JSON from {path:?}"))
    } else {
        let mut raw = String::new();
        reader
            .read_to_string(&mut raw)
            .with_context(|| format!("Reading {path:?}"))?;
        serde_yaml::from_str(&raw).with_context(|| format!("Parsing YAML from {path:?}"))
    }
}

pub fn save_document<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let serialized = if is_json(path) {
        serde_json::to_string_pretty(value).context("Serializing JSON")?
    } else {
        serde_yaml::to_string(value).context("Serializing YAML")?
    };
    let mut file = File::create(path).with_context(|| format!("Creating {path:?}"))?;
    file.write_all(serialized.as_bytes())?;
    file.flush()?;
    Ok(())
}
