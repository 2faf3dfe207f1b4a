use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use semver::Version;
use serde::{Deserialize, Serialize};

/// On-disk shape of a migration collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationCollectionFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub migrations: BTreeMap<String, MigrationEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MigrationEntry {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub command: Vec<String>,
}

impl MigrationCollectionFile {
    pub fn from_json_str(input: &str) -> anyhow::Result<Self> {
        let collection: Self =
            serde_json::from_str(input).context("failed to parse migration collection")?;
        for name in collection.migrations.keys() {
            if name.trim().is_empty() {
                return Err(anyhow!("migration name must not be empty"));
            }
        }
        Ok(collection)
    }
}

/// One migration as seen by selection and execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationDescriptor {
    pub name: String,
    pub description: String,
    /// Declared version after coercion; `None` keeps the migration out of range queries.
    pub version: Option<Version>,
    pub collection: String,
    pub collection_path: PathBuf,
}

impl MigrationDescriptor {
    /// First sentence of the description, always ending in a period.
    pub fn title(&self) -> String {
        let title = self.description.split(". ").next().unwrap_or_default();
        if title.ends_with('.') {
            title.to_string()
        } else {
            format!("{title}.")
        }
    }

    /// Remaining sentences of the description after the title.
    pub fn detail_lines(&self) -> Vec<String> {
        self.description
            .split(". ")
            .skip(1)
            .map(str::to_string)
            .collect()
    }
}
