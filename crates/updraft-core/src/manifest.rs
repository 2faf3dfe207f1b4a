use std::collections::BTreeMap;

use anyhow::Context;
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The subset of a `package.json` the updater reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PackageManifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "devDependencies")]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "peerDependencies")]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "updraft")]
    pub update: Option<UpdateMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UpdateMetadata {
    /// Kept untyped so a non-string value can be told apart from an absent one.
    #[serde(default)]
    pub migrations: Option<Value>,
    #[serde(default, rename = "packageGroup")]
    pub package_group: Option<PackageGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PackageGroup {
    Names(Vec<String>),
    Versions(BTreeMap<String, String>),
}

impl PackageGroup {
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::Names(names) => names.clone(),
            Self::Versions(entries) => entries.keys().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationsField {
    Absent,
    Malformed,
    Declared(String),
}

impl PackageManifest {
    pub fn from_json_str(input: &str) -> anyhow::Result<Self> {
        serde_json::from_str(input).context("failed to parse package manifest")
    }

    pub fn semver(&self) -> Option<Version> {
        Version::parse(self.version.trim()).ok()
    }

    pub fn migrations_field(&self) -> MigrationsField {
        match self
            .update
            .as_ref()
            .and_then(|update| update.migrations.as_ref())
        {
            None | Some(Value::Null) => MigrationsField::Absent,
            Some(Value::String(path)) => MigrationsField::Declared(path.clone()),
            Some(_) => MigrationsField::Malformed,
        }
    }

    pub fn package_group(&self) -> Vec<String> {
        self.update
            .as_ref()
            .and_then(|update| update.package_group.as_ref())
            .map(PackageGroup::names)
            .unwrap_or_default()
    }

    /// Dependency declarations in lookup precedence order: runtime, dev, peer.
    pub fn all_dependencies(&self) -> BTreeMap<String, String> {
        let mut merged = BTreeMap::new();
        for table in [
            &self.peer_dependencies,
            &self.dev_dependencies,
            &self.dependencies,
        ] {
            for (name, spec) in table {
                merged.insert(name.clone(), spec.clone());
            }
        }
        merged
    }
}

/// Rewrites the declared spec of `name` inside a raw `package.json` document,
/// leaving every other field and its ordering untouched. Returns `false` when
/// no dependency table declares the package.
pub fn set_dependency_spec(document: &mut Value, name: &str, spec: &str) -> bool {
    let mut updated = false;
    for table in ["dependencies", "devDependencies", "peerDependencies"] {
        let Some(entries) = document.get_mut(table).and_then(Value::as_object_mut) else {
            continue;
        };
        if let Some(current) = entries.get_mut(name) {
            *current = Value::String(spec.to_string());
            updated = true;
        }
    }
    updated
}
