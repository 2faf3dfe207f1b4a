use std::collections::BTreeMap;

use anyhow::Context;
use semver::Version;
use serde::Deserialize;

use crate::manifest::PackageManifest;

/// Registry view of a package: every published version plus its dist-tags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageMetadata {
    pub name: String,
    pub dist_tags: BTreeMap<String, Version>,
    pub versions: BTreeMap<Version, PackageManifest>,
}

#[derive(Debug, Deserialize)]
struct RawPackageMetadata {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "dist-tags")]
    dist_tags: BTreeMap<String, String>,
    #[serde(default)]
    versions: BTreeMap<String, PackageManifest>,
}

impl PackageMetadata {
    /// Parses a packument document. Version keys and dist-tags that are not
    /// valid semantic versions are dropped.
    pub fn from_json_str(input: &str) -> anyhow::Result<Self> {
        let raw: RawPackageMetadata =
            serde_json::from_str(input).context("failed to parse registry metadata")?;

        let mut versions = BTreeMap::new();
        for (key, mut manifest) in raw.versions {
            let Ok(version) = Version::parse(key.trim()) else {
                continue;
            };
            if manifest.name.is_empty() {
                manifest.name = raw.name.clone();
            }
            if manifest.version.is_empty() {
                manifest.version = version.to_string();
            }
            versions.insert(version, manifest);
        }

        let dist_tags = raw
            .dist_tags
            .into_iter()
            .filter_map(|(tag, version)| {
                Version::parse(version.trim())
                    .ok()
                    .map(|version| (tag, version))
            })
            .collect();

        Ok(Self {
            name: raw.name,
            dist_tags,
            versions,
        })
    }

    pub fn tagged(&self, tag: &str) -> Option<&Version> {
        self.dist_tags.get(tag)
    }
}
