use semver::Version;
use thiserror::Error;
use updraft_core::{PackageManifest, PackageMetadata, Selector, VersionRange};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PickError {
    #[error("no version of '{package}' matches '{selector}'")]
    NoMatchingVersion { package: String, selector: String },
    #[error("package '{package}' has no published versions")]
    NoVersions { package: String },
}

pub fn select_highest_compatible<'a>(
    candidates: impl IntoIterator<Item = (&'a Version, &'a PackageManifest)>,
    range: &VersionRange,
) -> Option<&'a PackageManifest> {
    candidates
        .into_iter()
        .filter(|(version, _)| range.matches(version))
        .max_by(|a, b| a.0.cmp(b.0))
        .map(|(_, manifest)| manifest)
}

/// Chooses the manifest a selector refers to.
///
/// Ranges prefer the `latest` dist-tag when it satisfies the range, falling
/// back to the highest satisfying version.
pub fn pick_manifest<'a>(
    metadata: &'a PackageMetadata,
    selector: &Selector,
) -> Result<&'a PackageManifest, PickError> {
    if metadata.versions.is_empty() {
        return Err(PickError::NoVersions {
            package: metadata.name.clone(),
        });
    }

    let picked = match selector {
        Selector::Version(version) => metadata.versions.get(version),
        Selector::Range(range) => metadata
            .tagged("latest")
            .filter(|latest| range.matches(latest))
            .and_then(|latest| metadata.versions.get(latest))
            .or_else(|| select_highest_compatible(&metadata.versions, range)),
        Selector::Tag(tag) => metadata
            .tagged(tag)
            .and_then(|version| metadata.versions.get(version)),
    };

    picked.ok_or_else(|| PickError::NoMatchingVersion {
        package: metadata.name.clone(),
        selector: selector_text(selector),
    })
}

fn selector_text(selector: &Selector) -> String {
    match selector {
        Selector::Version(version) => version.to_string(),
        Selector::Range(range) => range.to_string(),
        Selector::Tag(tag) => tag.clone(),
    }
}
