use std::fmt;

use semver::Version;
use thiserror::Error;

use crate::npm_range::VersionRange;

const NON_REGISTRY_PREFIXES: &[&str] = &[
    "file:",
    "git+",
    "git:",
    "github:",
    "gitlab:",
    "bitbucket:",
    "gist:",
    "http://",
    "https://",
    "link:",
    "workspace:",
    "npm:",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("package request must not be empty")]
    Empty,
    #[error("Package '{0}' is not a registry package identifier.")]
    NotRegistry(String),
    #[error("invalid package name '{name}' in request '{raw}'")]
    InvalidName { raw: String, name: String },
    #[error("invalid version specifier '{spec}' in request '{raw}'")]
    InvalidSpec { raw: String, spec: String },
}

/// How a user constrained the version of a requested package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Version(Version),
    Range(VersionRange),
    Tag(String),
}

impl Selector {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Version(_) => "version",
            Self::Range(_) => "range",
            Self::Tag(_) => "tag",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    pub name: String,
    pub selector: Selector,
    /// Specifier text as typed after `@`, `None` when the user gave only a name.
    pub raw_spec: Option<String>,
    /// Specifier used for the registry lookup.
    pub fetch_spec: String,
    pub raw: String,
}

impl PackageRequest {
    pub fn parse(raw: &str) -> Result<Self, RequestError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RequestError::Empty);
        }
        if is_non_registry_identifier(trimmed) {
            return Err(RequestError::NotRegistry(trimmed.to_string()));
        }

        let (name, spec) = split_name_and_spec(trimmed);
        if let Some(spec) = spec {
            if is_non_registry_identifier(spec) {
                return Err(RequestError::NotRegistry(trimmed.to_string()));
            }
        }
        if !is_valid_package_name(name) {
            return Err(RequestError::InvalidName {
                raw: trimmed.to_string(),
                name: name.to_string(),
            });
        }

        let raw_spec = spec.filter(|value| !value.trim().is_empty());
        let fetch_spec = raw_spec.unwrap_or("latest").trim();
        let selector =
            classify_spec(fetch_spec).ok_or_else(|| RequestError::InvalidSpec {
                raw: trimmed.to_string(),
                spec: fetch_spec.to_string(),
            })?;

        Ok(Self {
            name: name.to_string(),
            selector,
            raw_spec: raw_spec.map(str::to_string),
            fetch_spec: fetch_spec.to_string(),
            raw: trimmed.to_string(),
        })
    }

    /// Points an unqualified request at the `next` dist-tag.
    pub fn prefer_next(&mut self) {
        if self.raw_spec.is_none() {
            self.selector = Selector::Tag("next".to_string());
            self.fetch_spec = "next".to_string();
        }
    }
}

impl fmt::Display for PackageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.fetch_spec)
    }
}

fn split_name_and_spec(value: &str) -> (&str, Option<&str>) {
    let search_from = usize::from(value.starts_with('@'));
    match value[search_from..].find('@') {
        Some(index) => {
            let split = search_from + index;
            (&value[..split], Some(&value[split + 1..]))
        }
        None => (value, None),
    }
}

fn is_non_registry_identifier(value: &str) -> bool {
    if NON_REGISTRY_PREFIXES
        .iter()
        .any(|prefix| value.to_ascii_lowercase().starts_with(prefix))
    {
        return true;
    }
    if value.starts_with('.') || value.starts_with('/') || value.starts_with('~') {
        return true;
    }
    if value.contains('\\') {
        return true;
    }

    // `user/repo` is hosted-git shorthand; only scoped names may contain a slash.
    let (name, _) = split_name_and_spec(value);
    !name.starts_with('@') && name.contains('/')
}

fn is_valid_package_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 214 {
        return false;
    }

    match name.strip_prefix('@') {
        Some(scoped) => scoped
            .split_once('/')
            .is_some_and(|(scope, bare)| is_name_segment(scope) && is_name_segment(bare)),
        None => is_name_segment(name),
    }
}

fn is_name_segment(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    if bytes.is_empty() || bytes[0] == b'.' || bytes[0] == b'_' {
        return false;
    }
    bytes.iter().all(|byte| {
        byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
    })
}

fn classify_spec(spec: &str) -> Option<Selector> {
    let version_text = spec.trim_start_matches('=').trim_start_matches('v');
    if let Ok(version) = Version::parse(version_text) {
        return Some(Selector::Version(version));
    }

    if let Ok(range) = VersionRange::parse(spec) {
        return Some(Selector::Range(range));
    }

    if is_tag_name(spec) {
        return Some(Selector::Tag(spec.to_string()));
    }

    None
}

fn is_tag_name(spec: &str) -> bool {
    let Some(first) = spec.chars().next() else {
        return false;
    };
    if first.is_ascii_digit() {
        return false;
    }
    spec.chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '.' | '_' | '~'))
}
