use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use updraft_core::{
    coerce_version, MigrationCollectionFile, MigrationDescriptor, MigrationEntry, MigrationsField,
};

use crate::module_resolve::{normalize_lexically, resolve_module, ResolveError};

#[derive(Debug, Error)]
pub enum MigrationsPathError {
    #[error("Package does not provide migrations.")]
    Missing,
    #[error("Package contains a malformed migrations field.")]
    Malformed,
    #[error("Package contains an invalid migrations field. Absolute paths are not permitted.")]
    Absolute,
    #[error(
        "Package contains an invalid migrations field. Paths outside the package root are not permitted."
    )]
    OutsidePackage,
    #[error("Migrations for package were not found.")]
    NotFound,
    #[error("Unable to resolve migrations for package.  [{0}]")]
    Unresolvable(String),
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("migration collection not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed reading migration collection {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid migration collection {}: {source:#}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// Turns a package's declared migrations field into a collection file path.
///
/// The field must be relative and stay inside the package. A path that
/// exists under `package_dir` wins; otherwise it is resolved as a module
/// from the package directory, which covers hoisted installs.
pub fn resolve_migrations_path(
    package_dir: &Path,
    field: &MigrationsField,
) -> Result<PathBuf, MigrationsPathError> {
    let raw = match field {
        MigrationsField::Absent => return Err(MigrationsPathError::Missing),
        MigrationsField::Malformed => return Err(MigrationsPathError::Malformed),
        MigrationsField::Declared(raw) => raw,
    };

    if is_posix_absolute(raw) || is_windows_absolute(raw) {
        return Err(MigrationsPathError::Absolute);
    }

    let normalized = raw.replace('\\', "/");
    let escapes = normalized.starts_with("../")
        || matches!(
            normalize_lexically(Path::new(&normalized)).components().next(),
            Some(Component::ParentDir)
        );
    if escapes {
        return Err(MigrationsPathError::OutsidePackage);
    }

    let local = normalize_lexically(&package_dir.join(&normalized));
    if local.exists() {
        return Ok(local);
    }

    match resolve_module(&normalized, package_dir) {
        Ok(resolved) => Ok(resolved),
        Err(ResolveError::ModuleNotFound { .. }) => Err(MigrationsPathError::NotFound),
        Err(err) => Err(MigrationsPathError::Unresolvable(err.to_string())),
    }
}

fn is_posix_absolute(raw: &str) -> bool {
    raw.starts_with('/')
}

fn is_windows_absolute(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let drive = bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && matches!(bytes[2], b'/' | b'\\');
    drive || raw.starts_with('\\')
}

/// A loaded migration collection.
#[derive(Debug, Clone)]
pub struct MigrationCollection {
    pub name: String,
    pub path: PathBuf,
    file: MigrationCollectionFile,
}

impl MigrationCollection {
    pub fn names(&self) -> Vec<&str> {
        self.file.migrations.keys().map(String::as_str).collect()
    }

    pub fn entry(&self, name: &str) -> Option<&MigrationEntry> {
        self.file.migrations.get(name)
    }

    /// Every migration in name order. Declared versions are coerced; entries
    /// whose version does not coerce keep `version: None`.
    pub fn descriptors(&self) -> Vec<MigrationDescriptor> {
        self.file
            .migrations
            .iter()
            .map(|(name, entry)| {
                let version = coerce_version(entry.version.as_deref());
                if version.is_none() && entry.version.is_some() {
                    tracing::debug!(
                        migration = %name,
                        declared = ?entry.version,
                        "migration version does not coerce; excluded from range selection"
                    );
                }
                MigrationDescriptor {
                    name: name.clone(),
                    description: entry.description.clone(),
                    version,
                    collection: self.name.clone(),
                    collection_path: self.path.clone(),
                }
            })
            .collect()
    }
}

pub fn load_collection(path: &Path) -> Result<MigrationCollection, DiscoveryError> {
    if !path.is_file() {
        return Err(DiscoveryError::NotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path).map_err(|source| DiscoveryError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let file = MigrationCollectionFile::from_json_str(&content).map_err(|source| {
        DiscoveryError::Malformed {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let name = file.name.clone().unwrap_or_else(|| {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default()
    });

    Ok(MigrationCollection {
        name,
        path: path.to_path_buf(),
        file,
    })
}
