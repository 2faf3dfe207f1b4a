use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use updraft_core::PackageManifest;

use crate::module_resolve::{resolve_module, ResolveError};
use crate::WorkspaceLayout;

/// A dependency declared by the workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    pub name: String,
    /// Spec as written in the root `package.json`.
    pub requested: String,
    pub path: PathBuf,
    /// `None` when the dependency is declared but not installed.
    pub package: Option<PackageManifest>,
}

impl DependencyNode {
    pub fn installed_version(&self) -> Option<&str> {
        self.package
            .as_ref()
            .map(|package| package.version.as_str())
    }
}

pub fn read_package_json(path: &Path) -> Result<PackageManifest> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed reading package manifest: {}", path.display()))?;
    PackageManifest::from_json_str(&content)
        .with_context(|| format!("failed parsing package manifest: {}", path.display()))
}

/// Snapshot of the root dependencies and what is installed for each.
pub fn project_dependencies(layout: &WorkspaceLayout) -> Result<BTreeMap<String, DependencyNode>> {
    let root_manifest_path = layout.package_json_path();
    if !root_manifest_path.exists() {
        return Ok(BTreeMap::new());
    }
    let root_manifest = read_package_json(&root_manifest_path)?;

    let mut nodes = BTreeMap::new();
    for (name, requested) in root_manifest.all_dependencies() {
        let path = layout.node_modules_dir().join(&name);
        let manifest_path = path.join("package.json");
        let package = if manifest_path.is_file() {
            Some(read_package_json(&manifest_path)?)
        } else {
            tracing::debug!(package = %name, "declared dependency is not installed");
            None
        };
        nodes.insert(
            name.clone(),
            DependencyNode {
                name,
                requested,
                path,
                package,
            },
        );
    }

    Ok(nodes)
}

/// Locates the manifest of a package reachable from `root`, including
/// packages only installed transitively.
pub fn find_package_json(root: &Path, name: &str) -> Result<Option<PathBuf>> {
    match resolve_module(&format!("{name}/package.json"), root) {
        Ok(path) => Ok(Some(path)),
        Err(ResolveError::ModuleNotFound { .. }) => Ok(None),
        Err(err) => Err(err.into()),
    }
}
