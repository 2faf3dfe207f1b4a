use std::path::{Path, PathBuf};

mod dependencies;
mod discovery;
mod git_ops;
mod module_resolve;
mod package_manager;

pub use dependencies::{find_package_json, project_dependencies, read_package_json, DependencyNode};
pub use discovery::{
    load_collection, resolve_migrations_path, DiscoveryError, MigrationCollection,
    MigrationsPathError,
};
pub use git_ops::{check_clean_workspace, short_hash, GitRepository, VersionControl};
pub use module_resolve::{resolve_module, resolve_package_dir, ResolveError};
pub use package_manager::{detect_package_manager, PackageManager};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn package_json_path(&self) -> PathBuf {
        self.root.join("package.json")
    }

    pub fn node_modules_dir(&self) -> PathBuf {
        self.root.join("node_modules")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("updraft.toml")
    }
}

#[cfg(test)]
mod tests;
