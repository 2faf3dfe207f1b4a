use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use updraft_core::PackageMetadata;

use crate::MetadataSource;

/// Registry mirror on the local filesystem: `index/<name>.json` packuments,
/// with the scope separator of scoped names written as `__`.
#[derive(Debug, Clone)]
pub struct RegistryIndex {
    root: PathBuf,
}

impl RegistryIndex {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.root
            .join("index")
            .join(format!("{}.json", name.replace('/', "__")))
    }
}

impl MetadataSource for RegistryIndex {
    fn fetch_metadata(&self, name: &str) -> Result<Rc<PackageMetadata>> {
        let path = self.metadata_path(name);
        if !path.exists() {
            anyhow::bail!("package '{}' not found in registry index", name);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed reading registry metadata: {}", path.display()))?;
        let mut metadata = PackageMetadata::from_json_str(&content)
            .with_context(|| format!("failed parsing registry metadata: {}", path.display()))?;
        if metadata.name.is_empty() {
            metadata.name = name.to_string();
        }
        Ok(Rc::new(metadata))
    }
}
