use std::rc::Rc;

use anyhow::Result;
use updraft_core::PackageMetadata;

mod cache;
mod http;
mod registry_index;

pub use cache::CachedMetadataSource;
pub use http::{HttpRegistry, DEFAULT_REGISTRY_URL};
pub use registry_index::RegistryIndex;

/// Read-only access to published package metadata.
pub trait MetadataSource {
    fn fetch_metadata(&self, name: &str) -> Result<Rc<PackageMetadata>>;
}

/// Opens the metadata source a registry location names: `http(s)://` URLs
/// go over the network, anything else is treated as a local index directory.
pub fn open_registry(location: &str) -> Result<Box<dyn MetadataSource>> {
    let lowered = location.to_ascii_lowercase();
    if lowered.starts_with("http://") || lowered.starts_with("https://") {
        Ok(Box::new(HttpRegistry::new(location)?))
    } else {
        Ok(Box::new(RegistryIndex::open(location)))
    }
}
