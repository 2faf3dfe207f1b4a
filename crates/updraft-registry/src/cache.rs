use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::Result;
use updraft_core::PackageMetadata;

use crate::MetadataSource;

/// Memoizes successful lookups by package name for the lifetime of a run.
/// Failures are not cached so a later lookup can retry.
pub struct CachedMetadataSource<S> {
    inner: S,
    cache: RefCell<HashMap<String, Rc<PackageMetadata>>>,
}

impl<S: MetadataSource> CachedMetadataSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn cached_names(&self) -> Vec<String> {
        let mut names = self.cache.borrow().keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }
}

impl<S: MetadataSource> MetadataSource for CachedMetadataSource<S> {
    fn fetch_metadata(&self, name: &str) -> Result<Rc<PackageMetadata>> {
        if let Some(hit) = self.cache.borrow().get(name) {
            return Ok(Rc::clone(hit));
        }

        let metadata = self.inner.fetch_metadata(name)?;
        self.cache
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&metadata));
        Ok(metadata)
    }
}

impl MetadataSource for Box<dyn MetadataSource> {
    fn fetch_metadata(&self, name: &str) -> Result<Rc<PackageMetadata>> {
        self.as_ref().fetch_metadata(name)
    }
}
