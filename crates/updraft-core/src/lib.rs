mod manifest;
mod metadata;
mod migration;
mod npm_range;
mod request;
mod version;

pub use manifest::{
    set_dependency_spec, MigrationsField, PackageGroup, PackageManifest, UpdateMetadata,
};
pub use metadata::PackageMetadata;
pub use migration::{MigrationCollectionFile, MigrationDescriptor, MigrationEntry};
pub use npm_range::{RangeError, VersionRange};
pub use request::{PackageRequest, RequestError, Selector};
pub use version::coerce_version;

#[cfg(test)]
mod tests;
