use thiserror::Error;
use updraft_core::MigrationDescriptor;

use crate::range::{compare_versions, MigrationRange};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
    #[error("Cannot find migration '{migration}' in '{package}'.")]
    NoSuchMigration { package: String, migration: String },
}

/// Resolves a single migration by exact name. Undeclared or uncoercible
/// versions do not matter here.
pub fn select_by_name<'a>(
    migrations: &'a [MigrationDescriptor],
    package: &str,
    name: &str,
) -> Result<&'a MigrationDescriptor, SelectError> {
    migrations
        .iter()
        .find(|migration| migration.name == name)
        .ok_or_else(|| SelectError::NoSuchMigration {
            package: package.to_string(),
            migration: name.to_string(),
        })
}

/// Every versioned migration inside `range`, in replay order. An empty
/// result is a valid selection.
pub fn select_in_range(
    migrations: &[MigrationDescriptor],
    range: &MigrationRange,
) -> Vec<MigrationDescriptor> {
    let mut selected = migrations
        .iter()
        .filter(|migration| {
            migration
                .version
                .as_ref()
                .is_some_and(|version| range.contains(version))
        })
        .cloned()
        .collect::<Vec<_>>();
    order_migrations(&mut selected);
    selected
}

/// Sorts by declared version, then by name.
pub fn order_migrations(migrations: &mut [MigrationDescriptor]) {
    migrations.sort_by(|left, right| {
        let by_version = match (&left.version, &right.version) {
            (Some(a), Some(b)) => compare_versions(a, b),
            (a, b) => a.is_some().cmp(&b.is_some()),
        };
        by_version.then_with(|| left.name.cmp(&right.name))
    });
}
