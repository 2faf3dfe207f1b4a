use semver::{Prerelease, Version};

/// Half-open window `(from, to]` of migration versions.
///
/// Comparison is prerelease-inclusive: every version ordered strictly above
/// the lower bound and at or below the upper bound is inside the window,
/// prerelease or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRange {
    lower: Version,
    upper: Version,
}

impl MigrationRange {
    /// When `from` is itself a prerelease the floor drops to `<base>-0`, so
    /// other prereleases of the same release are not skipped.
    pub fn new(from: &Version, to: &Version) -> Self {
        let lower = if from.pre.is_empty() {
            from.clone()
        } else {
            let mut floor = Version::new(from.major, from.minor, from.patch);
            floor.pre = Prerelease::new("0").unwrap_or(Prerelease::EMPTY);
            floor
        };

        Self {
            lower,
            upper: to.clone(),
        }
    }

    pub fn lower(&self) -> &Version {
        &self.lower
    }

    pub fn upper(&self) -> &Version {
        &self.upper
    }

    pub fn contains(&self, version: &Version) -> bool {
        compare_versions(version, &self.lower).is_gt()
            && compare_versions(version, &self.upper).is_le()
    }
}

// Build metadata does not participate in precedence.
pub(crate) fn compare_versions(left: &Version, right: &Version) -> std::cmp::Ordering {
    (left.major, left.minor, left.patch, &left.pre).cmp(&(
        right.major,
        right.minor,
        right.patch,
        &right.pre,
    ))
}
