use std::path::PathBuf;

use semver::Version;
use updraft_core::{coerce_version, PackageMetadata, Selector, VersionRange};

use super::*;

fn migration(name: &str, version: Option<&str>) -> updraft_core::MigrationDescriptor {
    updraft_core::MigrationDescriptor {
        name: name.to_string(),
        description: format!("Runs {name}."),
        version: coerce_version(version),
        collection: "test-collection".to_string(),
        collection_path: PathBuf::from("migrations/collection.json"),
    }
}

fn v(text: &str) -> Version {
    Version::parse(text).expect("valid version")
}

fn names(selected: &[updraft_core::MigrationDescriptor]) -> Vec<&str> {
    selected.iter().map(|m| m.name.as_str()).collect()
}

#[test]
fn range_selection_is_exclusive_below_and_inclusive_above() {
    let migrations = vec![
        migration("at-from", Some("8.0.0")),
        migration("inside", Some("8.1.0")),
        migration("at-to", Some("9.0.0")),
        migration("above", Some("9.0.1")),
    ];

    let range = MigrationRange::new(&v("8.0.0"), &v("9.0.0"));
    let selected = select_in_range(&migrations, &range);
    assert_eq!(names(&selected), vec!["inside", "at-to"]);
}

#[test]
fn range_selection_orders_by_version_then_name() {
    let migrations = vec![
        migration("zeta", Some("9.0.0")),
        migration("alpha", Some("9.0.0")),
        migration("early", Some("8.2")),
        migration("beta-step", Some("9.0.0-beta.1")),
    ];

    let range = MigrationRange::new(&v("8.0.0"), &v("9.0.0"));
    let first = select_in_range(&migrations, &range);
    let second = select_in_range(&migrations, &range);

    assert_eq!(names(&first), vec!["early", "beta-step", "alpha", "zeta"]);
    assert_eq!(first, second);
}

#[test]
fn prerelease_from_lowers_floor_to_same_release() {
    let migrations = vec![
        migration("release", Some("9.0.0")),
        migration("beta", Some("9.0.0-beta.3")),
        migration("previous-major", Some("8.2.0")),
    ];

    let range = MigrationRange::new(&v("9.0.0-rc.0"), &v("9.1.0"));
    assert_eq!(range.lower(), &v("9.0.0-0"));

    let selected = select_in_range(&migrations, &range);
    assert_eq!(names(&selected), vec!["beta", "release"]);
}

#[test]
fn prerelease_migrations_are_included_under_stable_bounds() {
    let migrations = vec![migration("next-step", Some("10.0.0-next.2"))];
    let range = MigrationRange::new(&v("9.1.0"), &v("10.0.0"));
    assert_eq!(names(&select_in_range(&migrations, &range)), vec!["next-step"]);
}

#[test]
fn uncoercible_version_is_excluded_from_range_but_found_by_name() {
    let migrations = vec![
        migration("unversioned", None),
        migration("overflow", Some("9.0.0.1")),
        migration("versioned", Some("9.0.0")),
    ];

    let range = MigrationRange::new(&v("0.0.0"), &v("100.0.0"));
    assert_eq!(names(&select_in_range(&migrations, &range)), vec!["versioned"]);

    let found = select_by_name(&migrations, "pkg", "overflow").expect("must resolve by name");
    assert_eq!(found.name, "overflow");
    assert_eq!(found.version, None);
}

#[test]
fn select_by_name_reports_missing_migration() {
    let migrations = vec![migration("present", Some("1.0.0"))];
    let err = select_by_name(&migrations, "@scope/pkg", "absent").expect_err("must be missing");
    assert_eq!(
        err.to_string(),
        "Cannot find migration 'absent' in '@scope/pkg'."
    );
}

#[test]
fn empty_collection_and_empty_window_select_nothing() {
    let range = MigrationRange::new(&v("1.0.0"), &v("2.0.0"));
    assert!(select_in_range(&[], &range).is_empty());

    let migrations = vec![migration("old", Some("0.9.0"))];
    assert!(select_in_range(&migrations, &range).is_empty());
}

fn sample_metadata() -> PackageMetadata {
    PackageMetadata::from_json_str(
        r#"{
  "name": "tool",
  "dist-tags": { "latest": "1.3.0", "next": "2.0.0-rc.1" },
  "versions": {
    "1.2.0": {},
    "1.3.0": {},
    "1.4.0": {},
    "2.0.0-rc.1": {}
  }
}"#,
    )
    .expect("metadata must parse")
}

#[test]
fn pick_manifest_exact_version() {
    let metadata = sample_metadata();
    let picked = pick_manifest(&metadata, &Selector::Version(v("1.2.0"))).expect("must pick");
    assert_eq!(picked.version, "1.2.0");

    let err = pick_manifest(&metadata, &Selector::Version(v("1.9.9"))).expect_err("no match");
    assert!(matches!(err, PickError::NoMatchingVersion { .. }));
}

#[test]
fn pick_manifest_range_prefers_latest_tag() {
    let metadata = sample_metadata();
    let range = VersionRange::parse("^1.0").expect("valid range");
    let picked = pick_manifest(&metadata, &Selector::Range(range)).expect("must pick");
    assert_eq!(picked.version, "1.3.0");

    let range = VersionRange::parse(">=1.4.0 <2.0.0").expect("valid range");
    let picked = pick_manifest(&metadata, &Selector::Range(range)).expect("must pick");
    assert_eq!(picked.version, "1.4.0");
}

#[test]
fn pick_manifest_partial_range_ignores_latest_outside_it() {
    let metadata = sample_metadata();
    let range = VersionRange::parse("1.2").expect("valid range");
    let picked = pick_manifest(&metadata, &Selector::Range(range)).expect("must pick");
    assert_eq!(picked.version, "1.2.0");

    let range = VersionRange::parse("1.2.0 - 1.4.0 || ^3").expect("valid range");
    let picked = pick_manifest(&metadata, &Selector::Range(range)).expect("must pick");
    assert_eq!(picked.version, "1.3.0");

    let range = VersionRange::parse("1.0.0 - 1.1.9 || ^3").expect("valid range");
    let err = pick_manifest(&metadata, &Selector::Range(range)).expect_err("no match");
    assert!(matches!(err, PickError::NoMatchingVersion { .. }));
}

#[test]
fn pick_manifest_tag_and_missing_tag() {
    let metadata = sample_metadata();
    let picked =
        pick_manifest(&metadata, &Selector::Tag("next".to_string())).expect("must pick");
    assert_eq!(picked.version, "2.0.0-rc.1");

    let err = pick_manifest(&metadata, &Selector::Tag("beta".to_string()))
        .expect_err("missing tag must fail");
    assert!(matches!(err, PickError::NoMatchingVersion { .. }));
}

#[test]
fn pick_manifest_distinguishes_package_without_versions() {
    let metadata =
        PackageMetadata::from_json_str(r#"{"name":"empty","versions":{}}"#).expect("must parse");
    let err = pick_manifest(&metadata, &Selector::Tag("latest".to_string()))
        .expect_err("no versions");
    assert_eq!(
        err,
        PickError::NoVersions {
            package: "empty".to_string()
        }
    );
}
