use semver::Version;
use serde_json::json;

use super::*;

#[test]
fn coerce_version_pads_missing_components() {
    assert_eq!(coerce_version(Some("11")), Some(Version::new(11, 0, 0)));
    assert_eq!(coerce_version(Some("11.2")), Some(Version::new(11, 2, 0)));
    assert_eq!(coerce_version(Some("11.2.3")), Some(Version::new(11, 2, 3)));
}

#[test]
fn coerce_version_keeps_prerelease_suffix_when_padding() {
    let coerced = coerce_version(Some("9-rc.1")).expect("must coerce");
    assert_eq!(coerced.to_string(), "9.0.0-rc.1");

    let coerced = coerce_version(Some("12.1-next.0")).expect("must coerce");
    assert_eq!(coerced.to_string(), "12.1.0-next.0");
}

#[test]
fn coerce_version_rejects_ambiguous_or_garbage_input() {
    assert_eq!(coerce_version(Some("11.2.3.4")), None);
    assert_eq!(coerce_version(Some("v11")), None);
    assert_eq!(coerce_version(Some("latest")), None);
    assert_eq!(coerce_version(Some("")), None);
    assert_eq!(coerce_version(Some("   ")), None);
    assert_eq!(coerce_version(None), None);
}

#[test]
fn parse_request_with_bare_name_defaults_to_latest_tag() {
    let request = PackageRequest::parse("@updraft/core").expect("must parse");
    assert_eq!(request.name, "@updraft/core");
    assert_eq!(request.selector, Selector::Tag("latest".to_string()));
    assert_eq!(request.raw_spec, None);
    assert_eq!(request.to_string(), "@updraft/core@latest");
}

#[test]
fn parse_request_classifies_version_range_and_tag() {
    let exact = PackageRequest::parse("left-pad@1.3.0").expect("must parse");
    assert_eq!(exact.selector, Selector::Version(Version::new(1, 3, 0)));
    assert_eq!(exact.selector.kind(), "version");

    let range = PackageRequest::parse("@scope/pkg@^2.1").expect("must parse");
    assert_eq!(
        range.selector,
        Selector::Range(VersionRange::parse("^2.1").expect("valid range"))
    );
    assert_eq!(range.raw_spec.as_deref(), Some("^2.1"));

    let tag = PackageRequest::parse("@scope/pkg@next").expect("must parse");
    assert_eq!(tag.selector, Selector::Tag("next".to_string()));
}

#[test]
fn parse_request_accepts_whitespace_separated_comparators() {
    let request = PackageRequest::parse("pkg@>=1.2.0 <2.0.0").expect("must parse");
    let Selector::Range(requirement) = request.selector else {
        panic!("expected range selector");
    };
    assert!(requirement.matches(&Version::new(1, 9, 0)));
    assert!(!requirement.matches(&Version::new(2, 0, 0)));
}

#[test]
fn parse_request_bare_partial_version_stays_within_minor() {
    let request = PackageRequest::parse("pkg@1.2").expect("must parse");
    let Selector::Range(range) = request.selector else {
        panic!("expected range selector");
    };
    assert!(range.matches(&Version::new(1, 2, 7)));
    assert!(!range.matches(&Version::new(1, 9, 0)));
}

#[test]
fn parse_request_accepts_union_and_hyphen_ranges() {
    let request = PackageRequest::parse("pkg@^8.0.0 || ^9.0.0").expect("must parse");
    let Selector::Range(range) = &request.selector else {
        panic!("expected range selector");
    };
    assert!(range.matches(&Version::new(8, 1, 0)));
    assert!(range.matches(&Version::new(9, 3, 0)));
    assert!(!range.matches(&Version::new(10, 0, 0)));
    assert_eq!(request.to_string(), "pkg@^8.0.0 || ^9.0.0");

    let request = PackageRequest::parse("pkg@1.0.0 - 2.0.0").expect("must parse");
    let Selector::Range(range) = &request.selector else {
        panic!("expected range selector");
    };
    assert!(range.matches(&Version::new(2, 0, 0)));
    assert!(!range.matches(&Version::new(2, 0, 1)));
}

#[test]
fn parse_request_rejects_non_registry_identifiers() {
    for raw in [
        "file:../local-pkg",
        "./vendor/pkg",
        "git+https://example.test/repo.git",
        "user/repo",
        "pkg@github:user/repo",
        "https://example.test/pkg.tgz",
    ] {
        let err = PackageRequest::parse(raw).expect_err("must reject non-registry request");
        assert!(
            matches!(err, RequestError::NotRegistry(_)),
            "unexpected error for {raw}: {err}"
        );
        assert!(err
            .to_string()
            .contains("is not a registry package identifier"));
    }
}

#[test]
fn parse_request_rejects_invalid_name_and_spec() {
    assert!(matches!(
        PackageRequest::parse("@scope"),
        Err(RequestError::InvalidName { .. })
    ));
    assert!(matches!(
        PackageRequest::parse("pkg@1.2.3 - 2.0.0"),
        Err(RequestError::InvalidSpec { .. })
    ));
    assert_eq!(PackageRequest::parse("  "), Err(RequestError::Empty));
}

#[test]
fn prefer_next_only_applies_without_explicit_specifier() {
    let mut bare = PackageRequest::parse("pkg").expect("must parse");
    bare.prefer_next();
    assert_eq!(bare.selector, Selector::Tag("next".to_string()));
    assert_eq!(bare.to_string(), "pkg@next");

    let mut pinned = PackageRequest::parse("pkg@2.0.0").expect("must parse");
    pinned.prefer_next();
    assert_eq!(pinned.selector, Selector::Version(Version::new(2, 0, 0)));
}

#[test]
fn parse_manifest_reads_update_metadata() {
    let manifest = PackageManifest::from_json_str(
        r#"{
  "name": "@updraft/core",
  "version": "9.1.0",
  "peerDependencies": { "rxjs": "^6.5.0" },
  "updraft": {
    "migrations": "./migrations/collection.json",
    "packageGroup": ["@updraft/core", "@updraft/forms"]
  }
}"#,
    )
    .expect("manifest should parse");

    assert_eq!(manifest.semver(), Some(Version::new(9, 1, 0)));
    assert_eq!(
        manifest.migrations_field(),
        MigrationsField::Declared("./migrations/collection.json".to_string())
    );
    assert_eq!(
        manifest.package_group(),
        vec!["@updraft/core".to_string(), "@updraft/forms".to_string()]
    );
    assert_eq!(
        manifest.peer_dependencies.get("rxjs").map(String::as_str),
        Some("^6.5.0")
    );
}

#[test]
fn migrations_field_distinguishes_absent_and_malformed() {
    let absent = PackageManifest::from_json_str(r#"{"name":"a","version":"1.0.0"}"#)
        .expect("manifest should parse");
    assert_eq!(absent.migrations_field(), MigrationsField::Absent);

    let malformed = PackageManifest::from_json_str(
        r#"{"name":"a","version":"1.0.0","updraft":{"migrations":42}}"#,
    )
    .expect("manifest should parse");
    assert_eq!(malformed.migrations_field(), MigrationsField::Malformed);
}

#[test]
fn parse_manifest_tolerates_self_listed_dependency() {
    let manifest = PackageManifest::from_json_str(
        r#"{ "name": "odd-pkg", "version": "1.0.0", "dependencies": { "odd-pkg": "^1.0.0" } }"#,
    )
    .expect("manifest should parse");
    assert_eq!(manifest.semver(), Some(Version::new(1, 0, 0)));
    assert!(manifest.dependencies.contains_key("odd-pkg"));
}

#[test]
fn all_dependencies_prefers_runtime_declarations() {
    let manifest = PackageManifest::from_json_str(
        r#"{
  "name": "app",
  "dependencies": { "shared": "^2.0.0" },
  "devDependencies": { "shared": "^1.0.0", "tooling": "~3.1.0" }
}"#,
    )
    .expect("manifest should parse");

    let merged = manifest.all_dependencies();
    assert_eq!(merged.get("shared").map(String::as_str), Some("^2.0.0"));
    assert_eq!(merged.get("tooling").map(String::as_str), Some("~3.1.0"));
}

#[test]
fn set_dependency_spec_preserves_document_shape() {
    let mut document = json!({
        "name": "app",
        "scripts": { "build": "tsc" },
        "dependencies": { "a": "^1.0.0", "b": "~2.0.0" },
        "devDependencies": { "c": "3.0.0" }
    });

    assert!(set_dependency_spec(&mut document, "b", "~2.4.0"));
    assert!(!set_dependency_spec(&mut document, "missing", "1.0.0"));
    assert_eq!(document["dependencies"]["b"], "~2.4.0");
    assert_eq!(document["dependencies"]["a"], "^1.0.0");
    assert_eq!(document["scripts"]["build"], "tsc");
}

#[test]
fn parse_collection_and_descriptor_title() {
    let collection = MigrationCollectionFile::from_json_str(
        r#"{
  "name": "core-migrations",
  "migrations": {
    "rename-module": {
      "version": "9",
      "description": "Renames the legacy module. Updates imports across the project",
      "command": ["node", "./rename-module.js"]
    }
  }
}"#,
    )
    .expect("collection should parse");

    let entry = &collection.migrations["rename-module"];
    assert_eq!(entry.version.as_deref(), Some("9"));
    assert_eq!(entry.command, vec!["node", "./rename-module.js"]);

    let descriptor = MigrationDescriptor {
        name: "rename-module".to_string(),
        description: entry.description.clone(),
        version: coerce_version(entry.version.as_deref()),
        collection: "core-migrations".to_string(),
        collection_path: std::path::PathBuf::from("collection.json"),
    };
    assert_eq!(descriptor.title(), "Renames the legacy module.");
    assert_eq!(
        descriptor.detail_lines(),
        vec!["Updates imports across the project".to_string()]
    );
}

#[test]
fn parse_collection_rejects_blank_migration_name() {
    let err = MigrationCollectionFile::from_json_str(r#"{"migrations":{" ":{}}}"#)
        .expect_err("blank name must be rejected");
    assert!(err.to_string().contains("must not be empty"));
}

#[test]
fn parse_metadata_skips_invalid_versions_and_tags() {
    let metadata = PackageMetadata::from_json_str(
        r#"{
  "name": "pkg",
  "dist-tags": { "latest": "2.0.0", "broken": "not-a-version" },
  "versions": {
    "1.0.0": { "version": "1.0.0" },
    "2.0.0": { "name": "pkg", "version": "2.0.0" },
    "garbage": { "version": "garbage" }
  }
}"#,
    )
    .expect("metadata should parse");

    assert_eq!(metadata.versions.len(), 2);
    assert_eq!(metadata.tagged("latest"), Some(&Version::new(2, 0, 0)));
    assert_eq!(metadata.tagged("broken"), None);
    assert_eq!(metadata.versions[&Version::new(1, 0, 0)].name, "pkg");
}
