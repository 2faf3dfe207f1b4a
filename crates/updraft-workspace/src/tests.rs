use std::fs;
use std::path::Path;
use std::process::Command;

use semver::Version;
use updraft_core::MigrationsField;

use super::*;

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("must create parent dirs");
    }
    fs::write(path, content).expect("must write file");
}

fn seed_workspace(root: &Path) {
    write_file(
        &root.join("package.json"),
        r#"{
  "name": "app",
  "dependencies": { "@updraft/core": "^8.0.0", "declared-only": "^1.0.0" },
  "devDependencies": { "tooling": "~2.0.0" }
}"#,
    );
    write_file(
        &root.join("node_modules/@updraft/core/package.json"),
        r#"{
  "name": "@updraft/core",
  "version": "8.2.0",
  "updraft": { "migrations": "./migrations/collection.json" }
}"#,
    );
    write_file(
        &root.join("node_modules/tooling/package.json"),
        r#"{"name":"tooling","version":"2.0.3"}"#,
    );
    write_file(
        &root.join("node_modules/transitive/package.json"),
        r#"{"name":"transitive","version":"0.4.0"}"#,
    );
}

const COLLECTION: &str = r#"{
  "name": "core-migrations",
  "migrations": {
    "b-step": { "version": "9", "description": "Second step.", "command": ["true"] },
    "a-step": { "version": "9.0.0", "description": "First step.", "command": ["true"] },
    "loose": { "version": "not-a-version", "description": "Manual only." }
  }
}"#;

#[test]
fn project_dependencies_reports_installed_and_missing_packages() {
    let root = tempfile::tempdir().expect("must create temp dir");
    seed_workspace(root.path());
    let layout = WorkspaceLayout::new(root.path());

    let dependencies = project_dependencies(&layout).expect("must read dependencies");
    assert_eq!(dependencies.len(), 3);

    let core = &dependencies["@updraft/core"];
    assert_eq!(core.requested, "^8.0.0");
    assert_eq!(core.installed_version(), Some("8.2.0"));
    assert!(core.path.ends_with("node_modules/@updraft/core"));

    assert!(dependencies["declared-only"].package.is_none());
    assert_eq!(dependencies["tooling"].installed_version(), Some("2.0.3"));
}

#[test]
fn project_dependencies_without_manifest_is_empty() {
    let root = tempfile::tempdir().expect("must create temp dir");
    let layout = WorkspaceLayout::new(root.path());
    assert!(project_dependencies(&layout)
        .expect("must succeed")
        .is_empty());
}

#[test]
fn find_package_json_resolves_transitive_install() {
    let root = tempfile::tempdir().expect("must create temp dir");
    seed_workspace(root.path());

    let found = find_package_json(root.path(), "transitive")
        .expect("must resolve")
        .expect("must be installed");
    let manifest = read_package_json(&found).expect("must parse");
    assert_eq!(manifest.semver(), Some(Version::new(0, 4, 0)));

    assert_eq!(
        find_package_json(root.path(), "absent").expect("must resolve"),
        None
    );
}

#[test]
fn resolve_module_walks_up_from_nested_package() {
    let root = tempfile::tempdir().expect("must create temp dir");
    seed_workspace(root.path());
    write_file(
        &root.path().join("node_modules/@updraft/schematics/migrations.json"),
        COLLECTION,
    );

    let base = root.path().join("node_modules/@updraft/core");
    let resolved =
        resolve_module("@updraft/schematics/migrations", &base).expect("must resolve hoisted");
    assert!(resolved.ends_with("node_modules/@updraft/schematics/migrations.json"));

    let package_dir = resolve_package_dir("tooling", &base).expect("must resolve package dir");
    assert!(package_dir.ends_with("node_modules/tooling"));

    let err = resolve_module("@updraft/schematics/absent", &base).expect_err("must miss");
    assert!(matches!(err, ResolveError::ModuleNotFound { .. }));
}

#[test]
fn resolve_migrations_path_rejects_absolute_and_escaping_paths() {
    let root = tempfile::tempdir().expect("must create temp dir");
    let package_dir = root.path().join("node_modules/pkg");

    for raw in ["/etc/collection.json", "C:\\collection.json", "c:/collection.json"] {
        let err = resolve_migrations_path(&package_dir, &MigrationsField::Declared(raw.into()))
            .expect_err("absolute path must be rejected");
        assert!(matches!(err, MigrationsPathError::Absolute), "{raw}: {err}");
    }

    for raw in ["../other/collection.json", "..\\other\\collection.json", "a/../../x.json"] {
        let err = resolve_migrations_path(&package_dir, &MigrationsField::Declared(raw.into()))
            .expect_err("escaping path must be rejected");
        assert!(
            matches!(err, MigrationsPathError::OutsidePackage),
            "{raw}: {err}"
        );
    }

    assert!(matches!(
        resolve_migrations_path(&package_dir, &MigrationsField::Absent),
        Err(MigrationsPathError::Missing)
    ));
    assert!(matches!(
        resolve_migrations_path(&package_dir, &MigrationsField::Malformed),
        Err(MigrationsPathError::Malformed)
    ));
}

#[test]
fn resolve_migrations_path_prefers_local_then_module_resolution() {
    let root = tempfile::tempdir().expect("must create temp dir");
    seed_workspace(root.path());
    let package_dir = root.path().join("node_modules/@updraft/core");
    write_file(&package_dir.join("migrations/collection.json"), COLLECTION);
    write_file(
        &root.path().join("node_modules/shared-migrations/index.json"),
        COLLECTION,
    );

    let local = resolve_migrations_path(
        &package_dir,
        &MigrationsField::Declared("./migrations/collection.json".into()),
    )
    .expect("local path must resolve");
    assert!(local.ends_with("migrations/collection.json"));

    let hoisted = resolve_migrations_path(
        &package_dir,
        &MigrationsField::Declared("shared-migrations".into()),
    )
    .expect("module path must resolve");
    assert!(hoisted.ends_with("node_modules/shared-migrations/index.json"));

    let err = resolve_migrations_path(
        &package_dir,
        &MigrationsField::Declared("./missing.json".into()),
    )
    .expect_err("missing collection must fail");
    assert!(matches!(err, MigrationsPathError::NotFound));
    assert_eq!(err.to_string(), "Migrations for package were not found.");
}

#[test]
fn load_collection_enumerates_descriptors_in_name_order() {
    let root = tempfile::tempdir().expect("must create temp dir");
    let path = root.path().join("collection.json");
    write_file(&path, COLLECTION);

    let collection = load_collection(&path).expect("collection must load");
    assert_eq!(collection.name, "core-migrations");
    assert_eq!(collection.names(), vec!["a-step", "b-step", "loose"]);

    let descriptors = collection.descriptors();
    assert_eq!(descriptors[0].version, Some(Version::new(9, 0, 0)));
    assert_eq!(descriptors[1].version, Some(Version::new(9, 0, 0)));
    assert_eq!(descriptors[2].version, None);
    assert!(descriptors.iter().all(|d| d.collection == "core-migrations"));
    assert_eq!(
        collection.entry("a-step").map(|entry| entry.command.clone()),
        Some(vec!["true".to_string()])
    );
}

#[test]
fn load_collection_distinguishes_missing_and_malformed() {
    let root = tempfile::tempdir().expect("must create temp dir");
    let missing = root.path().join("missing.json");
    assert!(matches!(
        load_collection(&missing),
        Err(DiscoveryError::NotFound(_))
    ));

    let malformed = root.path().join("broken.json");
    write_file(&malformed, "{ not json");
    assert!(matches!(
        load_collection(&malformed),
        Err(DiscoveryError::Malformed { .. })
    ));

    let unnamed = root.path().join("fallback-name.json");
    write_file(&unnamed, r#"{"migrations":{}}"#);
    let collection = load_collection(&unnamed).expect("must load");
    assert_eq!(collection.name, "fallback-name");
    assert!(collection.descriptors().is_empty());
}

#[test]
fn detect_package_manager_from_lockfiles() {
    let root = tempfile::tempdir().expect("must create temp dir");
    assert_eq!(detect_package_manager(root.path()), PackageManager::Npm);

    write_file(&root.path().join("yarn.lock"), "");
    assert_eq!(detect_package_manager(root.path()), PackageManager::Yarn);

    write_file(&root.path().join("pnpm-lock.yaml"), "");
    assert_eq!(detect_package_manager(root.path()), PackageManager::Pnpm);

    assert_eq!(PackageManager::parse("Bun").expect("must parse"), PackageManager::Bun);
    assert!(PackageManager::parse("cargo").is_err());
}

#[test]
fn short_hash_truncates_to_nine_characters() {
    assert_eq!(short_hash("0123456789abcdef"), "012345678");
    assert_eq!(short_hash("abc"), "abc");
}

fn run_git(repo_root: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_root)
        .output()
        .expect("git command must execute");
    assert!(
        output.status.success(),
        "git command failed: git {}\nstdout:\n{}\nstderr:\n{}",
        args.join(" "),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn init_repo(root: &Path) {
    run_git(root, &["init", "-q"]);
    run_git(root, &["config", "user.email", "updraft@example.test"]);
    run_git(root, &["config", "user.name", "Updraft Tests"]);
    run_git(root, &["config", "commit.gpgsign", "false"]);
    write_file(&root.join(".gitignore"), "node_modules/\n");
    write_file(&root.join("README.md"), "seed\n");
    run_git(root, &["add", "-A"]);
    run_git(root, &["commit", "-q", "-m", "seed"]);
}

#[test]
fn git_repository_status_stage_and_commit() {
    let root = tempfile::tempdir().expect("must create temp dir");
    init_repo(root.path());
    let repo = GitRepository::new(root.path());

    assert!(repo.status().expect("status must run").is_empty());
    let before = repo.current_commit_id().expect("must read head");

    write_file(&root.path().join("README.md"), "changed\n");
    write_file(&root.path().join("src/new.ts"), "export {};\n");
    write_file(&root.path().join("node_modules/x/index.js"), "ignored\n");
    assert_eq!(
        repo.status().expect("status must run"),
        vec!["README.md".to_string(), "src/new.ts".to_string()]
    );

    repo.stage_all().expect("must stage");
    repo.commit("pkg migration - step\n\nBody text.")
        .expect("must commit");

    let after = repo.current_commit_id().expect("must read head");
    assert_ne!(before, after);
    assert_eq!(after.len(), 40);
    assert!(repo.status().expect("status must run").is_empty());
}

#[test]
fn git_repository_status_includes_staged_changes() {
    let root = tempfile::tempdir().expect("must create temp dir");
    init_repo(root.path());
    let repo = GitRepository::new(root.path());

    write_file(&root.path().join("src/added.ts"), "export {};\n");
    run_git(root.path(), &["add", "src/added.ts"]);
    run_git(root.path(), &["mv", "README.md", "GUIDE.md"]);

    assert_eq!(
        repo.status().expect("status must run"),
        vec![
            "GUIDE.md".to_string(),
            "README.md".to_string(),
            "src/added.ts".to_string()
        ]
    );

    repo.stage_all().expect("must stage");
    repo.commit("pkg migration - staged step").expect("must commit");
    assert!(repo.status().expect("status must run").is_empty());
}

#[test]
fn git_repository_commit_failure_reports_output() {
    let root = tempfile::tempdir().expect("must create temp dir");
    init_repo(root.path());
    let repo = GitRepository::new(root.path());

    let err = repo
        .commit("nothing staged")
        .expect_err("empty commit must fail");
    assert!(err.to_string().contains("git commit failed"));
}

#[test]
fn check_clean_workspace_ignores_changes_outside_root() {
    let root = tempfile::tempdir().expect("must create temp dir");
    init_repo(root.path());
    let workspace = root.path().join("apps/web");
    write_file(&workspace.join("package.json"), "{}\n");
    run_git(root.path(), &["add", "-A"]);
    run_git(root.path(), &["commit", "-q", "-m", "add workspace"]);

    assert!(check_clean_workspace(&workspace));

    write_file(&root.path().join("README.md"), "outside change\n");
    assert!(check_clean_workspace(&workspace));

    write_file(&workspace.join("src/main.ts"), "inside change\n");
    assert!(!check_clean_workspace(&workspace));
}

#[test]
fn check_clean_workspace_outside_repository_is_clean() {
    let root = tempfile::tempdir().expect("must create temp dir");
    write_file(&root.path().join("file.txt"), "untracked\n");
    assert!(check_clean_workspace(root.path()));
}
