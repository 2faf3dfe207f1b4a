use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use semver::Version;
use updraft_core::{coerce_version, MigrationsField, PackageManifest, PackageRequest, Selector};
use updraft_registry::MetadataSource;
use updraft_workspace::{
    find_package_json, project_dependencies, read_package_json, resolve_migrations_path,
    resolve_package_dir, DependencyNode, MigrationsPathError, PackageManager, ResolveError,
    VersionControl, WorkspaceLayout,
};

use crate::checkpoint::CheckpointController;
use crate::config::UpdateConfig;
use crate::host::FollowUpMigration;
use crate::logger::Logger;
use crate::migrate::MigrationExecutor;
use crate::runner::TransformRunner;
use crate::update_transform::{
    pick_with_latest_fallback, UpdateTransformOptions, UPDATE_COLLECTION, UPDATE_TRANSFORM,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub packages: Vec<String>,
    pub force: bool,
    pub next: bool,
    pub migrate_only: bool,
    /// Single migration to run under `migrate_only`.
    pub name: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub create_commits: bool,
    pub allow_dirty: bool,
    pub verbose: bool,
    pub all: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Success,
    Failure,
    /// The working tree had pending changes and the user did not allow it.
    DirtyTree,
}

impl UpdateOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::DirtyTree => 2,
        }
    }

    fn from_success(success: bool) -> Self {
        if success {
            Self::Success
        } else {
            Self::Failure
        }
    }
}

/// Top-level update flow: status, update, or migrate-only.
pub struct UpdateCommand<'a> {
    layout: &'a WorkspaceLayout,
    config: &'a UpdateConfig,
    registry: &'a dyn MetadataSource,
    runner: &'a TransformRunner<'a>,
    vcs: &'a dyn VersionControl,
    logger: &'a dyn Logger,
}

impl<'a> UpdateCommand<'a> {
    pub fn new(
        layout: &'a WorkspaceLayout,
        config: &'a UpdateConfig,
        registry: &'a dyn MetadataSource,
        runner: &'a TransformRunner<'a>,
        vcs: &'a dyn VersionControl,
        logger: &'a dyn Logger,
    ) -> Self {
        Self {
            layout,
            config,
            registry,
            runner,
            vcs,
            logger,
        }
    }

    /// Errors are reserved for failures outside any migration step, such as an
    /// unreadable root `package.json`.
    pub fn run(&self, options: &UpdateOptions) -> Result<UpdateOutcome> {
        if !self.config.disable_version_check {
            self.check_self_version(options.next);
        }

        if options.all {
            self.logger.warn(&removed_all_notice(self.config.package_manager));
            return Ok(UpdateOutcome::Success);
        }

        let Some(requests) = self.parse_requests(options) else {
            return Ok(UpdateOutcome::Failure);
        };

        if !self.validate_option_combination(options) {
            return Ok(UpdateOutcome::Failure);
        }

        if !requests.is_empty() && !self.vcs.is_clean() {
            if options.allow_dirty {
                self.logger.warn(
                    "Repository is not clean. Update changes will be mixed with pre-existing changes.",
                );
            } else {
                self.logger.error(
                    "Repository is not clean. Please commit or stash any changes before updating.",
                );
                return Ok(UpdateOutcome::DirtyTree);
            }
        }

        self.logger.info(&format!(
            "Using package manager: '{}'",
            self.config.package_manager
        ));
        self.logger.info("Collecting installed dependencies...");
        let dependencies = project_dependencies(self.layout)?;
        self.logger
            .info(&format!("Found {} dependencies.", dependencies.len()));

        if requests.is_empty() {
            let result = self.runner.execute(
                UPDATE_COLLECTION,
                UPDATE_TRANSFORM,
                self.transform_options(options, Vec::new())?,
            );
            return Ok(UpdateOutcome::from_success(result.success));
        }

        if options.migrate_only {
            return self.migrate_only(options, &requests, &dependencies);
        }

        self.update_packages(options, &requests, &dependencies)
    }

    fn parse_requests(&self, options: &UpdateOptions) -> Option<Vec<PackageRequest>> {
        let mut requests: Vec<PackageRequest> = Vec::new();
        for raw in &options.packages {
            let mut request = match PackageRequest::parse(raw) {
                Ok(request) => request,
                Err(err) => {
                    self.logger.error(&err.to_string());
                    return None;
                }
            };

            if requests.iter().any(|existing| existing.name == request.name) {
                self.logger
                    .error(&format!("Duplicate package '{}' specified.", request.name));
                return None;
            }

            if options.migrate_only && request.raw_spec.is_some() {
                self.logger
                    .warn("Package specifier has no effect when using \"migrate-only\" option.");
            }

            if options.next && request.raw_spec.is_none() {
                request.prefer_next();
            }

            requests.push(request);
        }
        Some(requests)
    }

    fn validate_option_combination(&self, options: &UpdateOptions) -> bool {
        if !options.migrate_only && (options.from.is_some() || options.to.is_some()) {
            self.logger
                .error("Can only use \"from\" or \"to\" options with \"migrate-only\" option.");
            return false;
        }
        if !options.migrate_only && options.name.is_some() {
            self.logger
                .error("Can only use \"name\" option with \"migrate-only\" option.");
            return false;
        }
        if options.name.is_some() && (options.from.is_some() || options.to.is_some()) {
            self.logger.error(
                "The \"name\" option cannot be combined with the \"from\" or \"to\" options.",
            );
            return false;
        }
        true
    }

    /// Warns when the registry knows a newer release of this tool. The run
    /// continues with the installed version either way.
    fn check_self_version(&self, next: bool) {
        let metadata = match self.registry.fetch_metadata(&self.config.self_package) {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::debug!(package = %self.config.self_package, error = %format!("{err:#}"), "skipping version check");
                return;
            }
        };
        let tag = if next { "next" } else { "latest" };
        let newest = metadata
            .tagged(tag)
            .or_else(|| metadata.tagged("latest"))
            .cloned();
        if let Some(newest) = newest.filter(|newest| *newest > self.config.self_version) {
            self.logger.warn(&format!(
                "The installed updraft version ({}) is older than the latest {} version ({newest}).\nConsider updating '{}' before running the update.",
                self.config.self_version,
                if next { "pre-release" } else { "stable" },
                self.config.self_package
            ));
        }
    }

    fn migrate_only(
        &self,
        options: &UpdateOptions,
        requests: &[PackageRequest],
        dependencies: &BTreeMap<String, DependencyNode>,
    ) -> Result<UpdateOutcome> {
        if options.from.is_none() && options.name.is_none() {
            self.logger.error(
                "\"from\" option is required when using the \"migrate-only\" option without a migration name.",
            );
            return Ok(UpdateOutcome::Failure);
        }
        let [request] = requests else {
            self.logger.error(
                "A single package must be specified when using the \"migrate-only\" option.",
            );
            return Ok(UpdateOutcome::Failure);
        };
        if options.next {
            self.logger
                .warn("\"next\" option has no effect when using \"migrate-only\" option.");
        }

        let package_name = request.name.as_str();
        let installed = match dependencies.get(package_name) {
            Some(DependencyNode {
                package: None, ..
            }) => {
                self.logger
                    .error("Package found in package.json but is not installed.");
                return Ok(UpdateOutcome::Failure);
            }
            Some(DependencyNode {
                package: Some(package),
                path,
                ..
            }) => Some((path.clone(), package.clone())),
            None => self.transitive_package(package_name)?,
        };
        let Some((package_dir, package)) = installed else {
            self.logger.error("Package is not installed.");
            return Ok(UpdateOutcome::Failure);
        };

        let collection_path =
            match resolve_migrations_path(&package_dir, &package.migrations_field()) {
                Ok(path) => path,
                Err(err) => {
                    self.logger.error(&err.to_string());
                    return Ok(UpdateOutcome::Failure);
                }
            };
        tracing::debug!(package = package_name, collection = %collection_path.display(), "resolved migrations");

        let checkpoints = CheckpointController::new(self.vcs, self.logger);
        let executor = MigrationExecutor::new(self.runner, &checkpoints, self.logger);

        let outcome = if let Some(migration) = options.name.as_deref() {
            executor.execute_migration(
                package_name,
                &collection_path,
                migration,
                options.create_commits,
            )
        } else {
            let raw_from = options.from.as_deref().unwrap_or_default();
            let Some(from) = coerce_version(Some(raw_from)) else {
                self.logger
                    .error(&format!("\"from\" value [{raw_from}] is not a valid version."));
                return Ok(UpdateOutcome::Failure);
            };
            let raw_to = options.to.as_deref().unwrap_or(&package.version);
            let Some(to) = coerce_version(Some(raw_to)) else {
                self.logger
                    .error(&format!("\"to\" value [{raw_to}] is not a valid version."));
                return Ok(UpdateOutcome::Failure);
            };
            executor.execute_migrations(
                package_name,
                &collection_path,
                &from,
                &to,
                options.create_commits,
            )
        };

        match outcome {
            Ok(outcome) => Ok(UpdateOutcome::from_success(outcome.is_complete())),
            Err(err) => {
                self.logger.error(&format!("{err:#}"));
                Ok(UpdateOutcome::Failure)
            }
        }
    }

    /// Looks up a package that is installed but not declared at the root.
    fn transitive_package(&self, name: &str) -> Result<Option<(PathBuf, PackageManifest)>> {
        let Some(manifest_path) = find_package_json(self.layout.root(), name)? else {
            return Ok(None);
        };
        let package = read_package_json(&manifest_path)?;
        let package_dir = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.layout.root().to_path_buf());
        Ok(Some((package_dir, package)))
    }

    fn update_packages(
        &self,
        options: &UpdateOptions,
        requests: &[PackageRequest],
        dependencies: &BTreeMap<String, DependencyNode>,
    ) -> Result<UpdateOutcome> {
        let mut pending = Vec::new();
        for request in requests {
            let Some(node) = dependencies
                .get(&request.name)
                .filter(|node| node.package.is_some())
            else {
                self.logger
                    .error(&format!("Package '{}' is not a dependency.", request.name));
                return Ok(UpdateOutcome::Failure);
            };

            if let Selector::Version(version) = &request.selector {
                if node.installed_version() == Some(version.to_string().as_str()) {
                    self.logger.info(&format!(
                        "Package '{}' is already at '{version}'.",
                        request.name
                    ));
                    continue;
                }
            }
            pending.push((request, node));
        }

        if pending.is_empty() {
            return Ok(UpdateOutcome::Success);
        }

        self.logger
            .info("Fetching dependency metadata from registry...");

        let mut selectors = Vec::new();
        for (request, node) in pending {
            let metadata = match self.registry.fetch_metadata(&request.name) {
                Ok(metadata) => metadata,
                Err(err) => {
                    self.logger.error(&format!(
                        "Error fetching metadata for '{}': {err:#}",
                        request.name
                    ));
                    return Ok(UpdateOutcome::Failure);
                }
            };

            let allow_latest_fallback = request.raw_spec.is_none();
            let Some(manifest) =
                pick_with_latest_fallback(&metadata, &request.selector, allow_latest_fallback)
                    .ok()
            else {
                self.logger.error(&format!(
                    "Package specified by '{}' does not exist within the registry.",
                    request.raw
                ));
                return Ok(UpdateOutcome::Failure);
            };

            if let Some(message) = self.major_jump_rejection(node, manifest) {
                self.logger.error(&message);
                return Ok(UpdateOutcome::Failure);
            }

            if node.installed_version() == Some(manifest.version.as_str()) {
                self.logger.info(&format!(
                    "Package '{}' is already up to date.",
                    request.name
                ));
                continue;
            }

            selectors.push(format!("{}@{}", request.name, manifest.version));
        }

        if selectors.is_empty() {
            return Ok(UpdateOutcome::Success);
        }

        let result = self.runner.execute(
            UPDATE_COLLECTION,
            UPDATE_TRANSFORM,
            self.transform_options(options, selectors.clone())?,
        );
        if !result.success {
            return Ok(UpdateOutcome::Failure);
        }

        let checkpoints = CheckpointController::new(self.vcs, self.logger);
        if options.create_commits {
            let message = format!("updraft update for packages - {}", selectors.join(", "));
            if !checkpoints.checkpoint(&message).is_success() {
                return Ok(UpdateOutcome::Failure);
            }
        }

        let executor = MigrationExecutor::new(self.runner, &checkpoints, self.logger);
        for migration in &result.follow_up_migrations {
            match self.run_follow_up(&executor, migration, options.create_commits) {
                FollowUp::Completed => {}
                // The update itself landed; a halted migration sequence
                // does not undo it.
                FollowUp::Halted => return Ok(UpdateOutcome::Success),
                FollowUp::Unresolved => return Ok(UpdateOutcome::Failure),
            }
        }

        Ok(UpdateOutcome::Success)
    }

    fn run_follow_up(
        &self,
        executor: &MigrationExecutor<'_>,
        migration: &FollowUpMigration,
        commit: bool,
    ) -> FollowUp {
        let package = migration.package.as_str();
        self.logger.debug(&format!(
            "Resolving migration package '{package}' from '{}'...",
            self.layout.root().display()
        ));

        let package_dir = match resolve_package_dir(package, self.layout.root()) {
            Ok(dir) => dir,
            Err(err @ ResolveError::ModuleNotFound { .. }) => {
                self.logger.debug(&err.to_string());
                self.logger.error(&format!(
                    "Migrations for package ({package}) were not found. The package could not be found in the workspace."
                ));
                return FollowUp::Unresolved;
            }
            Err(err) => {
                self.logger.error(&format!(
                    "Unable to resolve migrations for package ({package}).  [{err}]"
                ));
                return FollowUp::Unresolved;
            }
        };

        let field = MigrationsField::Declared(migration.collection.clone());
        let collection_path = match resolve_migrations_path(&package_dir, &field) {
            Ok(path) => path,
            Err(MigrationsPathError::NotFound) => {
                self.logger.error(&format!(
                    "Migrations for package ({package}) were not found."
                ));
                return FollowUp::Unresolved;
            }
            Err(err) => {
                self.logger.error(&format!(
                    "Unable to resolve migrations for package ({package}).  [{err}]"
                ));
                return FollowUp::Unresolved;
            }
        };

        let (Some(from), Some(to)) = (
            coerce_version(Some(&migration.from)),
            coerce_version(Some(&migration.to)),
        ) else {
            self.logger.error(&format!(
                "Unable to resolve migrations for package ({package}).  [invalid version range {} -> {}]",
                migration.from, migration.to
            ));
            return FollowUp::Unresolved;
        };

        match executor.execute_migrations(package, &collection_path, &from, &to, commit) {
            Ok(outcome) if outcome.is_complete() => FollowUp::Completed,
            Ok(_) => FollowUp::Halted,
            Err(err) => {
                self.logger.error(&format!("{err:#}"));
                FollowUp::Unresolved
            }
        }
    }

    /// Multi-major jumps of the tool itself from before 9 to 12 or later are
    /// refused with a suggested intermediate major.
    fn major_jump_rejection(
        &self,
        node: &DependencyNode,
        target: &PackageManifest,
    ) -> Option<String> {
        let installed = node.package.as_ref()?;
        if installed.name != self.config.self_package {
            return None;
        }
        let current_major = major_of(&installed.version)?;
        let target_major = major_of(&target.version)?;
        if current_major >= 9 || target_major < 12 {
            return None;
        }

        let step = recommended_major(current_major);
        let package = &self.config.self_package;
        Some(format!(
            "Updating multiple major versions at once is not recommended. Run 'updraft update {package}@{step}' in your workspace directory to update to latest '{step}.x' version of '{package}'."
        ))
    }

    fn transform_options(
        &self,
        options: &UpdateOptions,
        packages: Vec<String>,
    ) -> Result<serde_json::Value> {
        let options = UpdateTransformOptions {
            packages,
            force: options.force,
            next: options.next,
            verbose: options.verbose,
            package_manager: self.config.package_manager.to_string(),
        };
        Ok(serde_json::to_value(options)?)
    }
}

enum FollowUp {
    Completed,
    Halted,
    Unresolved,
}

fn major_of(version: &str) -> Option<u64> {
    Version::parse(version)
        .ok()
        .map(|version| version.major)
        .or_else(|| version.split('.').next()?.parse().ok())
}

fn recommended_major(current: u64) -> u64 {
    match current {
        0..=5 => 6,
        6 => 7,
        7 => 8,
        _ => 9,
    }
}

fn removed_all_notice(package_manager: PackageManager) -> String {
    let update_command = match package_manager {
        PackageManager::Yarn => "'yarn upgrade-interactive' or 'yarn upgrade'".to_string(),
        other => format!("'{other} update'"),
    };
    format!(
        "'--all' functionality has been removed as updating multiple packages at once is not recommended.\nTo update packages which don't provide 'updraft update' capabilities in your workspace 'package.json' use {update_command} instead.\nRun the package manager update command after updating packages which provide 'updraft update' capabilities."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recommended_major_steps_one_release_at_a_time() {
        assert_eq!(recommended_major(1), 6);
        assert_eq!(recommended_major(6), 7);
        assert_eq!(recommended_major(7), 8);
        assert_eq!(recommended_major(8), 9);
    }

    #[test]
    fn exit_codes_follow_contract() {
        assert_eq!(UpdateOutcome::Success.exit_code(), 0);
        assert_eq!(UpdateOutcome::Failure.exit_code(), 1);
        assert_eq!(UpdateOutcome::DirtyTree.exit_code(), 2);
    }

    #[test]
    fn removed_all_notice_names_yarn_commands() {
        let notice = removed_all_notice(PackageManager::Yarn);
        assert!(notice.contains("'yarn upgrade-interactive' or 'yarn upgrade'"));
        let notice = removed_all_notice(PackageManager::Pnpm);
        assert!(notice.contains("'pnpm update'"));
    }
}
