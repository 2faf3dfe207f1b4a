use std::collections::BTreeMap;
use std::fs;

use anyhow::{anyhow, Context};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use updraft_core::{
    set_dependency_spec, MigrationsField, PackageManifest, PackageRequest, Selector, VersionRange,
};
use updraft_registry::MetadataSource;
use updraft_resolver::{pick_manifest, PickError};
use updraft_workspace::{project_dependencies, DependencyNode, PackageManager, WorkspaceLayout};

use crate::host::{
    FollowUpMigration, TransformEvent, TransformFailure, TransformHost, TransformReport,
    TransformRequest,
};
use crate::logger::Logger;

/// Reserved collection name of the in-process update transform.
pub const UPDATE_COLLECTION: &str = "updraft:update";
pub const UPDATE_TRANSFORM: &str = "update";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateTransformOptions {
    pub packages: Vec<String>,
    pub force: bool,
    pub next: bool,
    pub verbose: bool,
    pub package_manager: String,
}

#[derive(Debug, Clone)]
struct PlannedUpdate {
    name: String,
    installed: String,
    requested_spec: String,
    target: PackageManifest,
}

/// Status report and dependency rewrite for the workspace root.
pub struct BuiltinUpdateTransform<'a> {
    layout: &'a WorkspaceLayout,
    registry: &'a dyn MetadataSource,
    logger: &'a dyn Logger,
    skip_install: bool,
}

impl<'a> BuiltinUpdateTransform<'a> {
    pub fn new(
        layout: &'a WorkspaceLayout,
        registry: &'a dyn MetadataSource,
        logger: &'a dyn Logger,
        skip_install: bool,
    ) -> Self {
        Self {
            layout,
            registry,
            logger,
            skip_install,
        }
    }

    fn report_status(&self, options: &UpdateTransformOptions) -> Result<(), TransformFailure> {
        let dependencies = project_dependencies(self.layout)?;
        let tag = if options.next { "next" } else { "latest" };

        let mut rows = Vec::new();
        for node in dependencies.values() {
            let Some(package) = node.package.as_ref() else {
                continue;
            };
            if package.update.is_none() {
                continue;
            }
            let Some(installed) = package.semver() else {
                continue;
            };

            let metadata = match self.registry.fetch_metadata(&node.name) {
                Ok(metadata) => metadata,
                Err(err) => {
                    self.logger.warn(&format!(
                        "Unable to fetch metadata for '{}': {err:#}",
                        node.name
                    ));
                    continue;
                }
            };
            let target = pick_with_latest_fallback(&metadata, &Selector::Tag(tag.to_string()), true)
                .ok()
                .and_then(PackageManifest::semver);
            if let Some(target) = target.filter(|target| *target > installed) {
                rows.push((node.name.clone(), installed, target));
            }
        }

        if rows.is_empty() {
            self.logger.info(
                "We analyzed your package.json and everything seems to be in order. Good work!",
            );
            return Ok(());
        }

        self.logger.info(
            "We analyzed your package.json, there are some packages to update:\n",
        );
        let width = rows
            .iter()
            .map(|(name, _, _)| name.len())
            .max()
            .unwrap_or(0)
            .max("Name".len());
        self.logger.info(&format!(
            "  {:<width$}  {:<25}  Command to update",
            "Name", "Version"
        ));
        self.logger.info(&format!("  {}", "-".repeat(width + 50)));
        for (name, installed, target) in rows {
            let versions = format!("{installed} -> {target}");
            self.logger.info(&format!(
                "  {name:<width$}  {versions:<25}  updraft update {name}"
            ));
        }
        Ok(())
    }

    fn apply_update(
        &self,
        options: &UpdateTransformOptions,
        sink: &mut dyn FnMut(TransformEvent),
    ) -> Result<TransformReport, TransformFailure> {
        let dependencies = project_dependencies(self.layout)?;
        let mut planned: BTreeMap<String, PlannedUpdate> = BTreeMap::new();

        for raw in &options.packages {
            let request = PackageRequest::parse(raw).map_err(anyhow::Error::from)?;
            let Some(node) = dependencies.get(&request.name) else {
                self.logger
                    .error(&format!("Package '{}' is not a dependency.", request.name));
                return Err(TransformFailure::Unsuccessful);
            };
            let target = self.resolve_target(&request.name, &request.selector, options.next)?;
            planned.insert(request.name.clone(), planned_update(node, target));
        }

        self.expand_package_groups(&dependencies, &mut planned)?;

        if !options.force {
            self.validate_peer_dependencies(&dependencies, &planned)?;
        }

        for update in planned.values() {
            self.logger.info(&format!(
                "Updating package.json with dependency {} @ \"{}\" (was \"{}\")...",
                update.name,
                rewritten_spec(&update.requested_spec, &update.target.version),
                update.installed
            ));
        }
        let size = self.rewrite_root_manifest(&planned)?;
        sink(TransformEvent::Updated {
            path: "package.json".to_string(),
            size,
        });

        sink(TransformEvent::PostTasksStart);
        if !self.skip_install {
            self.install(&options.package_manager)?;
        }
        sink(TransformEvent::End);

        Ok(TransformReport {
            follow_up_migrations: follow_up_migrations(&planned),
        })
    }

    fn resolve_target(
        &self,
        name: &str,
        selector: &Selector,
        allow_latest_fallback: bool,
    ) -> Result<PackageManifest, TransformFailure> {
        let metadata = self.registry.fetch_metadata(name).map_err(|err| {
            self.logger
                .error(&format!("Error fetching metadata for '{name}': {err:#}"));
            TransformFailure::Unsuccessful
        })?;
        pick_with_latest_fallback(&metadata, selector, allow_latest_fallback)
            .cloned()
            .map_err(|err| {
                self.logger.error(&err.to_string());
                TransformFailure::Unsuccessful
            })
    }

    fn expand_package_groups(
        &self,
        dependencies: &BTreeMap<String, DependencyNode>,
        planned: &mut BTreeMap<String, PlannedUpdate>,
    ) -> Result<(), TransformFailure> {
        let groups = planned
            .values()
            .map(|update| (update.target.version.clone(), update.target.package_group()))
            .collect::<Vec<_>>();

        for (version, members) in groups {
            let Ok(version) = Version::parse(&version) else {
                continue;
            };
            for member in members {
                if planned.contains_key(&member) {
                    continue;
                }
                let Some(node) = dependencies.get(&member) else {
                    continue;
                };
                match self.resolve_target(&member, &Selector::Version(version.clone()), false) {
                    Ok(target) => {
                        planned.insert(member.clone(), planned_update(node, target));
                    }
                    Err(_) => self.logger.warn(&format!(
                        "Package group member '{member}' has no version {version}; leaving it unchanged."
                    )),
                }
            }
        }
        Ok(())
    }

    fn validate_peer_dependencies(
        &self,
        dependencies: &BTreeMap<String, DependencyNode>,
        planned: &BTreeMap<String, PlannedUpdate>,
    ) -> Result<(), TransformFailure> {
        let mut incompatible = Vec::new();
        for update in planned.values() {
            for (peer, range) in &update.target.peer_dependencies {
                let peer_version = match planned.get(peer) {
                    Some(peer_update) => Some(peer_update.target.version.clone()),
                    None => dependencies
                        .get(peer)
                        .and_then(DependencyNode::installed_version)
                        .map(str::to_string),
                };
                let Some(peer_version) = peer_version else {
                    continue;
                };
                let (Ok(requirement), Ok(version)) =
                    (VersionRange::parse(range), Version::parse(&peer_version))
                else {
                    tracing::debug!(package = %update.name, peer = %peer, range = %range, "skipping unparseable peer range");
                    continue;
                };
                if !requirement.matches(&version) {
                    incompatible.push(format!(
                        "Package \"{}\" has an incompatible peer dependency to \"{peer}\" (requires \"{range}\", would install \"{peer_version}\").",
                        update.name
                    ));
                }
            }
        }

        if incompatible.is_empty() {
            return Ok(());
        }
        for line in &incompatible {
            self.logger.error(line);
        }
        self.logger.error(
            "Incompatible peer dependencies found.\nPeer dependency warnings when installing dependencies means that those dependencies might not work correctly together.\nYou can use the '--force' option to ignore incompatible peer dependencies and instead address these warnings later.",
        );
        Err(TransformFailure::Unsuccessful)
    }

    fn rewrite_root_manifest(
        &self,
        planned: &BTreeMap<String, PlannedUpdate>,
    ) -> Result<usize, TransformFailure> {
        let path = self.layout.package_json_path();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed reading package manifest: {}", path.display()))?;
        let mut document: Value = serde_json::from_str(&content)
            .with_context(|| format!("failed parsing package manifest: {}", path.display()))?;

        for update in planned.values() {
            let spec = rewritten_spec(&update.requested_spec, &update.target.version);
            if !set_dependency_spec(&mut document, &update.name, &spec) {
                return Err(anyhow!(
                    "package '{}' is not declared in {}",
                    update.name,
                    path.display()
                )
                .into());
            }
        }

        let mut rendered = serde_json::to_string_pretty(&document)
            .context("failed serializing package manifest")?;
        rendered.push('\n');
        fs::write(&path, &rendered)
            .with_context(|| format!("failed writing package manifest: {}", path.display()))?;
        Ok(rendered.len())
    }

    fn install(&self, package_manager: &str) -> Result<(), TransformFailure> {
        let manager = PackageManager::parse(package_manager).unwrap_or(PackageManager::Npm);
        self.logger
            .info(&format!("Installing packages with {manager}..."));
        let output = manager
            .install_command(self.layout.root())
            .output()
            .with_context(|| format!("failed launching {manager} install"))?;
        if !output.status.success() {
            self.logger.error(&format!(
                "{manager} install failed:\n{}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
            return Err(TransformFailure::Unsuccessful);
        }
        Ok(())
    }
}

impl TransformHost for BuiltinUpdateTransform<'_> {
    fn execute(
        &self,
        request: &TransformRequest,
        sink: &mut dyn FnMut(TransformEvent),
    ) -> Result<TransformReport, TransformFailure> {
        let options: UpdateTransformOptions = serde_json::from_value(request.options.clone())
            .context("invalid update transform options")?;

        if options.packages.is_empty() {
            self.report_status(&options)?;
            sink(TransformEvent::End);
            return Ok(TransformReport::default());
        }

        self.apply_update(&options, sink)
    }
}

/// Picks a manifest; an unqualified `next` request falls back to `latest`
/// when the package has no `next` tag.
pub(crate) fn pick_with_latest_fallback<'m>(
    metadata: &'m updraft_core::PackageMetadata,
    selector: &Selector,
    allow_latest_fallback: bool,
) -> Result<&'m PackageManifest, PickError> {
    match pick_manifest(metadata, selector) {
        Err(PickError::NoMatchingVersion { .. })
            if allow_latest_fallback && matches!(selector, Selector::Tag(tag) if tag == "next") =>
        {
            pick_manifest(metadata, &Selector::Tag("latest".to_string()))
        }
        other => other,
    }
}

fn planned_update(node: &DependencyNode, target: PackageManifest) -> PlannedUpdate {
    PlannedUpdate {
        name: node.name.clone(),
        installed: node.installed_version().unwrap_or_default().to_string(),
        requested_spec: node.requested.clone(),
        target,
    }
}

/// Keeps a caret or tilde prefix from the previous spec.
fn rewritten_spec(previous: &str, version: &str) -> String {
    match previous.trim().chars().next() {
        Some(prefix @ ('^' | '~')) => format!("{prefix}{version}"),
        _ => version.to_string(),
    }
}

fn follow_up_migrations(planned: &BTreeMap<String, PlannedUpdate>) -> Vec<FollowUpMigration> {
    planned
        .values()
        .filter_map(|update| match update.target.migrations_field() {
            MigrationsField::Declared(collection) if !update.installed.is_empty() => {
                Some(FollowUpMigration {
                    package: update.name.clone(),
                    collection,
                    from: update.installed.clone(),
                    to: update.target.version.clone(),
                })
            }
            _ => None,
        })
        .collect()
}
