use std::path::Path;

use anyhow::Result;
use semver::Version;
use serde_json::json;
use updraft_core::MigrationDescriptor;
use updraft_resolver::{select_by_name, select_in_range, MigrationRange};
use updraft_workspace::load_collection;

use crate::checkpoint::CheckpointController;
use crate::logger::Logger;
use crate::runner::TransformRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    TransformFailed,
    CommitFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceOutcome {
    Completed {
        applied: Vec<String>,
    },
    /// Steps in `applied` stay applied (and committed, when enabled).
    Halted {
        applied: Vec<String>,
        failed: String,
        reason: HaltReason,
    },
}

impl SequenceOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn applied(&self) -> &[String] {
        match self {
            Self::Completed { applied } | Self::Halted { applied, .. } => applied,
        }
    }
}

/// Runs selected migrations strictly one after another, checkpointing each
/// step when asked to.
pub struct MigrationExecutor<'a> {
    runner: &'a TransformRunner<'a>,
    checkpoints: &'a CheckpointController<'a>,
    logger: &'a dyn Logger,
}

impl<'a> MigrationExecutor<'a> {
    pub fn new(
        runner: &'a TransformRunner<'a>,
        checkpoints: &'a CheckpointController<'a>,
        logger: &'a dyn Logger,
    ) -> Self {
        Self {
            runner,
            checkpoints,
            logger,
        }
    }

    /// Runs one migration chosen by name. Errors cover discovery and lookup;
    /// execution failures are reported through the outcome.
    pub fn execute_migration(
        &self,
        package: &str,
        collection_path: &Path,
        migration: &str,
        commit: bool,
    ) -> Result<SequenceOutcome> {
        let collection = load_collection(collection_path)?;
        let descriptors = collection.descriptors();
        let selected = select_by_name(&descriptors, package, migration)?.clone();

        self.logger.info(&format!(
            "** Executing '{migration}' of package '{package}' **\n"
        ));
        Ok(self.execute_package_migrations(&[selected], package, commit))
    }

    /// Runs every migration declared in `(from, to]`.
    pub fn execute_migrations(
        &self,
        package: &str,
        collection_path: &Path,
        from: &Version,
        to: &Version,
        commit: bool,
    ) -> Result<SequenceOutcome> {
        let collection = load_collection(collection_path)?;
        let range = MigrationRange::new(from, to);
        let selected = select_in_range(&collection.descriptors(), &range);
        tracing::debug!(
            package,
            lower = %range.lower(),
            upper = %range.upper(),
            count = selected.len(),
            "selected migrations"
        );

        if selected.is_empty() {
            return Ok(SequenceOutcome::Completed {
                applied: Vec::new(),
            });
        }

        self.logger
            .info(&format!("** Executing migrations of package '{package}' **\n"));
        Ok(self.execute_package_migrations(&selected, package, commit))
    }

    pub fn execute_package_migrations(
        &self,
        migrations: &[MigrationDescriptor],
        package: &str,
        commit: bool,
    ) -> SequenceOutcome {
        let total = migrations.len() as u64;
        let mut applied = Vec::new();

        for (index, migration) in migrations.iter().enumerate() {
            self.logger.info(&format!("> {}", migration.title()));
            let details = migration.detail_lines();
            if !details.is_empty() {
                self.logger.info(&format!("  {}", details.join(".\n  ")));
            }

            let collection = migration.collection_path.display().to_string();
            let result = self.runner.execute(&collection, &migration.name, json!({}));
            if !result.success {
                return SequenceOutcome::Halted {
                    applied,
                    failed: migration.name.clone(),
                    reason: HaltReason::TransformFailed,
                };
            }

            self.logger.info("  Migration completed.");

            if commit {
                let message = commit_message(package, migration);
                if !self.checkpoints.checkpoint(&message).is_success() {
                    return SequenceOutcome::Halted {
                        applied,
                        failed: migration.name.clone(),
                        reason: HaltReason::CommitFailed,
                    };
                }
            }

            applied.push(migration.name.clone());
            self.logger
                .progress("migrations", (index + 1) as u64, total);
            self.logger.info("");
        }

        SequenceOutcome::Completed { applied }
    }
}

fn commit_message(package: &str, migration: &MigrationDescriptor) -> String {
    let prefix = format!("{package} migration - {}", migration.name);
    if migration.description.is_empty() {
        prefix
    } else {
        format!("{prefix}\n\n{}", migration.description)
    }
}
