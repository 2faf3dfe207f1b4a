use std::collections::BTreeSet;

use serde_json::Value;

use crate::diagnostics::write_error_to_log_file;
use crate::host::{
    FollowUpMigration, TransformEvent, TransformFailure, TransformHost, TransformRequest,
};
use crate::logger::Logger;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub success: bool,
    pub changed_files: BTreeSet<String>,
    pub follow_up_migrations: Vec<FollowUpMigration>,
}

/// Applies transforms and turns their event stream into user-facing change
/// lines.
pub struct TransformRunner<'a> {
    host: &'a dyn TransformHost,
    logger: &'a dyn Logger,
}

impl<'a> TransformRunner<'a> {
    pub fn new(host: &'a dyn TransformHost, logger: &'a dyn Logger) -> Self {
        Self { host, logger }
    }

    /// Never returns an error: reported failures and internal faults both
    /// come back as `success: false`.
    pub fn execute(&self, collection: &str, name: &str, options: Value) -> ExecutionResult {
        let request = TransformRequest {
            collection: collection.to_string(),
            name: name.to_string(),
            options,
        };
        tracing::debug!(collection, transform = name, "applying transform");

        let mut changes = ChangeLog::new(self.logger);
        let outcome = self
            .host
            .execute(&request, &mut |event| changes.observe(event));

        match outcome {
            Ok(report) => ExecutionResult {
                success: !changes.failed,
                changed_files: changes.files,
                follow_up_migrations: report.follow_up_migrations,
            },
            Err(TransformFailure::Unsuccessful) => {
                self.logger
                    .error("Migration failed. See above for further details.\n");
                ExecutionResult {
                    success: false,
                    changed_files: changes.files,
                    follow_up_migrations: Vec::new(),
                }
            }
            Err(TransformFailure::Fault(err)) => {
                match write_error_to_log_file(&err) {
                    Ok(path) => self.logger.fatal(&format!(
                        "Migration failed: {err:#}\n  See \"{}\" for further details.\n",
                        path.display()
                    )),
                    Err(log_err) => self.logger.fatal(&format!(
                        "Migration failed: {err:#}\n  (diagnostic log unavailable: {log_err:#})\n"
                    )),
                }
                ExecutionResult {
                    success: false,
                    changed_files: changes.files,
                    follow_up_migrations: Vec::new(),
                }
            }
        }
    }
}

/// Buffers change lines until the transform reaches a terminal boundary and
/// drops them once any error was reported.
struct ChangeLog<'a> {
    logger: &'a dyn Logger,
    failed: bool,
    pending: Vec<String>,
    files: BTreeSet<String>,
}

impl<'a> ChangeLog<'a> {
    fn new(logger: &'a dyn Logger) -> Self {
        Self {
            logger,
            failed: false,
            pending: Vec::new(),
            files: BTreeSet::new(),
        }
    }

    fn observe(&mut self, event: TransformEvent) {
        match event {
            TransformEvent::Error { path, description } => {
                self.failed = true;
                let detail = if description == "alreadyExist" {
                    "already exists"
                } else {
                    "does not exist"
                };
                self.logger
                    .error(&format!("ERROR! {} {detail}.", strip_leading_separator(&path)));
            }
            TransformEvent::Updated { path, size } => {
                let path = strip_leading_separator(&path);
                self.pending.push(format!("UPDATE {path} ({size} bytes)"));
                self.files.insert(path.to_string());
            }
            TransformEvent::Created { path, size } => {
                let path = strip_leading_separator(&path);
                self.pending.push(format!("CREATE {path} ({size} bytes)"));
                self.files.insert(path.to_string());
            }
            TransformEvent::Deleted { path } => {
                let path = strip_leading_separator(&path);
                self.pending.push(format!("DELETE {path}"));
                self.files.insert(path.to_string());
            }
            TransformEvent::Renamed { path, to } => {
                let path = strip_leading_separator(&path);
                self.pending
                    .push(format!("RENAME {path} => {}", strip_leading_separator(&to)));
                self.files.insert(path.to_string());
            }
            TransformEvent::PostTasksStart | TransformEvent::End => {
                if !self.failed {
                    for line in self.pending.drain(..) {
                        self.logger.info(&format!("  {line}"));
                    }
                }
            }
        }
    }
}

fn strip_leading_separator(path: &str) -> &str {
    path.strip_prefix('/')
        .or_else(|| path.strip_prefix('\\'))
        .unwrap_or(path)
}
