use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use updraft_workspace::load_collection;

use crate::logger::Logger;
use crate::update_transform::{BuiltinUpdateTransform, UPDATE_COLLECTION};

/// A request to apply one named transform from a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformRequest {
    pub collection: String,
    pub name: String,
    pub options: Value,
}

/// File-level change notifications and lifecycle boundaries reported while a
/// transform runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TransformEvent {
    #[serde(rename = "create")]
    Created { path: String, size: usize },
    #[serde(rename = "update")]
    Updated { path: String, size: usize },
    #[serde(rename = "delete")]
    Deleted { path: String },
    #[serde(rename = "rename")]
    Renamed { path: String, to: String },
    Error {
        path: String,
        #[serde(default)]
        description: String,
    },
    PostTasksStart,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpMigration {
    pub package: String,
    pub collection: String,
    pub from: String,
    pub to: String,
}

/// What a transform hands back besides its events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformReport {
    pub follow_up_migrations: Vec<FollowUpMigration>,
}

#[derive(Debug, Error)]
pub enum TransformFailure {
    /// The transform ran and failed; details were already reported.
    #[error("transform reported an unsuccessful execution")]
    Unsuccessful,
    /// Something unexpected broke while running the transform.
    #[error(transparent)]
    Fault(#[from] anyhow::Error),
}

pub trait TransformHost {
    fn execute(
        &self,
        request: &TransformRequest,
        sink: &mut dyn FnMut(TransformEvent),
    ) -> Result<TransformReport, TransformFailure>;
}

const OPTIONS_ENV: &str = "UPDRAFT_TRANSFORM_OPTIONS";
const COLLECTION_DIR_ENV: &str = "UPDRAFT_COLLECTION_DIR";

/// Runs a migration's declared command inside the workspace.
///
/// Stdout lines beginning with `{` are JSON events; anything else, and all of
/// stderr, is passed through to the logger.
pub struct ProcessTransformHost<'a> {
    workspace_root: PathBuf,
    logger: &'a dyn Logger,
}

impl<'a> ProcessTransformHost<'a> {
    pub fn new(workspace_root: impl Into<PathBuf>, logger: &'a dyn Logger) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            logger,
        }
    }
}

impl TransformHost for ProcessTransformHost<'_> {
    fn execute(
        &self,
        request: &TransformRequest,
        sink: &mut dyn FnMut(TransformEvent),
    ) -> Result<TransformReport, TransformFailure> {
        let collection_path = PathBuf::from(&request.collection);
        let collection = load_collection(&collection_path).map_err(anyhow::Error::from)?;
        let entry = collection.entry(&request.name).ok_or_else(|| {
            anyhow!(
                "migration '{}' is not declared in {}",
                request.name,
                collection_path.display()
            )
        })?;
        let Some((program, args)) = entry.command.split_first() else {
            return Err(anyhow!(
                "migration '{}' in {} declares no command",
                request.name,
                collection_path.display()
            )
            .into());
        };

        let collection_dir = collection_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let options = serde_json::to_string(&request.options)
            .context("failed serializing transform options")?;

        let mut child = Command::new(resolve_collection_relative(program, &collection_dir))
            .args(
                args.iter()
                    .map(|arg| resolve_collection_relative(arg, &collection_dir)),
            )
            .current_dir(&self.workspace_root)
            .env(OPTIONS_ENV, options)
            .env(COLLECTION_DIR_ENV, &collection_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed launching migration '{}'", request.name))?;

        let stderr = child.stderr.take();
        let stderr_reader = thread::spawn(move || {
            stderr
                .map(|stream| {
                    BufReader::new(stream)
                        .lines()
                        .map_while(Result::ok)
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        });

        let mut malformed: Option<anyhow::Error> = None;
        let mut read_error: Option<std::io::Error> = None;
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        read_error = Some(err);
                        break;
                    }
                };
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if !trimmed.starts_with('{') {
                    self.logger.info(trimmed);
                    continue;
                }
                match serde_json::from_str::<TransformEvent>(trimmed) {
                    Ok(event) => sink(event),
                    Err(err) if malformed.is_none() => {
                        malformed = Some(
                            anyhow!(err).context(format!("malformed transform event: {trimmed}")),
                        );
                    }
                    Err(_) => {}
                }
            }
        }

        if read_error.is_some() {
            // Stdout is closed; stop the child so the wait below cannot block.
            let _ = child.kill();
        }
        let status = child
            .wait()
            .with_context(|| format!("failed waiting for migration '{}'", request.name))?;
        let stderr_lines = stderr_reader
            .join()
            .map_err(|_| anyhow!("migration stderr reader panicked"))?;
        for line in &stderr_lines {
            self.logger.info(line);
        }

        if let Some(err) = read_error {
            return Err(anyhow!(err).context("failed reading migration output").into());
        }
        if let Some(err) = malformed {
            return Err(err.into());
        }
        if !status.success() {
            tracing::debug!(migration = %request.name, ?status, "migration exited unsuccessfully");
            return Err(TransformFailure::Unsuccessful);
        }

        sink(TransformEvent::End);
        Ok(TransformReport::default())
    }
}

fn resolve_collection_relative(value: &str, collection_dir: &Path) -> PathBuf {
    if value.starts_with("./") || value.starts_with("../") {
        collection_dir.join(value)
    } else {
        PathBuf::from(value)
    }
}

/// Sends the built-in update collection to the in-process transform and
/// everything else to the process host.
pub struct RoutingHost<'a> {
    update: BuiltinUpdateTransform<'a>,
    process: ProcessTransformHost<'a>,
}

impl<'a> RoutingHost<'a> {
    pub fn new(update: BuiltinUpdateTransform<'a>, process: ProcessTransformHost<'a>) -> Self {
        Self { update, process }
    }
}

impl TransformHost for RoutingHost<'_> {
    fn execute(
        &self,
        request: &TransformRequest,
        sink: &mut dyn FnMut(TransformEvent),
    ) -> Result<TransformReport, TransformFailure> {
        if request.collection == UPDATE_COLLECTION {
            self.update.execute(request, sink)
        } else {
            self.process.execute(request, sink)
        }
    }
}
