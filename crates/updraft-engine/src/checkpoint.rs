use updraft_workspace::{short_hash, VersionControl};

use crate::logger::Logger;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// `commit_id` is `None` when the new commit could not be read back.
    Committed { commit_id: Option<String> },
    NoChangesSkipped,
    CommitFailed,
}

impl CheckpointOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::CommitFailed)
    }
}

/// Wraps each completed step's working-tree changes in a single commit.
pub struct CheckpointController<'a> {
    vcs: &'a dyn VersionControl,
    logger: &'a dyn Logger,
}

impl<'a> CheckpointController<'a> {
    pub fn new(vcs: &'a dyn VersionControl, logger: &'a dyn Logger) -> Self {
        Self { vcs, logger }
    }

    pub fn checkpoint(&self, message: &str) -> CheckpointOutcome {
        let pending = match self.vcs.status() {
            Ok(pending) => pending,
            Err(err) => {
                self.logger
                    .error(&format!("  Failed to read Git tree:\n{err:#}"));
                return CheckpointOutcome::CommitFailed;
            }
        };

        if pending.is_empty() {
            self.logger.info("  No changes to commit after migration.");
            return CheckpointOutcome::NoChangesSkipped;
        }

        if let Err(err) = self
            .vcs
            .stage_all()
            .and_then(|()| self.vcs.commit(message))
        {
            // Leave the index the way the step found it.
            if let Err(reset_err) = self.vcs.unstage_all() {
                tracing::warn!(error = %reset_err, "failed to unstage after commit failure");
            }
            self.logger
                .error(&format!("Failed to commit update ({message}):\n{err:#}"));
            return CheckpointOutcome::CommitFailed;
        }

        let summary = message.lines().next().unwrap_or_default();
        match self.vcs.current_commit_id() {
            Ok(commit_id) => {
                self.logger.info(&format!(
                    "  Committed migration step ({}): {summary}.",
                    short_hash(&commit_id)
                ));
                CheckpointOutcome::Committed {
                    commit_id: Some(commit_id),
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "commit id lookup failed");
                self.logger
                    .info(&format!("  Committed migration step: {summary}."));
                self.logger
                    .warn("  Failed to look up hash of most recent commit, continuing anyways.");
                CheckpointOutcome::Committed { commit_id: None }
            }
        }
    }
}
