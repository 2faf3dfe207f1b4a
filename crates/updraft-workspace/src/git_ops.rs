use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use anyhow::{Context, Result};

/// Version-control operations the update flow relies on.
pub trait VersionControl {
    /// Modified, deleted, untracked, and staged paths, honoring ignore rules.
    fn status(&self) -> Result<Vec<String>>;
    fn stage_all(&self) -> Result<()>;
    /// Drops the index back to `HEAD` without touching the working tree.
    fn unstage_all(&self) -> Result<()>;
    fn commit(&self, message: &str) -> Result<()>;
    fn current_commit_id(&self) -> Result<String>;
    /// No pending changes under the workspace root.
    fn is_clean(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct GitRepository {
    root: PathBuf,
}

impl GitRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        tracing::debug!(args = %args.join(" "), "running git");
        let output = base_git_command()
            .args(args)
            .current_dir(&self.root)
            .output()
            .with_context(|| format!("failed launching git {}", args.join(" ")))?;
        if !output.status.success() {
            anyhow::bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output)
    }
}

impl VersionControl for GitRepository {
    fn status(&self) -> Result<Vec<String>> {
        let worktree = self.run(&["ls-files", "-m", "-d", "-o", "--exclude-standard"])?;
        let staged = self.run(&[
            "diff",
            "--cached",
            "--name-only",
            "--no-renames",
            "--relative",
        ])?;
        let mut paths = Vec::new();
        for output in [worktree, staged] {
            let listing = String::from_utf8(output.stdout)
                .context("git status listing produced non-UTF-8 output")?;
            paths.extend(
                listing
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
        }
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    fn stage_all(&self) -> Result<()> {
        self.run(&["add", "-A"]).map(|_| ())
    }

    fn unstage_all(&self) -> Result<()> {
        self.run(&["reset", "-q"]).map(|_| ())
    }

    fn commit(&self, message: &str) -> Result<()> {
        // The message goes through stdin so it never needs shell quoting.
        let mut child = base_git_command()
            .args(["commit", "--no-verify", "-F", "-"])
            .current_dir(&self.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed launching git commit")?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(message.as_bytes())
                .context("failed writing commit message to git")?;
        }
        let output = child
            .wait_with_output()
            .context("failed waiting for git commit")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            anyhow::bail!("git commit failed: {detail}");
        }
        Ok(())
    }

    fn current_commit_id(&self) -> Result<String> {
        let output = self.run(&["rev-parse", "HEAD"])?;
        let sha = String::from_utf8(output.stdout)
            .context("git rev-parse produced non-UTF-8 output")?
            .trim()
            .to_string();
        if sha.is_empty() || !sha.chars().all(|ch| ch.is_ascii_hexdigit()) {
            anyhow::bail!("git rev-parse returned invalid HEAD sha: '{sha}'");
        }
        Ok(sha)
    }

    fn is_clean(&self) -> bool {
        check_clean_workspace(&self.root)
    }
}

pub(crate) fn base_git_command() -> Command {
    let mut command = Command::new("git");
    command
        .arg("-c")
        .arg("core.autocrlf=false")
        .arg("-c")
        .arg("core.quotepath=off");
    if cfg!(windows) {
        command.arg("-c").arg("core.longpaths=true");
    }
    command
}

pub fn short_hash(commit_id: &str) -> &str {
    commit_id.get(..9).unwrap_or(commit_id)
}

/// Whether the working tree has no pending changes under `workspace_root`.
///
/// Changes elsewhere in the repository are ignored. Anything that prevents
/// asking git (no repository, no git binary) counts as clean.
pub fn check_clean_workspace(workspace_root: &Path) -> bool {
    match pending_workspace_entries(workspace_root) {
        Ok(entries) => entries.is_empty(),
        Err(err) => {
            tracing::debug!(error = %err, "treating workspace as clean; git status unavailable");
            true
        }
    }
}

fn pending_workspace_entries(workspace_root: &Path) -> Result<Vec<String>> {
    let top_level = base_git_command()
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(workspace_root)
        .output()
        .context("failed launching git rev-parse")?;
    if !top_level.status.success() {
        anyhow::bail!("not inside a git repository");
    }
    let top_level = PathBuf::from(String::from_utf8_lossy(&top_level.stdout).trim());

    let status = base_git_command()
        .args(["status", "--porcelain"])
        .current_dir(workspace_root)
        .output()
        .context("failed launching git status")?;
    if !status.status.success() {
        anyhow::bail!(
            "git status failed: {}",
            String::from_utf8_lossy(&status.stderr).trim()
        );
    }

    let workspace_root = canonical_or_self(workspace_root);
    let top_level = canonical_or_self(&top_level);
    let listing = String::from_utf8_lossy(&status.stdout);
    Ok(listing
        .lines()
        .filter_map(porcelain_entry_path)
        .filter(|entry| top_level.join(entry).starts_with(&workspace_root))
        .map(str::to_string)
        .collect())
}

fn porcelain_entry_path(line: &str) -> Option<&str> {
    let entry = line.get(3..)?.trim();
    if entry.is_empty() {
        return None;
    }
    // Renames read `old -> new`; the destination is what lives in the tree.
    Some(entry.rsplit(" -> ").next().unwrap_or(entry).trim_matches('"'))
}

fn canonical_or_self(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
