use std::fmt;
use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Yarn,
    Pnpm,
    Bun,
}

impl PackageManager {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Yarn => "yarn",
            Self::Pnpm => "pnpm",
            Self::Bun => "bun",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "npm" => Ok(Self::Npm),
            "yarn" => Ok(Self::Yarn),
            "pnpm" => Ok(Self::Pnpm),
            "bun" => Ok(Self::Bun),
            other => Err(anyhow!("unsupported package manager: {other}")),
        }
    }

    pub fn install_command(self, root: &Path) -> Command {
        let mut command = Command::new(self.as_str());
        command.arg("install").current_dir(root);
        if self == Self::Npm {
            command.arg("--no-audit").arg("--no-fund");
        }
        command
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks the package manager from the lockfile present in `root`, npm when
/// there is none.
pub fn detect_package_manager(root: &Path) -> PackageManager {
    let lockfiles = [
        ("pnpm-lock.yaml", PackageManager::Pnpm),
        ("yarn.lock", PackageManager::Yarn),
        ("bun.lockb", PackageManager::Bun),
        ("bun.lock", PackageManager::Bun),
        ("package-lock.json", PackageManager::Npm),
    ];
    lockfiles
        .into_iter()
        .find(|(file, _)| root.join(file).is_file())
        .map(|(_, manager)| manager)
        .unwrap_or(PackageManager::Npm)
}
