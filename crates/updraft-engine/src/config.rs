use std::collections::BTreeMap;
use std::fs;

use anyhow::{Context, Result};
use semver::Version;
use serde::Deserialize;
use updraft_registry::DEFAULT_REGISTRY_URL;
use updraft_workspace::{detect_package_manager, PackageManager, WorkspaceLayout};

pub const DISABLE_VERSION_CHECK_ENV: &str = "UPDRAFT_DISABLE_VERSION_CHECK";
pub const REGISTRY_ENV: &str = "UPDRAFT_REGISTRY";

const DEFAULT_SELF_PACKAGE: &str = "@updraft/cli";

/// Settings resolved once per run. The environment is passed in as a
/// snapshot; nothing below reads process state directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateConfig {
    pub registry: String,
    pub package_manager: PackageManager,
    /// Package whose major-version jumps are restricted.
    pub self_package: String,
    pub self_version: Version,
    pub disable_version_check: bool,
    pub skip_install: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    registry: Option<String>,
    package_manager: Option<String>,
    self_package: Option<String>,
    skip_install: Option<bool>,
}

impl UpdateConfig {
    pub fn load(layout: &WorkspaceLayout, env: &BTreeMap<String, String>) -> Result<Self> {
        let path = layout.config_path();
        let file = if path.is_file() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed reading config: {}", path.display()))?;
            toml::from_str::<ConfigFile>(&content)
                .with_context(|| format!("failed parsing config: {}", path.display()))?
        } else {
            ConfigFile::default()
        };

        let package_manager = match file.package_manager.as_deref() {
            Some(value) => PackageManager::parse(value)
                .with_context(|| format!("invalid package_manager in {}", path.display()))?,
            None => detect_package_manager(layout.root()),
        };

        let registry = env
            .get(REGISTRY_ENV)
            .filter(|value| !value.trim().is_empty())
            .cloned()
            .or(file.registry)
            .unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string());

        Ok(Self {
            registry,
            package_manager,
            self_package: file
                .self_package
                .unwrap_or_else(|| DEFAULT_SELF_PACKAGE.to_string()),
            self_version: Version::parse(env!("CARGO_PKG_VERSION"))
                .context("crate version is not a semantic version")?,
            disable_version_check: env_flag_enabled(env.get(DISABLE_VERSION_CHECK_ENV)),
            skip_install: file.skip_install.unwrap_or(false),
        })
    }
}

/// Set and not `0` or `false` (any case).
fn env_flag_enabled(value: Option<&String>) -> bool {
    value.is_some_and(|value| {
        let value = value.trim();
        value != "0" && !value.eq_ignore_ascii_case("false")
    })
}

#[cfg(test)]
mod tests {
    use super::env_flag_enabled;

    #[test]
    fn env_flag_enabled_follows_toggle_rules() {
        assert!(!env_flag_enabled(None));
        assert!(!env_flag_enabled(Some(&"0".to_string())));
        assert!(!env_flag_enabled(Some(&"FALSE".to_string())));
        assert!(env_flag_enabled(Some(&"1".to_string())));
        assert!(env_flag_enabled(Some(&"true".to_string())));
        assert!(env_flag_enabled(Some(&String::new())));
    }
}
