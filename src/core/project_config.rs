// Project Configuration
// Runtime settings that define what to sync and where

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::AppConfig;
use crate::error::ConfigError;
use crate::operations::diff::DiffEngine;
use crate::operations::executor::ExecutorOptions;
use crate::operations::plan::SyncDirection;
use crate::operations::remote::RemoteCommands;
use crate::operations::snapshot::ScanOptions;
use crate::utilities::PatternMatcher;

/// Project config file name
pub const PROJECT_CONFIG_NAME: &str = "remote-sync.yaml";

/// Environment variable pointing at a config file
pub const CONFIG_ENV_VAR: &str = "REMOTE_SYNC_CONFIG";

/// Project-level configuration loaded from remote-sync.yaml
///
/// Every field is optional; unset values fall back to the compiled defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Local directory to sync (relative paths resolve against the config file)
    pub local_root: Option<PathBuf>,

    /// Absolute path of the remote folder
    pub remote_root: Option<String>,

    /// Sync direction: "local-to-remote" or "remote-to-local"
    pub direction: Option<SyncDirection>,

    pub scan: ScanConfig,

    pub diff: DiffConfig,

    pub execute: ExecuteConfig,

    /// External storage tool invocation
    pub remote: Option<RemoteCommands>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub exclude_hidden: Option<bool>,
    pub hash_files: Option<bool>,
    /// Patterns added to the global excludes
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    pub mtime_tolerance_secs: Option<u64>,
    pub compare_hashes: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecuteConfig {
    pub verify_drift: Option<bool>,
    /// Per-action timeout in seconds (0 = none)
    pub action_timeout_secs: Option<u64>,
    pub preserve_mtime: Option<bool>,
}

impl ProjectConfig {
    /// Load project configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read project config: {}", path.display()))?;

        let mut config: ProjectConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse project config YAML: {}", path.display()))?;

        // Relative local roots are relative to the config file, not the cwd
        if let (Some(root), Some(base)) = (&config.local_root, path.parent()) {
            if root.is_relative() {
                config.local_root = Some(base.join(root));
            }
        }

        Ok(config)
    }

    /// Save project configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .context("Failed to serialize project config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write project config: {}", path.display()))?;

        Ok(())
    }

    /// Find the config file to use
    ///
    /// An explicit path wins, then `REMOTE_SYNC_CONFIG`, then the nearest
    /// remote-sync.yaml walking up from `start`.
    pub fn locate(explicit: Option<&Path>, start: &Path) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        Self::discover(start)
    }

    /// Walk up from `start` looking for remote-sync.yaml
    pub fn discover(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(PROJECT_CONFIG_NAME))
            .find(|candidate| candidate.is_file())
    }

    pub fn direction(&self, app: &AppConfig) -> SyncDirection {
        self.direction.unwrap_or_else(|| app.default_direction())
    }

    pub fn local_root(&self) -> Result<&Path, ConfigError> {
        self.local_root
            .as_deref()
            .ok_or(ConfigError::MissingRoot("local"))
    }

    pub fn remote_root(&self) -> Result<&str, ConfigError> {
        self.remote_root
            .as_deref()
            .ok_or(ConfigError::MissingRoot("remote"))
    }

    pub fn scan_options(&self, app: &AppConfig) -> ScanOptions {
        let mut excludes = PatternMatcher::new(app.global_excludes.clone());
        for pattern in &self.scan.exclude {
            excludes.add_pattern(pattern.clone());
        }

        ScanOptions {
            exclude_hidden: self.scan.exclude_hidden.unwrap_or(app.scan.exclude_hidden),
            hash_files: self.scan.hash_files.unwrap_or(app.scan.hash_files),
            excludes,
        }
    }

    pub fn diff_engine(&self, app: &AppConfig) -> DiffEngine {
        let tolerance = self
            .diff
            .mtime_tolerance_secs
            .unwrap_or(app.diff.mtime_tolerance_secs);
        DiffEngine::new(Duration::from_secs(tolerance))
            .with_hashes(self.diff.compare_hashes.unwrap_or(app.diff.compare_hashes))
    }

    pub fn executor_options(&self, app: &AppConfig) -> ExecutorOptions {
        let action_timeout = match self.execute.action_timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => app.action_timeout(),
        };

        ExecutorOptions {
            verify_drift: self.execute.verify_drift.unwrap_or(app.defaults.verify_drift),
            action_timeout,
            preserve_mtime: self.execute.preserve_mtime.unwrap_or(true),
            dry_run: false,
        }
    }

    pub fn remote_commands(&self, app: &AppConfig) -> RemoteCommands {
        self.remote.clone().unwrap_or_else(|| RemoteCommands {
            program: app.remote_program.clone(),
            ..RemoteCommands::default()
        })
    }
}
