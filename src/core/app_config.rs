// Application Configuration
// Defaults compiled from config.yaml at build time
// Modify config.yaml and rebuild to change these values

use std::time::Duration;

use crate::operations::plan::SyncDirection;

// Include the auto-generated config from build.rs
pub mod compiled {
    include!(concat!(env!("OUT_DIR"), "/compiled_config.rs"));
}

/// Built-in configuration for remote-sync
/// Values are compiled in from config.yaml at build time
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Default behavior settings
    pub defaults: DefaultSettings,

    /// Scanner settings
    pub scan: ScanSettings,

    /// Comparison settings
    pub diff: DiffSettings,

    /// External storage tool
    pub remote_program: String,

    /// Global exclude patterns
    pub global_excludes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DefaultSettings {
    /// Default sync direction: "local-to-remote" or "remote-to-local"
    pub sync_direction: String,

    /// Re-check each target before acting on it
    pub verify_drift: bool,

    /// Per-action timeout in seconds (0 = none)
    pub action_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Skip entries whose name starts with a dot
    pub exclude_hidden: bool,

    /// Compute SHA-256 of local files while scanning
    pub hash_files: bool,
}

#[derive(Debug, Clone)]
pub struct DiffSettings {
    pub mtime_tolerance_secs: u64,
    pub compare_hashes: bool,
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self {
            sync_direction: compiled::SYNC_DIRECTION.to_string(),
            verify_drift: compiled::VERIFY_DRIFT,
            action_timeout_secs: compiled::ACTION_TIMEOUT_SECS,
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            exclude_hidden: compiled::EXCLUDE_HIDDEN,
            hash_files: compiled::HASH_FILES,
        }
    }
}

impl Default for DiffSettings {
    fn default() -> Self {
        Self {
            mtime_tolerance_secs: compiled::MTIME_TOLERANCE_SECS,
            compare_hashes: compiled::COMPARE_HASHES,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            defaults: DefaultSettings::default(),
            scan: ScanSettings::default(),
            diff: DiffSettings::default(),
            remote_program: compiled::REMOTE_PROGRAM.to_string(),
            global_excludes: compiled::GLOBAL_EXCLUDES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl AppConfig {
    /// The compiled default direction, falling back to local-to-remote
    pub fn default_direction(&self) -> SyncDirection {
        self.defaults
            .sync_direction
            .parse()
            .unwrap_or(SyncDirection::LocalToRemote)
    }

    pub fn action_timeout(&self) -> Option<Duration> {
        match self.defaults.action_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
