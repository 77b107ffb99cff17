// Build script - reads config.yaml at compile time and generates defaults
// This allows changing defaults during development without editing source code

use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Tell Cargo to rerun if config.yaml changes
    println!("cargo:rerun-if-changed=src/config.yaml");

    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("compiled_config.rs");

    // Try to read config.yaml from src/, fall back to hardcoded defaults if not found
    let config = if Path::new("src/config.yaml").exists() {
        let content = fs::read_to_string("src/config.yaml")
            .expect("Failed to read src/config.yaml");
        parse_config(&content)
    } else {
        CompiledConfig::default()
    };

    let generated = format!(
        r#"// Auto-generated from config.yaml at compile time
// Do not edit - modify config.yaml and rebuild instead

pub const SYNC_DIRECTION: &str = "{sync_direction}";
pub const VERIFY_DRIFT: bool = {verify_drift};
pub const ACTION_TIMEOUT_SECS: u64 = {action_timeout_secs};

pub const EXCLUDE_HIDDEN: bool = {exclude_hidden};
pub const HASH_FILES: bool = {hash_files};

pub const MTIME_TOLERANCE_SECS: u64 = {mtime_tolerance_secs};
pub const COMPARE_HASHES: bool = {compare_hashes};

pub const REMOTE_PROGRAM: &str = "{remote_program}";

pub const GLOBAL_EXCLUDES: &[&str] = &[
{excludes}
];
"#,
        sync_direction = config.sync_direction,
        verify_drift = config.verify_drift,
        action_timeout_secs = config.action_timeout_secs,
        exclude_hidden = config.exclude_hidden,
        hash_files = config.hash_files,
        mtime_tolerance_secs = config.mtime_tolerance_secs,
        compare_hashes = config.compare_hashes,
        remote_program = config.remote_program,
        excludes = config.global_excludes
            .iter()
            .map(|e| format!("    \"{}\",", e))
            .collect::<Vec<_>>()
            .join("\n"),
    );

    fs::write(&dest_path, generated).expect("Failed to write compiled config");
}

struct CompiledConfig {
    sync_direction: String,
    verify_drift: bool,
    action_timeout_secs: u64,
    exclude_hidden: bool,
    hash_files: bool,
    mtime_tolerance_secs: u64,
    compare_hashes: bool,
    remote_program: String,
    global_excludes: Vec<String>,
}

impl Default for CompiledConfig {
    fn default() -> Self {
        Self {
            sync_direction: "local-to-remote".to_string(),
            verify_drift: true,
            action_timeout_secs: 600,
            exclude_hidden: false,
            hash_files: false,
            mtime_tolerance_secs: 1,
            compare_hashes: false,
            remote_program: "internxt".to_string(),
            global_excludes: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                "*.swp".to_string(),
                "*.swo".to_string(),
                "*~".to_string(),
            ],
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Defaults,
    Scan,
    Diff,
    Remote,
    Excludes,
}

fn parse_config(content: &str) -> CompiledConfig {
    let mut config = CompiledConfig::default();

    // Simple YAML parsing (avoiding external dependencies in build script)
    let mut section = Section::None;

    for line in content.lines() {
        let trimmed = line.trim();

        // Top-level keys switch sections
        if !line.starts_with(' ') && !line.starts_with('\t') && trimmed.ends_with(':') {
            section = match trimmed {
                "defaults:" => Section::Defaults,
                "scan:" => Section::Scan,
                "diff:" => Section::Diff,
                "remote:" => Section::Remote,
                "global_excludes:" => {
                    config.global_excludes.clear(); // Start fresh when we see the section
                    Section::Excludes
                }
                _ => Section::None,
            };
            continue;
        }

        if section == Section::Excludes {
            if let Some(item) = trimmed.strip_prefix("- ") {
                config.global_excludes.push(item.trim().trim_matches('"').to_string());
            }
            continue;
        }

        let Some((key, value)) = parse_kv(trimmed) else {
            continue;
        };

        match (section, key) {
            (Section::Defaults, "sync_direction") => config.sync_direction = value.to_string(),
            (Section::Defaults, "verify_drift") => config.verify_drift = parse_bool(value),
            (Section::Defaults, "action_timeout_secs") => {
                config.action_timeout_secs = value.parse().unwrap_or(600)
            }
            (Section::Scan, "exclude_hidden") => config.exclude_hidden = parse_bool(value),
            (Section::Scan, "hash_files") => config.hash_files = parse_bool(value),
            (Section::Diff, "mtime_tolerance_secs") => {
                config.mtime_tolerance_secs = value.parse().unwrap_or(1)
            }
            (Section::Diff, "compare_hashes") => config.compare_hashes = parse_bool(value),
            (Section::Remote, "program") => {
                config.remote_program = value.trim_matches('"').to_string()
            }
            _ => {}
        }
    }

    config
}

fn parse_kv(line: &str) -> Option<(&str, &str)> {
    // Skip comments and empty lines
    if line.starts_with('#') || line.is_empty() {
        return None;
    }

    let colon_pos = line.find(':')?;
    let key = line[..colon_pos].trim();
    let mut value = line[colon_pos + 1..].trim();

    // Remove inline comments
    if let Some(comment_pos) = value.find(" #") {
        value = value[..comment_pos].trim();
    }

    if value.is_empty() {
        return None;
    }

    Some((key, value))
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "true" | "yes" | "1")
}
