//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`GuidanceSettings::default()`]
//! 2. Deep-merge `~/.guidance/settings.json` if it exists
//! 3. Deep-merge `<project>/.guidance/settings.json` if it exists
//! 4. Apply `GUIDANCE_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::GuidanceSettings;

/// Directory holding settings files, relative to home or project root.
pub const SETTINGS_DIR: &str = ".guidance";

/// Settings file name inside [`SETTINGS_DIR`].
pub const SETTINGS_FILE: &str = "settings.json";

/// Resolve the user settings file (`~/.guidance/settings.json`).
pub fn user_settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(SETTINGS_DIR).join(SETTINGS_FILE)
}

/// Resolve the project settings file (`<project>/.guidance/settings.json`).
pub fn project_settings_path(project_root: &Path) -> PathBuf {
    project_root.join(SETTINGS_DIR).join(SETTINGS_FILE)
}

/// Load settings for a project: defaults, user file, project file, env.
pub fn load_settings(project_root: &Path) -> Result<GuidanceSettings> {
    load_settings_from_paths(&[user_settings_path(), project_settings_path(project_root)])
}

/// Load settings from explicit file layers (lowest priority first), then
/// apply env overrides.
///
/// Missing files are skipped. A file with invalid JSON is an error.
pub fn load_settings_from_paths(paths: &[PathBuf]) -> Result<GuidanceSettings> {
    let mut merged = serde_json::to_value(GuidanceSettings::default())?;

    for path in paths {
        if !path.is_file() {
            debug!(path = %path.display(), "settings file not found, skipping layer");
            continue;
        }
        debug!(path = %path.display(), "loading settings layer");
        let content = std::fs::read_to_string(path)?;
        let layer: Value = serde_json::from_str(&content)?;
        merged = deep_merge(merged, layer);
    }

    let mut settings: GuidanceSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `GUIDANCE_*` environment variable overrides.
///
/// Invalid values are ignored with a warning and the file/default value is
/// kept.
pub fn apply_env_overrides(settings: &mut GuidanceSettings) {
    let d = &mut settings.discovery;
    if let Some(v) = read_env_bool("GUIDANCE_INCLUDE_MEMORY") {
        d.include_memory = v;
    }
    if let Some(v) = read_env_bool("GUIDANCE_INCLUDE_RULES") {
        d.include_rules = v;
    }
    if let Some(v) = read_env_bool("GUIDANCE_INCLUDE_NESTED_MEMORY") {
        d.include_nested_memory = v;
    }
    if let Some(v) = read_env_usize("GUIDANCE_MAX_IMPORT_DEPTH", 1, 16) {
        d.max_import_depth = v;
    }
    if let Some(v) = read_env_usize("GUIDANCE_WORKER_POOL_SIZE", 1, 256) {
        d.worker_pool_size = Some(v);
    }
    if let Some(v) = read_env_u64("GUIDANCE_DEADLINE_MS", 1, 3_600_000) {
        d.deadline_ms = Some(v);
    }
    if let Some(v) = read_env_string("GUIDANCE_USER_HOME") {
        d.user_home = Some(v);
    }
    if let Some(v) = read_env_string("GUIDANCE_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within an inclusive range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}
