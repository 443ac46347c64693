// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;

use super::types::RelayConfigFile;

/// Workspace config file names, first match wins.
pub const CONFIG_FILES: &[&str] = &[".agent-relay.json", ".agent-relay.yaml", "agent-relay.config.json"];

/// Per-directory overrides, meant to stay out of version control.
pub const LOCAL_CONFIG_FILE: &str = ".agent-relay.local.json";

pub const GLOBAL_CONFIG_DIR: &str = ".agent-relay";

/// Global config file names inside [`GLOBAL_CONFIG_DIR`], first match wins.
pub const GLOBAL_CONFIG_FILES: &[&str] = &["config.json", "config.yaml"];

pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

/// Load `~/.agent-relay/config.{json,yaml}`.
pub fn load_global_config() -> Result<Option<RelayConfigFile>, ConfigError> {
    match get_global_config_dir() {
        Some(dir) => load_first(&dir, GLOBAL_CONFIG_FILES),
        None => Ok(None),
    }
}

pub fn load_workspace_config(workspace_root: &Path) -> Result<Option<RelayConfigFile>, ConfigError> {
    load_first(workspace_root, CONFIG_FILES)
}

pub fn load_local_config(workspace_root: &Path) -> Result<Option<RelayConfigFile>, ConfigError> {
    load_first(workspace_root, &[LOCAL_CONFIG_FILE])
}

fn load_first(dir: &Path, names: &[&str]) -> Result<Option<RelayConfigFile>, ConfigError> {
    for name in names {
        let path = dir.join(name);
        if path.is_file() {
            debug!(path = %path.display(), "Loading config");
            return load_config_file(&path).map(Some);
        }
    }
    Ok(None)
}

/// Parse one config file; `.yaml`/`.yml` as YAML, anything else as JSON.
pub fn load_config_file(path: &Path) -> Result<RelayConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match extension.as_str() {
        "yaml" | "yml" => Ok(serde_yaml::from_str(&content)?),
        _ => Ok(serde_json::from_str(&content)?),
    }
}
