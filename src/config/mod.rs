// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration for the relay server.
//!
//! Sources, merged with precedence CLI > local > workspace > global > defaults:
//! - Global config: `~/.agent-relay/config.json` or `config.yaml`
//! - Workspace config: `.agent-relay.json`, `.agent-relay.yaml` or `agent-relay.config.json`
//! - Local config: `.agent-relay.local.json`
//! - CLI options and `AGENT_RELAY_*` environment variables

mod loader;
mod merger;
mod types;

pub use loader::{
    get_global_config_dir, load_config_file, load_global_config, load_local_config,
    load_workspace_config, CONFIG_FILES, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILES, LOCAL_CONFIG_FILE,
};
pub use merger::{merge_config, CliOptions};
pub use types::{RelayConfigFile, ResolvedConfig, DEFAULT_LISTEN_ADDR, DEFAULT_WS_PATH};

use std::path::Path;

use crate::error::ConfigError;

/// Load, merge and validate every configuration source for a workspace.
pub fn load_config(workspace_root: &Path, cli_options: CliOptions) -> Result<ResolvedConfig, ConfigError> {
    let global = load_global_config()?;
    let workspace = load_workspace_config(workspace_root)?;
    let local = load_local_config(workspace_root)?;

    let config = merge_config(global, workspace, local, cli_options);
    config.validate()?;
    Ok(config)
}
