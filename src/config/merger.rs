// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.

use super::types::{RelayConfigFile, ResolvedConfig};

/// Command-line overrides. `None` leaves the file value in place.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub listen_addr: Option<String>,
    pub ws_path: Option<String>,
    pub socket_path: Option<String>,
    pub live_input_checks: Option<bool>,
    pub session_checks: Option<bool>,
    pub max_steps: Option<u32>,
    pub default_agent: Option<String>,
}

/// Merge configuration layers.
///
/// Precedence, highest first: CLI, local, workspace, global, defaults.
pub fn merge_config(
    global: Option<RelayConfigFile>,
    workspace: Option<RelayConfigFile>,
    local: Option<RelayConfigFile>,
    cli: CliOptions,
) -> ResolvedConfig {
    let mut result = ResolvedConfig::default();

    for layer in [global, workspace, local].into_iter().flatten() {
        apply_file(&mut result, layer);
    }
    apply_cli_options(&mut result, cli);

    result
}

fn apply_file(result: &mut ResolvedConfig, config: RelayConfigFile) {
    if let Some(addr) = config.listen_addr {
        result.listen_addr = addr;
    }
    if let Some(path) = config.ws_path {
        result.ws_path = path;
    }
    if config.socket_path.is_some() {
        result.socket_path = config.socket_path;
    }
    if let Some(enabled) = config.live_input_checks {
        result.live_input_checks = enabled;
    }
    if let Some(enabled) = config.session_checks {
        result.session_checks = enabled;
    }
    if let Some(steps) = config.max_steps {
        result.max_steps = steps;
    }
    if let Some(agent) = config.default_agent {
        result.default_agent = agent;
    }
    if let Some(bytes) = config.max_frame_bytes {
        result.max_frame_bytes = bytes;
    }
    if let Some(tokens) = config.auth_tokens {
        result.auth_tokens.extend(tokens);
    }
    if let Some(agents) = config.agents {
        for agent in agents {
            // Same id in a higher layer replaces the lower definition.
            match result.agents.iter_mut().find(|a| a.id == agent.id) {
                Some(existing) => *existing = agent,
                None => result.agents.push(agent),
            }
        }
    }
    if let Some(delay) = config.echo_delay_ms {
        result.echo_delay_ms = delay;
    }
}

fn apply_cli_options(result: &mut ResolvedConfig, cli: CliOptions) {
    if let Some(addr) = cli.listen_addr {
        result.listen_addr = addr;
    }
    if let Some(path) = cli.ws_path {
        result.ws_path = path;
    }
    if cli.socket_path.is_some() {
        result.socket_path = cli.socket_path;
    }
    if let Some(enabled) = cli.live_input_checks {
        result.live_input_checks = enabled;
    }
    if let Some(enabled) = cli.session_checks {
        result.session_checks = enabled;
    }
    if let Some(steps) = cli.max_steps {
        result.max_steps = steps;
    }
    if let Some(agent) = cli.default_agent {
        result.default_agent = agent;
    }
}
