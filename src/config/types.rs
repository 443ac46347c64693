// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::gateway::protocol::DEFAULT_MAX_FRAME_BYTES;
use crate::scheduler::{AgentSpec, DEFAULT_MAX_STEPS};

/// Default WebSocket listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:4242";

/// Default WebSocket route.
pub const DEFAULT_WS_PATH: &str = "/ws";

/// One configuration file, global, workspace or local. Every field is optional;
/// absent fields leave the lower layer's value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen_addr: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_path: Option<String>,

    /// NDJSON endpoint: `host:port`, `unix:/path` or a socket path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_input_checks: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_checks: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_agent: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_frame_bytes: Option<usize>,

    /// Auth token to user id. Merged across layers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_tokens: Option<HashMap<String, String>>,

    /// Extra or overriding agent definitions, matched by id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents: Option<Vec<AgentSpec>>,

    /// Delay between echo chunks, for manual testing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub echo_delay_ms: Option<u64>,
}

/// Fully merged configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub listen_addr: String,
    pub ws_path: String,
    pub socket_path: Option<String>,
    pub live_input_checks: bool,
    pub session_checks: bool,
    pub max_steps: u32,
    pub default_agent: String,
    pub max_frame_bytes: usize,
    /// Tokens are secrets; only the count is printed.
    #[serde(serialize_with = "serialize_token_count")]
    pub auth_tokens: HashMap<String, String>,
    pub agents: Vec<AgentSpec>,
    pub echo_delay_ms: u64,
}

fn serialize_token_count<S>(tokens: &HashMap<String, String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(tokens.len() as u64)
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            socket_path: None,
            live_input_checks: true,
            session_checks: true,
            max_steps: DEFAULT_MAX_STEPS,
            default_agent: "base".to_string(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            auth_tokens: HashMap::new(),
            agents: Vec::new(),
            echo_delay_ms: 0,
        }
    }
}

impl ResolvedConfig {
    /// Check values that would only fail later, at bind or run time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_socket_addr()?;

        if !self.ws_path.starts_with('/') {
            return Err(ConfigError::invalid("wsPath", "must start with '/'"));
        }
        if self.ws_path == "/health" {
            return Err(ConfigError::invalid("wsPath", "'/health' is reserved"));
        }
        if self.max_steps == 0 {
            return Err(ConfigError::invalid("maxSteps", "must be at least 1"));
        }
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::invalid("maxFrameBytes", "must be at least 1"));
        }
        if self.default_agent.trim().is_empty() {
            return Err(ConfigError::invalid("defaultAgent", "must not be empty"));
        }
        if let Some(socket) = &self.socket_path {
            if socket.trim().is_empty() {
                return Err(ConfigError::invalid("socketPath", "must not be empty"));
            }
        }
        for agent in &self.agents {
            if agent.id.trim().is_empty() {
                return Err(ConfigError::invalid("agents", "agent id must not be empty"));
            }
        }
        Ok(())
    }

    pub fn listen_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|e| ConfigError::invalid("listenAddr", format!("{}: {}", self.listen_addr, e)))
    }

    /// Socket path as a filesystem path, for display.
    pub fn socket_path_buf(&self) -> Option<PathBuf> {
        self.socket_path.as_ref().map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ResolvedConfig::default();
        assert_eq!(config.listen_addr, "127.0.0.1:4242");
        assert_eq!(config.ws_path, "/ws");
        assert_eq!(config.max_steps, 10);
        assert_eq!(config.max_frame_bytes, 1024 * 1024);
        assert!(config.live_input_checks && config.session_checks);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_addr = ResolvedConfig {
            listen_addr: "nowhere".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            bad_addr.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "listenAddr"
        ));

        let bad_path = ResolvedConfig {
            ws_path: "ws".to_string(),
            ..Default::default()
        };
        assert!(bad_path.validate().is_err());

        let zero_steps = ResolvedConfig {
            max_steps: 0,
            ..Default::default()
        };
        assert!(zero_steps.validate().is_err());
    }

    #[test]
    fn test_config_file_camel_case() {
        let file: RelayConfigFile = serde_json::from_str(
            r#"{"listenAddr": "0.0.0.0:9000", "liveInputChecks": false, "echoDelayMs": 25}"#,
        )
        .unwrap();
        assert_eq!(file.listen_addr.as_deref(), Some("0.0.0.0:9000"));
        assert_eq!(file.live_input_checks, Some(false));
        assert_eq!(file.echo_delay_ms, Some(25));
        assert!(file.ws_path.is_none());
    }

    #[test]
    fn test_resolved_hides_tokens() {
        let mut config = ResolvedConfig::default();
        config.auth_tokens.insert("secret".to_string(), "u1".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"authTokens\":1"));
    }
}
