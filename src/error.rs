// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the agent relay.
//!
//! This module provides strongly-typed errors for different parts of the runtime,
//! using `thiserror` for ergonomic error definitions and `anyhow` for error propagation.
//!
//! Cancellation has no variant here: a cancelled run is a terminal state the
//! scheduler exits through, not a fault.

use std::io;

use thiserror::Error;

/// Errors raised while decoding or validating inbound client messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Frame too large: {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Unsupported frame: {0}")]
    Unsupported(String),

    #[error("Prompt {0} is already running")]
    PromptAlreadyLive(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Errors reported by the model-invocation collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Unknown agent type: {0}")]
    UnknownAgent(String),

    #[error("Agent {parent} may not spawn {child}")]
    NotSpawnable { parent: String, child: String },
}

impl GenerationError {
    /// Check if this error is retryable.
    ///
    /// The scheduler never retries; this is exposed for invokers that do.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Timeout(_))
    }
}

/// Errors from the listening transports (WebSocket, TCP, Unix socket).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to bind {endpoint}: {message}")]
    BindFailed { endpoint: String, message: String },

    #[error("Failed to accept connection: {0}")]
    AcceptFailed(String),

    #[error("Failed to read from connection: {0}")]
    ReadFailed(String),

    #[error("Failed to write to connection: {0}")]
    WriteFailed(String),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Listener not started")]
    NotStarted,

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Create a transport error from an I/O error with context.
    pub fn from_io_error(context: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => Self::ConnectionClosed,
            _ => Self::Other(format!("{}: {}", context, err)),
        }
    }

    /// Whether this error means the peer went away.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_error_retryable() {
        assert!(GenerationError::RateLimited("wait 1s".to_string()).is_retryable());
        assert!(GenerationError::Timeout(30000).is_retryable());
        assert!(!GenerationError::Provider("bad key".to_string()).is_retryable());
        assert!(!GenerationError::UnknownAgent("nope".to_string()).is_retryable());
    }

    #[test]
    fn test_protocol_error_from_json() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: ProtocolError = result.unwrap_err().into();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_transport_error_disconnect_kinds() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(TransportError::from_io_error("reading", eof).is_disconnect());

        let other = io::Error::new(io::ErrorKind::Other, "boom");
        let err = TransportError::from_io_error("reading", other);
        assert!(!err.is_disconnect());
        assert!(err.to_string().contains("reading"));
    }

    #[test]
    fn test_config_error_from_json() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("invalid json");
        let config_err: ConfigError = result.unwrap_err().into();
        assert!(matches!(config_err, ConfigError::JsonError(_)));
    }

    #[test]
    fn test_error_display() {
        let err = ProtocolError::FrameTooLarge {
            size: 2048,
            limit: 1024,
        };
        let display = format!("{}", err);
        assert!(display.contains("2048"));
        assert!(display.contains("1024"));

        let err = GenerationError::NotSpawnable {
            parent: "base".to_string(),
            child: "editor".to_string(),
        };
        assert_eq!(err.to_string(), "Agent base may not spawn editor");
    }
}
