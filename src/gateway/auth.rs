// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Mapping auth tokens to user ids.

use std::collections::HashMap;

use async_trait::async_trait;

/// Resolves the user a request is attributed to.
///
/// Returning `None` is not an error: the request is accepted but never live.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn user_for_token(&self, token: Option<&str>) -> Option<String>;

    fn name(&self) -> &str;
}

/// Fixed token to user table, usually from config `authTokens`.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, String>,
}

impl StaticTokenAuthenticator {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), user_id.into());
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn user_for_token(&self, token: Option<&str>) -> Option<String> {
        self.tokens.get(token?).cloned()
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Development authenticator: the token is the user id.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughAuthenticator;

#[async_trait]
impl Authenticator for PassthroughAuthenticator {
    async fn user_for_token(&self, token: Option<&str>) -> Option<String> {
        token.filter(|t| !t.is_empty()).map(str::to_string)
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}
