// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt;

use uuid::Uuid;

/// Identifies one client connection in logs, spans and the session registry.
///
/// The full string form is the session id the oracle checks; log lines carry
/// only the first eight hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn short(&self) -> String {
        let mut hex = self.0.simple().to_string();
        hex.truncate(8);
        hex
    }

    /// Span wrapping everything done for this connection.
    pub fn connection_span(&self, transport: &'static str) -> tracing::Span {
        tracing::info_span!("connection", session = %self.short(), transport)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CorrelationId").field(&self.short()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_connection_gets_a_fresh_id() {
        assert_ne!(CorrelationId::new(), CorrelationId::new());
    }

    #[test]
    fn test_session_id_and_log_forms() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let id = CorrelationId::from(uuid);
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(id.short(), "550e8400");
        assert_eq!(format!("{:?}", id), "CorrelationId(\"550e8400\")");
    }
}
