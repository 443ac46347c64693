// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Registry of live top-level user inputs.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

/// Maps a user id to the ordered set of request ids still live for that user.
///
/// A user present as a key always has at least one live id. Removing the last
/// id deletes the key, so inactive users cost nothing.
///
/// Descendant runs are never registered here. A child request id extends its
/// ancestor's id, and [`has_live_prefix`](Self::has_live_prefix) matches by
/// string prefix, so removing the ancestor cancels the whole subtree.
#[derive(Debug, Default)]
pub struct LiveInputRegistry {
    inputs: DashMap<String, Vec<String>>,
}

impl LiveInputRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `request_id` as live for `user_id`.
    ///
    /// Starting an id that is already live is a no-op, so a single cancel
    /// always retires it. Returns `false` for that case and for an empty
    /// `user_id`, which is never recorded.
    pub fn start_user_input(&self, user_id: &str, request_id: &str) -> bool {
        if user_id.is_empty() {
            trace!(request_id, "User input without a user ignored");
            return false;
        }
        // The entry guard holds the shard lock across the check and the push.
        let mut ids = self.inputs.entry(user_id.to_string()).or_default();
        if ids.iter().any(|id| id == request_id) {
            trace!(user_id, request_id, "User input already live");
            return false;
        }
        ids.push(request_id.to_string());
        debug!(user_id, request_id, live = ids.len(), "User input started");
        true
    }

    /// Retire `request_id` for `user_id`.
    ///
    /// Returns `true` if the id was live. Cancelling an unknown id is tolerated:
    /// double cancels and cancel-after-complete races are expected.
    pub fn cancel_user_input(&self, user_id: &str, request_id: &str) -> bool {
        match self.inputs.entry(user_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let ids = entry.get_mut();
                let before = ids.len();
                ids.retain(|id| id != request_id);
                if ids.len() == before {
                    debug!(
                        user_id,
                        request_id,
                        live = ?ids,
                        "Cancel for unknown user input"
                    );
                    return false;
                }
                if ids.is_empty() {
                    entry.remove();
                }
                debug!(user_id, request_id, "User input cancelled");
                true
            }
            Entry::Vacant(_) => {
                debug!(user_id, request_id, "Cancel for unknown user input");
                false
            }
        }
    }

    /// Snapshot of the live ids for `user_id`, or `None` if the user has none.
    pub fn get_live_ids(&self, user_id: &str) -> Option<Vec<String>> {
        if user_id.is_empty() {
            return None;
        }
        self.inputs.get(user_id).map(|ids| ids.value().clone())
    }

    /// Whether any live id of `user_id` is a string prefix of `request_id`.
    ///
    /// `None` means the user has no record at all.
    pub fn has_live_prefix(&self, user_id: &str, request_id: &str) -> Option<bool> {
        self.inputs
            .get(user_id)
            .map(|ids| ids.iter().any(|id| request_id.starts_with(id.as_str())))
    }

    /// Number of users with at least one live input.
    pub fn user_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Drop every entry. Test harness use only.
    pub fn reset(&self) {
        self.inputs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_start_and_get() {
        let registry = LiveInputRegistry::new();
        registry.start_user_input("u1", "r1");
        registry.start_user_input("u1", "r2");

        assert_eq!(
            registry.get_live_ids("u1"),
            Some(vec!["r1".to_string(), "r2".to_string()])
        );
        assert_eq!(registry.get_live_ids("u2"), None);
    }

    #[test]
    fn test_empty_user_id_has_no_ids() {
        let registry = LiveInputRegistry::new();
        assert!(!registry.start_user_input("", "r1"));
        assert_eq!(registry.get_live_ids(""), None);
        assert!(registry.is_empty());
        assert_eq!(registry.user_count(), 0);
    }

    #[test]
    fn test_cancel_last_entry_prunes_user() {
        let registry = LiveInputRegistry::new();
        registry.start_user_input("u1", "r1");

        assert!(registry.cancel_user_input("u1", "r1"));
        assert_eq!(registry.get_live_ids("u1"), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_keeps_other_entries() {
        let registry = LiveInputRegistry::new();
        registry.start_user_input("u1", "r1");
        registry.start_user_input("u1", "r2");

        assert!(registry.cancel_user_input("u1", "r1"));
        assert_eq!(registry.get_live_ids("u1"), Some(vec!["r2".to_string()]));
    }

    #[test]
    fn test_double_start_then_single_cancel_leaves_id_absent() {
        let registry = LiveInputRegistry::new();
        assert!(registry.start_user_input("u1", "r1"));
        assert!(!registry.start_user_input("u1", "r1"));
        assert_eq!(registry.get_live_ids("u1"), Some(vec!["r1".to_string()]));

        assert!(registry.cancel_user_input("u1", "r1"));
        assert_eq!(registry.get_live_ids("u1"), None);
    }

    #[test]
    fn test_cancel_unknown_is_noop() {
        let registry = LiveInputRegistry::new();
        assert!(!registry.cancel_user_input("ghost", "r1"));

        registry.start_user_input("u1", "r1");
        assert!(!registry.cancel_user_input("u1", "other"));
        assert!(registry.cancel_user_input("u1", "r1"));
        // Double cancel
        assert!(!registry.cancel_user_input("u1", "r1"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_prefix_match() {
        let registry = LiveInputRegistry::new();
        assert_eq!(registry.has_live_prefix("u1", "r1"), None);

        registry.start_user_input("u1", "r1");
        assert_eq!(registry.has_live_prefix("u1", "r1"), Some(true));
        assert_eq!(registry.has_live_prefix("u1", "r1-child-1"), Some(true));
        assert_eq!(registry.has_live_prefix("u1", "x-r1"), Some(false));
        assert_eq!(registry.has_live_prefix("u1", "r"), Some(false));
    }

    #[test]
    fn test_reset() {
        let registry = LiveInputRegistry::new();
        registry.start_user_input("u1", "r1");
        registry.start_user_input("u2", "r2");
        assert_eq!(registry.user_count(), 2);

        registry.reset();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_start_cancel_same_user() {
        let registry = Arc::new(LiveInputRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let id = format!("t{}-r{}", t, i);
                        registry.start_user_input("shared", &id);
                        assert!(registry.cancel_user_input("shared", &id));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // No lost deletes and no empty container left behind.
        assert_eq!(registry.get_live_ids("shared"), None);
        assert!(registry.is_empty());
    }
}
