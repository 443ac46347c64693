// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Process-wide liveness registries.
//!
//! - [`LiveInputRegistry`] - user id to the top-level request ids still live for that user
//! - [`SessionConnectionRegistry`] - which transport sessions are currently connected
//!
//! Both are sharded maps: operations on one key are linearizable, operations on
//! keys in different shards proceed without blocking each other. Neither registry
//! is a global; a [`RuntimeContext`](crate::runtime::RuntimeContext) owns one of each.

mod live_inputs;
mod sessions;

pub use live_inputs::LiveInputRegistry;
pub use sessions::SessionConnectionRegistry;
