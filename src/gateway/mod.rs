// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Streaming protocol gateway.
//!
//! Clients connect over WebSocket or newline-delimited JSON, submit prompts
//! and cancel them. Every inbound envelope is acknowledged in receipt order;
//! run output streams back as `agent-chunk` actions on the same connection.
//!
//! | Inbound                      | Effect                                           |
//! |------------------------------|--------------------------------------------------|
//! | `action` / `prompt`          | `start_user_input`, start a run, ack             |
//! | `action` / `cancel-user-input` | `cancel_user_input`, ack                       |
//! | `ping`                       | ack, `pong`                                      |
//! | prompt id already live       | failing ack, no run                              |
//! | malformed or oversized frame | failing ack, connection stays open               |
//! | connection closed            | `set_connected(session, false)`                  |

pub mod auth;
mod connection;
pub mod ndjson;
pub mod protocol;
pub mod transport;
pub mod ws;

pub use auth::{Authenticator, PassthroughAuthenticator, StaticTokenAuthenticator};
pub use connection::{ClientSession, Gateway, GatewayConfig, OUTBOUND_BUFFER};
pub use ndjson::{serve_connection, NdjsonServer};
pub use protocol::{ClientAction, ClientMessage, ServerAction, ServerMessage};
pub use transport::Endpoint;
