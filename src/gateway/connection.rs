// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-connection session handling, shared by every transport.
//!
//! A transport feeds inbound frames to [`ClientSession::handle_frame`] from its
//! read loop and drains the session's outbound channel into its writer. Acks
//! are queued on that channel before any run is started, so they leave in the
//! order frames arrived.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn, Instrument, Span};

use super::auth::Authenticator;
use super::protocol::{
    decode_client_frame, peek_txid, CancelAction, ClientAction, ClientMessage, PromptAction,
    ServerMessage, DEFAULT_MAX_FRAME_BYTES,
};
use crate::error::{ProtocolError, TransportError};
use crate::runtime::RuntimeContext;
use crate::scheduler::{RunEvent, RunRequest, StepScheduler, DEFAULT_MAX_STEPS};
use crate::telemetry::CorrelationId;

/// Capacity of each connection's outbound queue.
pub const OUTBOUND_BUFFER: usize = 256;

/// Gateway settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Root agent when a prompt names none.
    pub default_agent: String,
    /// Root step budget when a prompt carries none.
    pub max_steps: u32,
    pub max_frame_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_agent: "base".to_string(),
            max_steps: DEFAULT_MAX_STEPS,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Shared state behind every client connection.
pub struct Gateway {
    ctx: Arc<RuntimeContext>,
    scheduler: StepScheduler,
    auth: Arc<dyn Authenticator>,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(scheduler: StepScheduler, auth: Arc<dyn Authenticator>) -> Self {
        Self {
            ctx: Arc::clone(scheduler.context()),
            scheduler,
            auth,
            config: GatewayConfig::default(),
        }
    }

    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.ctx
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Register a new client connection and return its session.
    ///
    /// Everything the session emits goes to `outbound`.
    pub fn connect(
        self: &Arc<Self>,
        outbound: mpsc::Sender<ServerMessage>,
        transport: &'static str,
    ) -> ClientSession {
        let id = CorrelationId::new();
        let session_id = id.to_string();
        self.ctx.sessions.set_connected(&session_id, true);

        #[cfg(feature = "telemetry")]
        crate::telemetry::GLOBAL_METRICS.record_connection();

        let span = id.connection_span(transport);
        info!(parent: &span, "Client connected");

        ClientSession {
            id,
            session_id,
            gateway: Arc::clone(self),
            outbound,
            span,
            closed: false,
        }
    }

    fn root_request(&self, prompt: &PromptAction, user: Option<&str>, session_id: &str) -> RunRequest {
        let agent_type = prompt
            .agent_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or_else(|| prompt.main_agent_type())
            .unwrap_or(&self.config.default_agent);
        let steps = prompt.steps_remaining().unwrap_or(self.config.max_steps);

        let mut request = RunRequest::new(&prompt.prompt_id, agent_type, &prompt.prompt)
            .with_session(session_id)
            .with_steps(steps);
        if let Some(user) = user {
            request = request.with_user(user);
        }
        request
    }
}

/// One client connection.
///
/// Dropping the session marks it disconnected, which cancels every run started
/// from it at the run's next liveness check.
pub struct ClientSession {
    id: CorrelationId,
    session_id: String,
    gateway: Arc<Gateway>,
    outbound: mpsc::Sender<ServerMessage>,
    span: Span,
    closed: bool,
}

impl ClientSession {
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    /// Session id the oracle checks for runs started here.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Handle one inbound frame.
    ///
    /// Protocol faults are answered with a failing ack and the session stays
    /// open. Errors only when the outbound side is gone.
    pub async fn handle_frame(&self, frame: &str) -> Result<(), TransportError> {
        let max_bytes = self.gateway.config.max_frame_bytes;
        let msg = match decode_client_frame(frame, max_bytes) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(parent: &self.span, error = %e, "Rejected inbound frame");
                return self
                    .send(ServerMessage::nack(peek_txid(frame, max_bytes), e.to_string()))
                    .await;
            }
        };

        match msg {
            ClientMessage::Ping { txid } => {
                self.send(ServerMessage::ack(txid)).await?;
                self.send(ServerMessage::Pong).await
            }
            ClientMessage::Action { txid, data } => match data {
                ClientAction::Prompt(prompt) => self.handle_prompt(txid, prompt).await,
                ClientAction::CancelUserInput(cancel) => self.handle_cancel(txid, cancel).await,
            },
        }
    }

    async fn handle_prompt(&self, txid: String, prompt: PromptAction) -> Result<(), TransportError> {
        let ctx = &self.gateway.ctx;
        let user = self
            .gateway
            .auth
            .user_for_token(prompt.auth_token.as_deref())
            .await
            .filter(|user| !user.is_empty());

        match &user {
            // A second run under a live id would be retired when the first finishes.
            Some(user) if !ctx.live_inputs.start_user_input(user, &prompt.prompt_id) => {
                let error = ProtocolError::PromptAlreadyLive(prompt.prompt_id.clone());
                warn!(parent: &self.span, error = %error, "Rejected prompt");
                return self.send(ServerMessage::nack(Some(txid), error.to_string())).await;
            }
            Some(_) => {}
            None => debug!(parent: &self.span, prompt_id = %prompt.prompt_id, "Prompt without a known user"),
        }
        if !ctx.sessions.is_connected(&self.session_id) {
            ctx.sessions.set_connected(&self.session_id, true);
        }

        self.send(ServerMessage::ack(Some(txid))).await?;

        let request = self
            .gateway
            .root_request(&prompt, user.as_deref(), &self.session_id);
        info!(
            parent: &self.span,
            prompt_id = %request.request_id,
            agent = %request.agent_type,
            "Starting prompt"
        );

        let gateway = Arc::clone(&self.gateway);
        let outbound = self.outbound.clone();
        let span = self.span.clone();
        tokio::spawn(run_prompt(gateway, outbound, request).instrument(span));
        Ok(())
    }

    async fn handle_cancel(&self, txid: String, cancel: CancelAction) -> Result<(), TransportError> {
        let user = self
            .gateway
            .auth
            .user_for_token(cancel.auth_token.as_deref())
            .await;

        match user {
            Some(user) => {
                let removed = self
                    .gateway
                    .ctx
                    .live_inputs
                    .cancel_user_input(&user, &cancel.prompt_id);
                info!(parent: &self.span, prompt_id = %cancel.prompt_id, removed, "Cancel requested");
            }
            None => debug!(parent: &self.span, prompt_id = %cancel.prompt_id, "Cancel without a known user"),
        }

        self.send(ServerMessage::ack(Some(txid))).await
    }

    /// Answer a frame the transport could not hand over as text.
    pub async fn reject(&self, error: ProtocolError) -> Result<(), TransportError> {
        warn!(parent: &self.span, error = %error, "Rejected inbound frame");
        self.send(ServerMessage::nack(None, error.to_string())).await
    }

    async fn send(&self, msg: ServerMessage) -> Result<(), TransportError> {
        self.outbound
            .send(msg)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Mark the session disconnected. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.gateway.ctx.sessions.set_connected(&self.session_id, false);
        info!(parent: &self.span, "Client disconnected");
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Run a top-level prompt and stream its events to the client.
async fn run_prompt(
    gateway: Arc<Gateway>,
    outbound: mpsc::Sender<ServerMessage>,
    request: RunRequest,
) {
    let prompt_id = request.request_id.clone();
    let user = request.user_id.clone();
    #[cfg(feature = "telemetry")]
    let started = std::time::Instant::now();
    let (events_tx, mut events_rx) = mpsc::channel(64);

    let run = gateway.scheduler.run(request, events_tx);
    let forward = async {
        while let Some(event) = events_rx.recv().await {
            let msg = match event {
                RunEvent::Chunk {
                    request_id,
                    agent_type,
                    text,
                } => ServerMessage::text_chunk(&request_id, &agent_type, text),
                RunEvent::Error {
                    request_id,
                    agent_type,
                    message,
                } => ServerMessage::error_chunk(&request_id, &agent_type, message),
                RunEvent::Usage { .. } | RunEvent::StateChanged { .. } => continue,
            };
            // A closed client is noticed by the oracle through the session registry.
            let _ = outbound.send(msg).await;
        }
    };
    let (outcome, ()) = tokio::join!(run, forward);

    if let Some(user) = &user {
        gateway.ctx.live_inputs.cancel_user_input(user, &prompt_id);
    }
    #[cfg(feature = "telemetry")]
    crate::telemetry::GLOBAL_METRICS.record_operation("prompt", started.elapsed());

    let _ = outbound.send(ServerMessage::usage(&prompt_id, &outcome.usage)).await;
    let _ = outbound
        .send(ServerMessage::prompt_response(
            &prompt_id,
            outcome.state,
            outcome.output,
            outcome.error,
        ))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::auth::{PassthroughAuthenticator, StaticTokenAuthenticator};
    use crate::gateway::protocol::{Chunk, PromptStatus, ServerAction};
    use crate::invoker::EchoInvoker;
    use crate::scheduler::AgentCatalog;
    use serde_json::json;
    use std::time::Duration;

    fn gateway_with(ctx: Arc<RuntimeContext>, delay_ms: u64) -> Arc<Gateway> {
        let invoker = EchoInvoker::new().with_delay(Duration::from_millis(delay_ms));
        let scheduler = StepScheduler::new(
            ctx,
            Arc::new(AgentCatalog::with_builtins()),
            Arc::new(invoker),
        );
        Arc::new(Gateway::new(scheduler, Arc::new(PassthroughAuthenticator)))
    }

    fn prompt_frame(txid: &str, prompt_id: &str, agent: &str) -> String {
        json!({
            "type": "action",
            "txid": txid,
            "data": {
                "type": "prompt",
                "fingerprintId": "fp",
                "authToken": "u1",
                "promptId": prompt_id,
                "prompt": "hello world",
                "files": {},
                "sessionState": {"mainAgentState": {"agentType": agent, "stepsRemaining": 10}}
            }
        })
        .to_string()
    }

    fn cancel_frame(txid: &str, prompt_id: &str) -> String {
        json!({
            "type": "action",
            "txid": txid,
            "data": {"type": "cancel", "authToken": "u1", "promptId": prompt_id}
        })
        .to_string()
    }

    /// Collect messages until the prompt response for `prompt_id` arrives.
    async fn until_done(rx: &mut mpsc::Receiver<ServerMessage>, prompt_id: &str) -> Vec<ServerMessage> {
        let mut seen = Vec::new();
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out")
                .expect("channel closed");
            let done = matches!(
                &msg,
                ServerMessage::Action { data: ServerAction::PromptResponse(r) } if r.prompt_id == prompt_id
            );
            seen.push(msg);
            if done {
                return seen;
            }
        }
    }

    fn status_of(msgs: &[ServerMessage]) -> PromptStatus {
        msgs.iter()
            .find_map(|m| match m {
                ServerMessage::Action {
                    data: ServerAction::PromptResponse(r),
                } => Some(r.status),
                _ => None,
            })
            .unwrap()
    }

    fn text_of(msgs: &[ServerMessage]) -> String {
        msgs.iter()
            .filter_map(|m| match m {
                ServerMessage::Action {
                    data: ServerAction::AgentChunk(c),
                } => match &c.chunk {
                    Chunk::Text { text } => Some(text.clone()),
                    Chunk::Error { .. } => None,
                },
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_prompt_acks_then_streams() {
        let ctx = Arc::new(RuntimeContext::new());
        let gateway = gateway_with(Arc::clone(&ctx), 0);
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);
        let session = gateway.connect(tx, "test");

        session
            .handle_frame(&prompt_frame("tx-1", "p1", "file-explorer"))
            .await
            .unwrap();

        let msgs = until_done(&mut rx, "p1").await;
        assert_eq!(msgs[0], ServerMessage::ack(Some("tx-1".to_string())));
        assert_eq!(text_of(&msgs), "[file-explorer] hello world");
        assert_eq!(status_of(&msgs), PromptStatus::Completed);
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMessage::Action { data: ServerAction::UsageResponse(u) } if u.prompt_id == "p1"
        )));

        // Finished prompts leave no live input behind.
        assert_eq!(ctx.live_inputs.get_live_ids("u1"), None);
    }

    #[tokio::test]
    async fn test_child_chunks_carry_prefixed_ids() {
        let ctx = Arc::new(RuntimeContext::new());
        let gateway = gateway_with(ctx, 0);
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);
        let session = gateway.connect(tx, "test");

        session
            .handle_frame(&prompt_frame("tx-1", "p1", "base-single-step"))
            .await
            .unwrap();
        let msgs = until_done(&mut rx, "p1").await;

        let ids: Vec<(String, String)> = msgs
            .iter()
            .filter_map(|m| match m {
                ServerMessage::Action {
                    data: ServerAction::AgentChunk(c),
                } => Some((c.user_input_id.clone(), c.agent_type.clone())),
                _ => None,
            })
            .collect();
        assert!(ids
            .iter()
            .any(|(id, agent)| agent == "context-pruner" && id.starts_with("p1-context-pruner-")));
        assert!(ids.iter().any(|(id, agent)| agent == "base-single-step" && id == "p1"));
    }

    #[tokio::test]
    async fn test_cancel_stops_run() {
        let ctx = Arc::new(RuntimeContext::new());
        let gateway = gateway_with(Arc::clone(&ctx), 50);
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);
        let session = gateway.connect(tx, "test");

        session
            .handle_frame(&prompt_frame("tx-1", "p1", "file-explorer"))
            .await
            .unwrap();
        session.handle_frame(&cancel_frame("tx-2", "p1")).await.unwrap();

        let msgs = until_done(&mut rx, "p1").await;
        assert_eq!(msgs[0], ServerMessage::ack(Some("tx-1".to_string())));
        assert_eq!(msgs[1], ServerMessage::ack(Some("tx-2".to_string())));
        assert_eq!(status_of(&msgs), PromptStatus::Cancelled);
        assert!(text_of(&msgs).len() < "[file-explorer] hello world".len());
    }

    #[tokio::test]
    async fn test_disconnect_cancels_runs() {
        let ctx = Arc::new(RuntimeContext::new());
        let gateway = gateway_with(Arc::clone(&ctx), 50);
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);
        let mut session = gateway.connect(tx, "test");
        let session_id = session.session_id().to_string();
        assert!(ctx.sessions.is_connected(&session_id));

        session
            .handle_frame(&prompt_frame("tx-1", "p1", "file-explorer"))
            .await
            .unwrap();
        session.close();
        assert!(!ctx.sessions.is_connected(&session_id));

        let msgs = until_done(&mut rx, "p1").await;
        assert_eq!(status_of(&msgs), PromptStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_malformed_frame_gets_failing_ack() {
        let gateway = gateway_with(Arc::new(RuntimeContext::new()), 0);
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);
        let session = gateway.connect(tx, "test");

        session.handle_frame("{nope").await.unwrap();
        session
            .handle_frame(r#"{"type":"action","txid":"t2","data":{"type":"prompt","fingerprintId":"f","promptId":""}}"#)
            .await
            .unwrap();
        session.handle_frame(r#"{"type":"ping","txid":"t3"}"#).await.unwrap();

        match rx.recv().await.unwrap() {
            ServerMessage::Ack { txid, success, error } => {
                assert_eq!(txid, None);
                assert!(!success);
                assert!(error.unwrap().starts_with("Malformed message"));
            }
            other => panic!("unexpected {:?}", other),
        }
        match rx.recv().await.unwrap() {
            ServerMessage::Ack { txid, success, error } => {
                assert_eq!(txid.as_deref(), Some("t2"));
                assert!(!success);
                assert_eq!(error.as_deref(), Some("Missing required field: promptId"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(rx.recv().await.unwrap(), ServerMessage::ack(Some("t3".to_string())));
        assert_eq!(rx.recv().await.unwrap(), ServerMessage::Pong);
    }

    #[tokio::test]
    async fn test_unknown_token_is_acked_but_cancelled() {
        let ctx = Arc::new(RuntimeContext::new());
        let scheduler = StepScheduler::new(
            Arc::clone(&ctx),
            Arc::new(AgentCatalog::with_builtins()),
            Arc::new(EchoInvoker::new()),
        );
        let auth = StaticTokenAuthenticator::default().with_token("secret", "u1");
        let gateway = Arc::new(Gateway::new(scheduler, Arc::new(auth)));
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);
        let session = gateway.connect(tx, "test");

        session
            .handle_frame(&prompt_frame("tx-1", "p1", "base"))
            .await
            .unwrap();
        let msgs = until_done(&mut rx, "p1").await;

        assert_eq!(msgs[0], ServerMessage::ack(Some("tx-1".to_string())));
        assert_eq!(status_of(&msgs), PromptStatus::Cancelled);
        assert!(text_of(&msgs).is_empty());
        assert!(ctx.live_inputs.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_unknown_prompt_is_acked() {
        let gateway = gateway_with(Arc::new(RuntimeContext::new()), 0);
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);
        let session = gateway.connect(tx, "test");

        session.handle_frame(&cancel_frame("tx-9", "never")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), ServerMessage::ack(Some("tx-9".to_string())));
    }

    #[tokio::test]
    async fn test_unknown_agent_reports_error_chunk() {
        let gateway = gateway_with(Arc::new(RuntimeContext::new()), 0);
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);
        let session = gateway.connect(tx, "test");

        session
            .handle_frame(&prompt_frame("tx-1", "p1", "ghost"))
            .await
            .unwrap();
        let msgs = until_done(&mut rx, "p1").await;

        assert_eq!(status_of(&msgs), PromptStatus::Failed);
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMessage::Action { data: ServerAction::AgentChunk(c) }
                if matches!(&c.chunk, Chunk::Error { message } if message.contains("ghost"))
        )));
    }

    #[tokio::test]
    async fn test_closed_outbound_ends_session() {
        let gateway = gateway_with(Arc::new(RuntimeContext::new()), 0);
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let session = gateway.connect(tx, "test");
        drop(rx);

        let err = session.handle_frame(r#"{"type":"ping"}"#).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    async fn ack_for(rx: &mut mpsc::Receiver<ServerMessage>, txid: &str) -> ServerMessage {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out")
                .expect("channel closed");
            if matches!(&msg, ServerMessage::Ack { txid: Some(t), .. } if t == txid) {
                return msg;
            }
        }
    }

    #[tokio::test]
    async fn test_reused_live_prompt_id_is_rejected() {
        let ctx = Arc::new(RuntimeContext::new());
        let gateway = gateway_with(Arc::clone(&ctx), 20);
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);
        let session = gateway.connect(tx, "test");

        session
            .handle_frame(&prompt_frame("tx-1", "p1", "file-explorer"))
            .await
            .unwrap();
        session
            .handle_frame(&prompt_frame("tx-2", "p1", "file-explorer"))
            .await
            .unwrap();

        match ack_for(&mut rx, "tx-2").await {
            ServerMessage::Ack { success, error, .. } => {
                assert!(!success);
                assert!(error.unwrap().contains("already running"));
            }
            other => panic!("unexpected {:?}", other),
        }

        // The first run is untouched by the rejected duplicate.
        let msgs = until_done(&mut rx, "p1").await;
        assert_eq!(status_of(&msgs), PromptStatus::Completed);
        assert!(text_of(&msgs).ends_with("world"));
        assert!(ctx.live_inputs.is_empty());

        // Once finished, the id may be used again.
        session
            .handle_frame(&prompt_frame("tx-3", "p1", "file-explorer"))
            .await
            .unwrap();
        assert_eq!(ack_for(&mut rx, "tx-3").await, ServerMessage::ack(Some("tx-3".to_string())));
        until_done(&mut rx, "p1").await;
    }

    #[tokio::test]
    async fn test_nack_keeps_txid_up_to_configured_limit() {
        let limit = 2 * DEFAULT_MAX_FRAME_BYTES;
        let scheduler = StepScheduler::new(
            Arc::new(RuntimeContext::new()),
            Arc::new(AgentCatalog::with_builtins()),
            Arc::new(EchoInvoker::new()),
        );
        let gateway = Arc::new(
            Gateway::new(scheduler, Arc::new(PassthroughAuthenticator)).with_config(GatewayConfig {
                max_frame_bytes: limit,
                ..GatewayConfig::default()
            }),
        );
        let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);
        let session = gateway.connect(tx, "test");

        // Larger than the default limit, within the configured one, and not a known message.
        let frame = json!({
            "type": "bogus",
            "txid": "big-1",
            "padding": "x".repeat(DEFAULT_MAX_FRAME_BYTES + 1024),
        })
        .to_string();
        assert!(frame.len() > DEFAULT_MAX_FRAME_BYTES && frame.len() < limit);

        session.handle_frame(&frame).await.unwrap();
        match rx.recv().await.unwrap() {
            ServerMessage::Ack { txid, success, .. } => {
                assert!(!success);
                assert_eq!(txid.as_deref(), Some("big-1"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
