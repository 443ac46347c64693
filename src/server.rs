// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Wiring a resolved configuration into a running relay.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::ResolvedConfig;
use crate::error::Result;
use crate::gateway::{
    ws, Authenticator, Endpoint, Gateway, GatewayConfig, NdjsonServer, PassthroughAuthenticator,
    StaticTokenAuthenticator,
};
use crate::invoker::EchoInvoker;
use crate::runtime::RuntimeContext;
use crate::scheduler::{AgentCatalog, ModelInvoker, SchedulerConfig, StepScheduler};

/// A configured relay: runtime context, scheduler and gateway.
pub struct RelayServer {
    config: ResolvedConfig,
    gateway: Arc<Gateway>,
}

impl RelayServer {
    /// Relay backed by the built-in [`EchoInvoker`].
    pub fn from_config(config: ResolvedConfig) -> Self {
        let invoker = EchoInvoker::new().with_delay(Duration::from_millis(config.echo_delay_ms));
        Self::with_invoker(config, Arc::new(invoker))
    }

    pub fn with_invoker(config: ResolvedConfig, invoker: Arc<dyn ModelInvoker>) -> Self {
        let ctx = Arc::new(
            RuntimeContext::new().with_checks(config.live_input_checks, config.session_checks),
        );
        if !config.live_input_checks {
            warn!("Live-input checks disabled: runs cannot be cancelled");
        }

        let scheduler = StepScheduler::new(ctx, Arc::new(build_catalog(&config)), invoker)
            .with_config(SchedulerConfig::default().with_child_max_steps(config.max_steps));
        let gateway = Gateway::new(scheduler, build_authenticator(&config)).with_config(GatewayConfig {
            default_agent: config.default_agent.clone(),
            max_steps: config.max_steps,
            max_frame_bytes: config.max_frame_bytes,
        });

        Self {
            config,
            gateway: Arc::new(gateway),
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Serve every configured transport until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.listen_socket_addr()?;

        let mut ndjson = match &self.config.socket_path {
            Some(endpoint) => {
                let mut server = NdjsonServer::new(Endpoint::parse(endpoint)?, Arc::clone(&self.gateway));
                server.start().await?;
                Some(server)
            }
            None => None,
        };

        let router = ws::router(Arc::clone(&self.gateway), &self.config.ws_path);
        info!(%addr, path = %self.config.ws_path, "Relay starting");
        let websocket = ws::serve(addr, router, shutdown);

        match &ndjson {
            Some(server) => {
                tokio::select! {
                    result = websocket => result?,
                    result = server.run() => result?,
                }
            }
            None => websocket.await?,
        }

        if let Some(server) = ndjson.as_mut() {
            server.stop()?;
        }
        info!("Relay stopped");
        Ok(())
    }
}

/// Built-in agents overlaid with the configured ones.
pub fn build_catalog(config: &ResolvedConfig) -> AgentCatalog {
    let mut catalog = AgentCatalog::with_builtins();
    for agent in &config.agents {
        catalog.register_spec(agent.clone());
    }
    catalog
}

/// Token table when one is configured, otherwise tokens are taken as user ids.
pub fn build_authenticator(config: &ResolvedConfig) -> Arc<dyn Authenticator> {
    if config.auth_tokens.is_empty() {
        warn!("No authTokens configured: auth tokens are used as user ids");
        Arc::new(PassthroughAuthenticator)
    } else {
        Arc::new(StaticTokenAuthenticator::new(config.auth_tokens.clone()))
    }
}
