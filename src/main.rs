// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent Relay entry point.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use agent_relay::config::{self, CliOptions, ResolvedConfig};
use agent_relay::scheduler::AgentDefinition;
use agent_relay::server::{build_catalog, RelayServer};
use agent_relay::telemetry::{init_telemetry, TelemetryConfig};

/// Agent Relay - streaming orchestration for cancellable agent runs.
#[derive(Parser)]
#[command(name = "agent-relay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Show debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Show trace output (every liveness decision)
    #[arg(long, global = true)]
    trace: bool,

    /// Workspace directory to load config from (defaults to the current directory)
    #[arg(short, long, global = true, env = "AGENT_RELAY_WORKSPACE")]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server (default)
    Serve(ServeArgs),

    /// List the agents available to prompts
    Agents {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the resolved configuration as JSON
    Config,
}

#[derive(Args, Default)]
struct ServeArgs {
    /// WebSocket listen address
    #[arg(short, long, env = "AGENT_RELAY_LISTEN")]
    listen: Option<String>,

    /// Also serve newline-delimited JSON on this endpoint (host:port, unix:/path, or a socket path)
    #[arg(short, long, env = "AGENT_RELAY_SOCKET")]
    socket: Option<String>,

    /// WebSocket route
    #[arg(long, env = "AGENT_RELAY_WS_PATH")]
    ws_path: Option<String>,

    /// Disable live-input checking; every run is live and cannot be cancelled
    #[arg(long)]
    no_live_input_checks: bool,

    /// Disable session-connection checking
    #[arg(long)]
    no_session_checks: bool,

    /// Step budget for root agents without one, and for every spawned child
    #[arg(long, env = "AGENT_RELAY_MAX_STEPS")]
    max_steps: Option<u32>,

    /// Root agent when a prompt names none
    #[arg(long, env = "AGENT_RELAY_DEFAULT_AGENT")]
    default_agent: Option<String>,
}

impl From<ServeArgs> for CliOptions {
    fn from(args: ServeArgs) -> Self {
        CliOptions {
            listen_addr: args.listen,
            ws_path: args.ws_path,
            socket_path: args.socket,
            live_input_checks: args.no_live_input_checks.then_some(false),
            session_checks: args.no_session_checks.then_some(false),
            max_steps: args.max_steps,
            default_agent: args.default_agent,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _telemetry = init_telemetry(&TelemetryConfig::from_verbosity(cli.debug, cli.trace))?;

    let workspace_root = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir()?,
    };

    match cli.command.unwrap_or(Commands::Serve(ServeArgs::default())) {
        Commands::Serve(args) => {
            let config = config::load_config(&workspace_root, args.into())?;
            serve(config).await
        }
        Commands::Agents { json } => {
            let config = config::load_config(&workspace_root, CliOptions::default())?;
            list_agents(&config, json)
        }
        Commands::Config => {
            let config = config::load_config(&workspace_root, CliOptions::default())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn serve(config: ResolvedConfig) -> anyhow::Result<()> {
    println!(
        "{} ws://{}{}",
        "agent-relay listening on".bright_blue().bold(),
        config.listen_addr,
        config.ws_path
    );
    if let Some(socket) = &config.socket_path {
        println!("{} {}", "ndjson endpoint".bright_blue().bold(), socket);
    }
    if !config.live_input_checks {
        println!("{}", "live-input checks disabled".yellow());
    }
    if !config.session_checks {
        println!("{}", "session checks disabled".yellow());
    }

    RelayServer::from_config(config)
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}

fn list_agents(config: &ResolvedConfig, json: bool) -> anyhow::Result<()> {
    let catalog = build_catalog(config);

    if json {
        let agents: Vec<_> = catalog
            .ids()
            .into_iter()
            .filter_map(|id| catalog.get(&id))
            .map(|agent| {
                serde_json::json!({
                    "id": agent.id(),
                    "spawnableAgents": agent.spawnable_agents(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&agents)?);
        return Ok(());
    }

    println!("{}", format!("{} agents", catalog.len()).bright_blue().bold());
    for id in catalog.ids() {
        let Some(agent) = catalog.get(&id) else { continue };
        let marker = if id == config.default_agent { " (default)".green().to_string() } else { String::new() };
        let spawnable = agent.spawnable_agents();
        if spawnable.is_empty() {
            println!("  {}{}", id.bold(), marker);
        } else {
            println!("  {}{} -> {}", id.bold(), marker, spawnable.join(", ").dimmed());
        }
    }
    Ok(())
}
