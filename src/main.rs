use scrapeflow::agent::ToolLoopAgent;
use scrapeflow::config::{Config, SessionBackend};
use scrapeflow::dispatch::QueryDispatcher;
use scrapeflow::gateway::{self, AppState};
use scrapeflow::session::{FileSessionStore, MemorySessionStore, SessionStore};
use scrapeflow::tools::{ToolBox, ToolSettings};
use scrapeflow::{mcp, models, prompt};

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "scrapeflow", version, about = "Session-aware web scraping agent")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP gateway (default)
    Serve,
    /// Serve the scraping tools over MCP stdio
    Tools,
    /// Run one instruction and print the JSON result
    Ask {
        /// What to scrape or extract
        instruction: String,
        /// Continue an existing session
        #[arg(short, long)]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve);

    // stdout carries the MCP protocol in `tools` mode and the result in
    // `ask` mode, so logs go to stderr there.
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;
        use tracing_subscriber::Layer;

        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        let fmt_layer = match command {
            Command::Serve => tracing_subscriber::fmt::layer().boxed(),
            _ => tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .boxed(),
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    let config_path = cli
        .config
        .unwrap_or_else(|| scrapeflow::scrapeflow_home().join("config.yaml"));
    info!(path = %config_path.display(), "loading configuration");
    let cfg = Config::load_or_default(&config_path).await?;

    let toolbox = Arc::new(ToolBox::with_builtins(ToolSettings::from_config(&cfg.tools))?);

    match command {
        Command::Tools => mcp::serve_stdio(toolbox).await,
        Command::Ask {
            instruction,
            session,
        } => {
            let dispatcher = build_dispatcher(&cfg, toolbox).await?;
            let outcome = dispatcher.invoke(&instruction, session.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Command::Serve => serve(&cfg, toolbox).await,
    }
}

/// Wire store, provider chain, tool loop and dispatcher from config.
async fn build_dispatcher(cfg: &Config, toolbox: Arc<ToolBox>) -> anyhow::Result<QueryDispatcher> {
    let store: Arc<dyn SessionStore> = match cfg.sessions.backend {
        SessionBackend::Memory => Arc::new(MemorySessionStore::new()),
        SessionBackend::File => Arc::new(FileSessionStore::open(cfg.sessions.path()).await?),
    };

    let manager = models::build_provider_manager_from_config(cfg)?;
    info!(
        providers = manager.provider_count(),
        max_retries = cfg.agent.max_retries,
        "model providers ready"
    );

    let runner = ToolLoopAgent::new(Arc::new(manager), toolbox, cfg.agent.max_tool_iterations);
    let base_prompt = prompt::load_base_prompt(
        cfg.agent.system_prompt_file.as_deref().map(std::path::Path::new),
    )
    .await?;

    Ok(
        QueryDispatcher::new(store, Arc::new(runner), base_prompt)
            .with_context_reuse(cfg.agent.reuse_session_context),
    )
}

async fn serve(cfg: &Config, toolbox: Arc<ToolBox>) -> anyhow::Result<()> {
    let artifacts_dir = toolbox.context().settings.artifacts_dir.clone();
    let dispatcher = Arc::new(build_dispatcher(cfg, toolbox).await?);

    let addr: SocketAddr = cfg
        .gateway
        .addr
        .parse()
        .with_context(|| format!("invalid gateway.addr '{}'", cfg.gateway.addr))?;

    let state = AppState::new(dispatcher, artifacts_dir).with_api_token_from_env();
    let cancel = CancellationToken::new();
    let gw = gateway::start_gateway(addr, state, cancel.clone())
        .await
        .with_context(|| format!("failed to bind gateway on {addr}"))?;

    info!(addr = %gw.addr, "scrapeflow ready");

    // Wait for shutdown signal (Ctrl-C)
    tokio::signal::ctrl_c().await?;
    info!("received Ctrl-C, shutting down");
    cancel.cancel();

    if let Err(e) = gw.handle.await {
        tracing::warn!(error = %e, "gateway task ended abnormally");
    }
    info!("shutdown complete");
    Ok(())
}
