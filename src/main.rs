use anyhow::{Context, Result, bail};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod capture;
mod classifier;
mod cli;
mod config;
mod discovery;
mod dispatch;
mod grouping;
mod model;
mod naming;
mod registry;
mod sanitize;
mod server;
mod state;
mod target;

use classifier::{Classifier, LlmClient};
use cli::Cli;
use config::Store;
use discovery::Discovery;
use dispatch::ReplayEngine;
use grouping::GroupPlanner;
use naming::NamingStrategy;
use server::{DispatchMode, ProtocolServer};
use state::AppState;
use target::Target;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_filter())).init();

    let config_path = cli.config_path()?;
    log::info!("Using config file: {}", config_path.display());
    let store = Arc::new(
        Store::open(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?,
    );
    let doc = store.snapshot();

    // Resolve the target, remembering a newly given one
    let raw_target = match cli.target.as_deref().filter(|t| !t.is_empty()) {
        Some(target) => {
            if target != doc.last_target {
                let target = target.to_string();
                store
                    .update(|doc| doc.last_target = target)
                    .context("Failed to save target to config")?;
            }
            target.to_string()
        }
        None if !doc.last_target.is_empty() => {
            log::info!("Using saved target: {}", doc.last_target);
            doc.last_target.clone()
        }
        None => bail!("Target server URL required. Usage: tapmcp --target http://localhost:3000"),
    };
    let target = Target::parse(&raw_target)?;
    target.probe().await.context("Target server check failed")?;

    // VALIDATE LLM settings before anything starts
    let classifier: Option<Arc<dyn Classifier>> = match cli.llm_settings()? {
        Some(settings) => {
            log::info!("Using LLM model: {}", settings.model);
            log::info!("Using LLM endpoint: {}", settings.endpoint);
            let client: Arc<dyn Classifier> =
                Arc::new(LlmClient::new(settings).context("Failed to build LLM client")?);
            Some(client)
        }
        None => None,
    };

    let max_tools = cli.max_tools.unwrap_or(doc.max_tools);
    let mcp_port = cli.mcp_port.unwrap_or(doc.mcp_port);
    let grace = cli.shutdown_grace();

    let replay = ReplayEngine::new().context("Failed to build HTTP client")?;
    let state = Arc::new(AppState::new(Arc::clone(&store), max_tools, replay));
    log::info!("Loaded {} tools from config", state.tools.len());

    // Open the capture handle early: every capture problem is fatal at startup
    let source = capture::open_loopback(target.port()).context("Failed to start capture")?;

    let shutdown = CancellationToken::new();

    // Spawn cross-platform signal handler
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_interrupt().await;
        log::info!("Shutting down");
        signal_token.cancel();
    });

    let mode = match &classifier {
        Some(classifier) if cli.grouping => {
            log::info!("Using LLM grouping");
            let planner = GroupPlanner::new(
                Arc::clone(&state.tools),
                Arc::clone(&state.groups),
                Arc::clone(classifier),
                state.tasks.clone(),
            );
            planner.start(cli.regroup);
            planner.watch(state.events.subscribe(), shutdown.clone());
            DispatchMode::Grouped
        }
        _ => {
            log::info!("Using individual tool mode");
            DispatchMode::PerTool
        }
    };

    let server = ProtocolServer::new(Arc::clone(&state), mode, cli.mcp_name.clone());
    server.forward_events(state.events.subscribe(), shutdown.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], mcp_port));
    let mut server_task = tokio::spawn(server::serve(server, addr, shutdown.clone(), grace));

    let naming = match &classifier {
        Some(classifier) if cli.use_llm => NamingStrategy::Classifier(Arc::clone(classifier)),
        _ => NamingStrategy::Deterministic,
    };
    let discovery = Discovery::new(
        Arc::clone(&state.endpoints),
        Arc::clone(&state.tools),
        naming,
        target.clone(),
        state.tasks.clone(),
    );

    log::info!("Observing traffic to {}", target.as_str());
    log::info!("Discovered endpoints will be available as MCP tools");

    let (tx, rx) = mpsc::channel(capture::CHANNEL_CAPACITY);
    let reader = capture::spawn_reader(source, tx, shutdown.clone());
    let engine = capture::CaptureEngine::new(target, cli.verbose);

    let server_result = tokio::select! {
        _ = engine.run(rx, &discovery, shutdown.clone()) => None,
        result = &mut server_task => Some(result),
    };
    shutdown.cancel();

    match reader.await.context("Capture reader panicked")? {
        Ok(count) => log::debug!("Capture closed after {count} payloads"),
        Err(e) => log::error!("Capture failed: {e}"),
    }
    let server_result = match server_result {
        Some(result) => result,
        None => server_task.await,
    };

    log::info!(
        "Observed {} endpoints, {} tools registered",
        state.endpoints.len(),
        state.tools.len()
    );

    state.tasks.close();
    if tokio::time::timeout(grace, state.tasks.wait()).await.is_err() {
        log::warn!("Background tasks still running after {grace:?}, exiting anyway");
    }

    server_result.context("MCP server task panicked")??;
    log::info!("Stopped");
    Ok(())
}

/// Wait for interrupt signal (cross-platform)
#[cfg(unix)]
async fn wait_for_interrupt() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm_result = signal(SignalKind::terminate());
    let mut sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result.as_mut(), sigint_result.as_mut()) {
        (Ok(sigterm), Ok(sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = sigint.recv() => {}
            }
        }
        (Ok(sigterm), Err(_)) => {
            let _ = sigterm.recv().await;
        }
        (Err(_), Ok(sigint)) => {
            let _ = sigint.recv().await;
        }
        (Err(_), Err(_)) => {
            let () = std::future::pending().await;
        }
    }
}

/// Wait for interrupt signal (cross-platform)
#[cfg(windows)]
async fn wait_for_interrupt() {
    let _ = tokio::signal::ctrl_c().await;
}
