//! mAIware Agent - Main Entry Point

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use maiware_agent::constants::APP_VERSION;
use maiware_agent::logic::classifier::{ClassificationDispatcher, SubprocessClassifier};
use maiware_agent::logic::config::AgentConfig;
use maiware_agent::logic::events::{AgentEvent, EventBus};
use maiware_agent::logic::identity::AgentIdentity;
use maiware_agent::logic::locator::ServerLocator;
use maiware_agent::logic::pe::CapstoneDecoder;
use maiware_agent::logic::pipeline::ScanPipeline;
use maiware_agent::logic::queue::ScanAgent;
use maiware_agent::logic::uplink::{
    spawn_heartbeat_loop, AuxPush, CollectorClient, DashboardPublisher, ReqwestTransport,
};
use maiware_agent::logic::watcher::{DirectoryWatcher, WriteStability};

#[derive(Debug, Parser)]
#[command(name = "maiware-agent", version, about = "mAIware endpoint agent")]
struct Cli {
    /// Directory to watch (default: MAIWARE_WATCH_DIR or the downloads folder)
    #[arg(long, value_name = "DIR")]
    watch: Option<PathBuf>,

    /// Queue a file for scanning at startup (repeatable)
    #[arg(long = "scan", value_name = "PATH")]
    scan: Vec<PathBuf>,
}

fn log_event(event: &AgentEvent) {
    match event {
        AgentEvent::Ready { watch_dir } => log::info!("[Agent] Ready, watching {}", watch_dir.display()),
        AgentEvent::ScanStarted { filename, manual, .. } => {
            log::info!("[Agent] Scan started: {}{}", filename, if *manual { " (manual)" } else { "" })
        }
        AgentEvent::Disassembly { filename, instructions, meta } => {
            log::info!("[Agent] {} entry point: {} instructions ({})", filename, instructions.len(), meta.arch)
        }
        AgentEvent::ScanResult(result) => log::info!(
            "[Agent] {} => {}{}",
            result.detected_filename,
            result.classification,
            result
                .confidence_score
                .map(|c| format!(" ({:.2})", c))
                .unwrap_or_default()
        ),
        AgentEvent::ShutdownComplete => log::info!("[Agent] Shutdown complete"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    log::info!("Starting mAIware agent v{}...", APP_VERSION);

    let mut config = AgentConfig::default();
    if let Some(dir) = cli.watch {
        config.watch_dir = Some(dir);
    }
    config.log_summary();

    let identity = AgentIdentity::detect();
    let http_client = reqwest::Client::builder()
        .build()
        .context("Failed to create HTTP client")?;

    let events = EventBus::default();

    // Event listeners
    let mut log_rx = events.subscribe();
    let logger = tokio::spawn(async move {
        loop {
            match log_rx.recv().await {
                Ok(event) => {
                    log_event(&event);
                    if matches!(event, AgentEvent::ShutdownComplete) {
                        break;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let publisher = config.dashboard_url.clone().map(|url| {
        let publisher = DashboardPublisher::new(
            http_client.clone(),
            url,
            config.dashboard_api_key.clone(),
            identity.agent_id.clone(),
        );
        tokio::spawn(publisher.run(events.subscribe()))
    });

    // Uplink
    let locator = Arc::new(ServerLocator::new(&config, &identity, http_client.clone()));
    let collector = Arc::new(CollectorClient::new(
        Arc::new(ReqwestTransport::new(http_client.clone())),
        locator,
        identity,
    ));

    // Scan pipeline
    let classifier = SubprocessClassifier::python_model(config.python.clone(), config.ai_dir.clone());
    let pipeline = ScanPipeline::new(
        events.clone(),
        ClassificationDispatcher::new(Box::new(classifier)),
        Arc::new(CapstoneDecoder),
        collector.clone(),
        AuxPush::new(http_client, config.ai_app_url.clone(), !config.skip_upload),
        config.scan_delay,
    );

    let (mut agent, handle) = ScanAgent::new(Arc::new(pipeline), events.clone());

    match &config.watch_dir {
        Some(dir) => match DirectoryWatcher::start(dir, handle.sender(), WriteStability::default()) {
            Ok(watcher) => agent.attach_watcher(watcher),
            Err(e) => log::error!("[Monitor] {} - manual scans only", e),
        },
        None => log::warn!("[Monitor] No watch directory found - manual scans only"),
    }

    agent.attach_heartbeat(spawn_heartbeat_loop(collector, config.heartbeat_interval));

    log::info!(
        "[Monitor] Agent bootstrapped (pid {}). Upload {}, scan delay {}ms.",
        std::process::id(),
        if config.skip_upload { "disabled" } else { "enabled" },
        config.scan_delay.as_millis()
    );

    let agent_task = tokio::spawn(agent.run());

    for path in cli.scan {
        handle.scan_path(path).await?;
    }

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    log::info!("Shutdown signal received, draining...");

    handle.shutdown().await?;
    agent_task.await.context("Agent task failed")?;
    logger.await.context("Event logger failed")?;
    if let Some(publisher) = publisher {
        publisher.await.context("Dashboard publisher failed")?;
    }

    Ok(())
}
