use link_host::WORKER_BINARY;
use link_host::cli::HostArgs;
use link_host::error::HostError;
use link_host::host_api::HostApi;
use link_host::logger::{HOST_LOG_FILE, LOG_DIR_NAME, initialize as LoggerInitialize};
use link_host::prompt::ApprovalPrompt;
use link_host::worker_api::WORKER_INFO_METHOD;

use link_core::config::{LinkConfig, default_config_dir};
use link_core::link::{LaunchedWorker, LinkBroker};

use models::LinkEvent;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout as TokioTimeout;

const WORKER_EXIT_GRACE: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> ExitCode {
    match run(HostArgs::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: HostArgs) -> Result<(), HostError> {
    let config_dir = args.config_dir.unwrap_or_else(default_config_dir);

    // Initialize logger FIRST
    LoggerInitialize(&config_dir.join(LOG_DIR_NAME), HOST_LOG_FILE)?;

    info!("Link host starting");
    info!("Config directory: {}", config_dir.display());

    let mut config = LinkConfig::load(&config_dir)?;
    if config.launcher.executable.is_none() {
        config.launcher.executable = Some(PathBuf::from(WORKER_BINARY));
        config.launcher.args = vec![
            "--config-dir".to_string(),
            config_dir.display().to_string(),
        ];
    }

    let broker = Arc::new(LinkBroker::new(config, Arc::new(HostApi::new()))?);
    let event_loop = tokio::spawn(handle_events(
        Arc::clone(&broker),
        broker.subscribe(),
        args.auto_approve,
    ));

    if !broker.ensure_running().await {
        return Err(HostError::host("link service failed to start"));
    }

    let mut workers = Vec::new();
    for _ in 0..args.workers {
        let launched = broker.launch_worker(args.auto_pair).await?;
        info!(
            "Launched worker (PID: {:?}, pre-paired: {})",
            launched.pid(),
            launched.token.is_some()
        );
        workers.push(launched);
    }

    info!("Press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| HostError::host(format!("Failed to wait for Ctrl+C: {e}")))?;

    info!("Link host shutting down");
    event_loop.abort();
    let _ = event_loop.await;

    broker.stop_link()?;
    for worker in workers {
        reap(worker).await;
    }

    match Arc::try_unwrap(broker) {
        Ok(broker) => broker.shutdown().await,
        Err(_) => warn!("Link broker still shared at exit, not joining service thread"),
    }

    Ok(())
}

/// React to link events until the service goes away.
async fn handle_events(
    broker: Arc<LinkBroker>,
    mut events: broadcast::Receiver<LinkEvent>,
    auto_approve: bool,
) {
    let mut prompt = ApprovalPrompt::new();

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Missed {} link events", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            LinkEvent::ApprovalRequested { process_id } => {
                let approved = auto_approve || prompt.ask(&process_id).await;
                let outcome = if approved {
                    broker.approve(&process_id).await.map(|t| t.is_some())
                } else {
                    broker.deny(&process_id).await
                };

                match outcome {
                    Ok(true) => {}
                    Ok(false) => warn!("Worker {} stopped waiting for approval", process_id),
                    Err(e) => error!("Failed to answer approval for {}: {}", process_id, e),
                }
            }
            LinkEvent::ClientConnected { token } => {
                let process_id = token.process_id();
                match broker
                    .call_worker(process_id, WORKER_INFO_METHOD, Value::Null)
                    .await
                {
                    Ok(details) => info!("Worker {} connected: {}", process_id, details),
                    Err(e) => warn!("Worker {} connected but did not answer: {}", process_id, e),
                }
            }
            LinkEvent::AuthenticationFailed { process_id, reason } => {
                warn!("Worker '{}' refused: {}", process_id, reason);
            }
            other => info!("Link event: {:?}", other),
        }
    }
}

async fn reap(mut worker: LaunchedWorker) {
    match TokioTimeout(WORKER_EXIT_GRACE, worker.child.wait()).await {
        Ok(Ok(status)) => info!("Worker {:?} exited: {}", worker.pid(), status),
        Ok(Err(e)) => warn!("Failed to wait for worker: {}", e),
        Err(_) => {
            warn!("Worker {:?} did not exit, killing it", worker.pid());
            let _ = worker.child.kill().await;
        }
    }
}
