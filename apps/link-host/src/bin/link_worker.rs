use link_host::cli::WorkerArgs;
use link_host::error::HostError;
use link_host::host_api::{HOST_INFO_METHOD, HOST_LOG_METHOD};
use link_host::logger::{LOG_DIR_NAME, WORKER_LOG_FILE, initialize as LoggerInitialize};
use link_host::worker_api::WorkerApi;

use link_core::config::{LinkConfig, default_config_dir};
use link_core::link::WorkerClient;
use link_core::token;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info};
use serde_json::{Value, json};
use tokio::time::sleep as TokioSleep;

#[tokio::main]
async fn main() -> ExitCode {
    match run(WorkerArgs::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: WorkerArgs) -> Result<(), HostError> {
    let config_dir = args.config_dir.unwrap_or_else(default_config_dir);
    LoggerInitialize(&config_dir.join(LOG_DIR_NAME), WORKER_LOG_FILE)?;

    let config = LinkConfig::load(&config_dir)?;
    let token = args.token.as_deref().map(token::parse).transpose()?;

    let mut client = WorkerClient::new(
        config.client.clone(),
        config.service.registry(),
        Arc::new(WorkerApi),
    );
    client.connect(args.port, token).await?;

    let process_id = client
        .token()
        .map(|t| t.process_id().to_string())
        .unwrap_or_default();

    let host = client.call(HOST_INFO_METHOD, Value::Null).await?;
    info!("Worker {} linked to {}", process_id, host);

    client
        .call(
            HOST_LOG_METHOD,
            json!({ "process_id": process_id, "message": "worker ready" }),
        )
        .await?;

    let poll = Duration::from_secs(args.poll_secs.max(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, leaving the link");
                client.disconnect();
                break;
            }
            _ = TokioSleep(poll) => {
                if !client.is_connected().await {
                    info!("Host closed the link");
                    break;
                }
            }
        }
    }

    Ok(())
}
