// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley serve` command implementation.
//!
//! Wires SQLite storage, the Telegram channel and OpenAI providers into the
//! conversation engine, then runs three tasks until a termination signal:
//! the HTTP gateway, the queue worker pool, and (when enabled) the digest
//! scheduler. Shutdown stops intake first, drains the workers, and closes
//! the database last.

use std::sync::Arc;

use parley_agent::{ConversationEngine, WorkerEngine, install_signal_handler, register_metrics};
use parley_config::model::ParleyConfig;
use parley_core::{ParleyError, StorageAdapter, TranscriptionAdapter};
use parley_cron::{DigestJob, DigestSettings, Schedule, Scheduler};
use parley_gateway::{GatewaySettings, GatewayState};
use parley_openai::{OpenAiProvider, OpenAiTranscriber};
use parley_storage::SqliteStorage;
use parley_telegram::TelegramChannel;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Runs the `parley serve` command.
pub async fn run_serve(config: ParleyConfig) -> Result<(), ParleyError> {
    info!(name = %config.agent.name, version = env!("CARGO_PKG_VERSION"), "starting parley serve");
    register_metrics();

    let storage = {
        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;
        Arc::new(storage)
    };

    let result = run_with_storage(&config, storage.clone()).await;

    if let Err(e) = storage.close().await {
        error!(error = %e, "failed to close storage cleanly");
    }
    info!("parley stopped");
    result
}

async fn run_with_storage(
    config: &ParleyConfig,
    storage: Arc<SqliteStorage>,
) -> Result<(), ParleyError> {
    let channel = Arc::new(TelegramChannel::new(&config.telegram)?);
    let provider = Arc::new(OpenAiProvider::new(&config.openai)?);
    let transcriber: Arc<dyn TranscriptionAdapter + Send + Sync> =
        Arc::new(OpenAiTranscriber::new(&config.openai)?);

    let engine = Arc::new(ConversationEngine::new(
        config,
        storage.clone(),
        channel.clone(),
        provider.clone(),
        Some(transcriber),
    )?);

    // Built before anything is spawned so a bad setting fails startup.
    let gateway_state = GatewayState::new(
        storage.clone(),
        storage.clone(),
        GatewaySettings::from_config(config)?,
    );
    let scheduler = if config.digest.enabled {
        let schedule = Schedule::parse(&config.digest.schedule, &config.digest.timezone)?;
        let job = DigestJob::new(
            storage.clone(),
            channel.clone(),
            provider.clone(),
            DigestSettings::from_config(config)?,
        );
        Some(Scheduler::new(schedule, Arc::new(job)))
    } else {
        info!("digest disabled by configuration");
        None
    };

    let shutdown = install_signal_handler();

    let worker = WorkerEngine::with_storage(
        storage.clone(),
        storage.clone(),
        engine,
        config.queue.clone(),
    );
    let worker_task: JoinHandle<Result<(), ParleyError>> = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { worker.run(shutdown).await })
    };

    let scheduler_task = scheduler.map(|scheduler| {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { scheduler.run(shutdown).await })
    });

    let gateway_result = parley_gateway::serve(
        &config.gateway.host,
        config.gateway.port,
        gateway_state,
        shutdown.clone(),
    )
    .await;
    if let Err(e) = &gateway_result {
        error!(error = %e, "gateway failed, shutting down");
    }
    // Covers the gateway exiting on its own.
    shutdown.cancel();

    let worker_result = match worker_task.await {
        Ok(result) => result,
        Err(e) => Err(ParleyError::Internal(format!("worker task panicked: {e}"))),
    };
    if let Some(task) = scheduler_task
        && let Err(e) = task.await
    {
        warn!(error = %e, "scheduler task panicked");
    }

    gateway_result.and(worker_result)
}
