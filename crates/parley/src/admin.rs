// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley queue` admin subcommands.
//!
//! Run the admin recovery operations straight against the database, so they
//! work whether or not the server is up. Output is JSON on stdout, matching
//! the shape of the HTTP admin routes.

use parley_config::model::ParleyConfig;
use parley_core::types::JobSnapshot;
use parley_core::{ParleyError, QueueAdapter, StorageAdapter};
use parley_storage::SqliteStorage;
use serde_json::{Value, json};

use crate::QueueCommand;

pub async fn run_queue_command(
    config: &ParleyConfig,
    command: QueueCommand,
) -> Result<(), ParleyError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;

    let result = execute(&storage, &config.queue.name, command).await;
    storage.close().await?;

    let output = result?;
    let text = serde_json::to_string_pretty(&output)
        .map_err(|e| ParleyError::Internal(format!("render output: {e}")))?;
    println!("{text}");
    Ok(())
}

async fn execute(
    queue: &dyn QueueAdapter,
    queue_name: &str,
    command: QueueCommand,
) -> Result<Value, ParleyError> {
    let now = parley_core::now_ms();
    match command {
        QueueCommand::Health => {
            let main = queue.counts(queue_name, now).await?;
            let dlq = queue.dead_letter_counts().await?;
            Ok(json!({ "ok": true, "queues": { "main": main, "dlq": dlq } }))
        }
        QueueCommand::Failed { limit } => {
            let jobs = queue.failed_jobs(queue_name, limit).await?;
            Ok(json!({ "ok": true, "jobs": jobs }))
        }
        QueueCommand::Dlq { limit } => {
            let jobs: Vec<JobSnapshot> = queue
                .dead_letters(limit)
                .await?
                .iter()
                .map(JobSnapshot::from)
                .collect();
            Ok(json!({ "ok": true, "jobs": jobs }))
        }
        QueueCommand::Requeue { job_id } => match queue.requeue_dead_letter(job_id, now).await? {
            Some(new_job_id) => Ok(json!({ "ok": true, "jobId": job_id, "newJobId": new_job_id })),
            None => Err(ParleyError::NotFound {
                kind: "dead letter",
                id: job_id.to_string(),
            }),
        },
    }
}
