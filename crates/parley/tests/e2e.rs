// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the complete Parley pipeline.
//!
//! Each test drives updates through the HTTP gateway into the durable queue,
//! lets a real worker pool process them with the conversation engine, and
//! observes the mock channel. Tests are independent and order-insensitive.

use std::future::Future;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use parley_agent::WorkerEngine;
use parley_core::types::Funnel;
use parley_core::{QueueAdapter, StorageAdapter};
use parley_gateway::{GatewaySettings, GatewayState, router};
use parley_test_utils::TestHarness;
use parley_test_utils::harness::TEST_CHAT_ID;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct Pipeline {
    harness: TestHarness,
    app: Router,
    shutdown: CancellationToken,
    worker: JoinHandle<()>,
}

impl Pipeline {
    async fn start() -> Self {
        let harness = TestHarness::builder()
            .with_config(|c| {
                c.queue.poll_interval_ms = 10;
                c.queue.backoff_base_ms = 10;
                c.queue.concurrency = 4;
            })
            .build()
            .await
            .unwrap();

        let settings = GatewaySettings::from_config(&harness.config).unwrap();
        let app = router(GatewayState::new(
            harness.storage.clone(),
            harness.storage.clone(),
            settings,
        ));

        let worker = WorkerEngine::with_storage(
            harness.storage.clone(),
            harness.storage.clone(),
            harness.engine.clone(),
            harness.config.queue.clone(),
        );
        let shutdown = CancellationToken::new();
        let worker = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                worker.run(shutdown).await.unwrap();
            })
        };

        Self {
            harness,
            app,
            shutdown,
            worker,
        }
    }

    async fn post_update(&self, update_id: i64, text: &str) -> Value {
        let body = json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id,
                "date": 1_700_000_000,
                "chat": { "id": TEST_CHAT_ID, "type": "private" },
                "from": { "id": TEST_CHAT_ID, "is_bot": false, "username": "tester" },
                "text": text,
            }
        });
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, value) = self.call(request).await;
        assert_eq!(status, StatusCode::OK);
        value
    }

    async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn stop(self) -> TestHarness {
        self.shutdown.cancel();
        self.worker.await.unwrap();
        self.harness
    }
}

async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within 10s"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn duplicate_webhook_delivery_produces_one_reply() {
    let pipeline = Pipeline::start().await;

    assert_eq!(pipeline.post_update(10, "I keep putting things off").await, json!({ "ok": true }));
    assert_eq!(
        pipeline.post_update(10, "I keep putting things off").await,
        json!({ "ok": true, "duplicate": true })
    );

    let harness = &pipeline.harness;
    wait_until(|| async move { harness.replies().await.len() == 1 }).await;
    // Give a stray second job time to show up if one had been enqueued.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.replies().await, vec!["mock response".to_string()]);

    let harness = pipeline.stop().await;
    let counts = harness
        .storage
        .counts(&harness.config.queue.name, parley_core::now_ms())
        .await
        .unwrap();
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.waiting, 0);
}

#[tokio::test]
async fn feedback_flow_through_the_queue() {
    let pipeline = Pipeline::start().await;

    pipeline.post_update(1, "/feedback").await;
    let harness = &pipeline.harness;
    wait_until(|| async move { harness.replies().await.len() == 1 }).await;

    pipeline.post_update(2, "great bot").await;
    wait_until(|| async move { harness.replies().await.len() == 2 }).await;

    let harness = pipeline.stop().await;
    let summary = harness.storage.flow_summary(Funnel::Feedback).await.unwrap();
    assert_eq!(summary.started, 1);
    assert_eq!(summary.completed, 1);

    let state = harness.storage.load_state(TEST_CHAT_ID).await.unwrap().unwrap();
    assert!(!state.awaiting_feedback);
    // Feedback capture never calls the text-generation provider.
    assert_eq!(harness.mock_provider.call_count().await, 0);
}

#[tokio::test]
async fn undeliverable_job_dead_letters_then_recovers_after_requeue() {
    let pipeline = Pipeline::start().await;
    pipeline.harness.mock_channel.fail_always(503);

    pipeline.post_update(7, "hello?").await;

    let harness = &pipeline.harness;
    wait_until(|| async move {
        harness.storage.dead_letter_counts().await.unwrap().waiting == 1
    })
    .await;

    let entries = harness.storage.dead_letters(10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].attempts_made, harness.config.queue.max_attempts);
    assert!(harness.replies().await.is_empty());
    // Nothing is committed for an undelivered reply.
    assert!(harness.storage.recent_history(TEST_CHAT_ID, 10).await.unwrap().is_empty());

    harness.mock_channel.recover();
    let uri = format!("/queue/dlq/requeue/{}", entries[0].original_job_id);
    let request = Request::builder()
        .method("POST")
        .uri(&uri)
        .body(Body::empty())
        .unwrap();
    let (status, body) = pipeline.call(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    wait_until(|| async move { harness.replies().await.len() == 1 }).await;
    assert_eq!(harness.storage.dead_letter_counts().await.unwrap().waiting, 0);

    let request = Request::builder()
        .method("POST")
        .uri(&uri)
        .body(Body::empty())
        .unwrap();
    let (status, _) = pipeline.call(request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let harness = pipeline.stop().await;
    assert_eq!(harness.storage.recent_history(TEST_CHAT_ID, 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn same_chat_updates_are_answered_in_order() {
    let pipeline = Pipeline::start().await;
    pipeline
        .harness
        .mock_provider
        .set_default(parley_test_utils::ScriptedReply::text("ok"))
        .await;

    for id in 1..=3 {
        pipeline.post_update(id, &format!("message {id}")).await;
    }

    let harness = &pipeline.harness;
    wait_until(|| async move { harness.replies().await.len() == 3 }).await;

    let harness = pipeline.stop().await;
    let history = harness.storage.recent_history(TEST_CHAT_ID, 10).await.unwrap();
    let user_turns: Vec<_> = history
        .iter()
        .filter(|h| h.role == parley_core::types::HistoryRole::User)
        .map(|h| h.content.as_str())
        .collect();
    assert_eq!(user_turns, vec!["message 1", "message 2", "message 3"]);
}
