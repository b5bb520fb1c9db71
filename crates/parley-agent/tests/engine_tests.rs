// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end conversation scenarios over temp SQLite and mock adapters.

use parley_agent::prompts;
use parley_agent::{JobHandler, TurnOutcome};
use parley_core::types::{
    CoachMode, ConversationState, Funnel, HistoryRole, NewJob, ReplySource,
};
use parley_core::{QueueAdapter, StorageAdapter, now_ms};
use parley_test_utils::harness::TEST_CHAT_ID;
use parley_test_utils::{MockTranscriber, ScriptedReply, TestHarness};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn feedback_flow_saves_and_counts() {
    let harness = TestHarness::new().await.unwrap();

    let reply = harness.send_text(1, "/feedback").await.unwrap();
    assert_eq!(reply, prompts::FEEDBACK_PROMPT);
    let state = harness.storage.load_state(TEST_CHAT_ID).await.unwrap().unwrap();
    assert_eq!(state.state(), ConversationState::AwaitingFeedback);

    let reply = harness.send_text(2, "great bot").await.unwrap();
    assert_eq!(reply, prompts::FEEDBACK_SAVED);
    let state = harness.storage.load_state(TEST_CHAT_ID).await.unwrap().unwrap();
    assert_eq!(state.state(), ConversationState::Idle);

    let summary = harness.storage.flow_summary(Funnel::Feedback).await.unwrap();
    assert_eq!(summary.started, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.cancelled, 0);

    // Feedback text is not a coaching turn.
    assert_eq!(harness.mock_provider.call_count().await, 0);
    assert!(
        harness
            .storage
            .recent_history(TEST_CHAT_ID, 10)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn cancelling_feedback_counts_cancellation() {
    let harness = TestHarness::new().await.unwrap();

    harness.send_text(1, "/feedback").await.unwrap();
    let reply = harness.send_text(2, "never mind").await.unwrap();
    assert_eq!(reply, prompts::FLOW_CANCELLED);

    let summary = harness.storage.flow_summary(Funnel::Feedback).await.unwrap();
    assert_eq!((summary.started, summary.completed, summary.cancelled), (1, 0, 1));

    let reply = harness.send_text(3, "/cancel").await.unwrap();
    assert_eq!(reply, prompts::NOTHING_TO_CANCEL);
}

#[tokio::test(start_paused = true)]
async fn provider_timeouts_fall_back_and_job_still_completes() {
    let harness = TestHarness::new().await.unwrap();
    harness.mock_provider.set_default(ScriptedReply::Hang).await;

    let outcome = harness
        .process(&TestHarness::text_message(1, "How do I stop overthinking?"))
        .await
        .unwrap();
    let TurnOutcome::Replied { reply, source, .. } = outcome else {
        panic!("expected a reply");
    };
    assert_eq!(reply, harness.config.conversation.timeout_fallback_reply);
    assert_eq!(source, Some(ReplySource::TimeoutFallback));

    // The same path, driven as a queue job, acks.
    let queue = harness.config.queue.name.clone();
    let msg = TestHarness::text_message(2, "Still there?");
    let job = NewJob::for_message(&queue, &msg, 3).unwrap();
    harness.storage.enqueue(job, now_ms()).await.unwrap();
    let job = harness
        .storage
        .dequeue(&queue, now_ms(), 60_000)
        .await
        .unwrap()
        .unwrap();

    harness
        .engine
        .handle(&job, &CancellationToken::new())
        .await
        .unwrap();
    assert!(harness.storage.ack(job.id, job.lease, now_ms()).await.unwrap());

    let counts = harness.storage.counts(&queue, now_ms()).await.unwrap();
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.failed, 0);
    assert!(harness.storage.dead_letters(10).await.unwrap().is_empty());
    assert_eq!(
        harness.replies().await,
        vec![
            harness.config.conversation.timeout_fallback_reply.clone(),
            harness.config.conversation.timeout_fallback_reply.clone(),
        ]
    );
}

#[tokio::test]
async fn analyzer_failure_degrades_to_placeholder() {
    let harness = TestHarness::builder()
        .with_config(|c| c.llm.retry_max_attempts = 1)
        .with_replies(vec![
            ScriptedReply::Status(400),
            ScriptedReply::text("Here is a reply anyway."),
        ])
        .build()
        .await
        .unwrap();

    let reply = harness.send_text(1, "hi coach").await.unwrap();
    assert_eq!(reply, "Here is a reply anyway.");

    let requests = harness.mock_provider.requests().await;
    assert_eq!(requests.len(), 2);
    let reporter_input = &requests[1].messages[0].content;
    assert!(reporter_input.contains(&harness.config.conversation.analysis_placeholder));
}

#[tokio::test]
async fn reporter_failure_sends_generic_fallback() {
    let harness = TestHarness::builder()
        .with_replies(vec![
            ScriptedReply::text("Topic: sleep"),
            ScriptedReply::Status(401),
        ])
        .build()
        .await
        .unwrap();

    let outcome = harness
        .process(&TestHarness::text_message(1, "I can't sleep"))
        .await
        .unwrap();
    let TurnOutcome::Replied { reply, source, .. } = outcome else {
        panic!("expected a reply");
    };
    assert_eq!(reply, harness.config.conversation.fallback_reply);
    assert_eq!(source, Some(ReplySource::Fallback));
}

#[tokio::test]
async fn generation_records_history_and_uses_it_next_turn() {
    let harness = TestHarness::builder()
        .with_replies(vec![
            ScriptedReply::text("analysis one"),
            ScriptedReply::text("reply one"),
            ScriptedReply::text("analysis two"),
            ScriptedReply::text("reply two"),
        ])
        .build()
        .await
        .unwrap();

    harness.send_text(1, "first message").await.unwrap();
    harness.send_text(2, "second message").await.unwrap();

    let history = harness.storage.recent_history(TEST_CHAT_ID, 10).await.unwrap();
    let turns: Vec<(HistoryRole, &str)> = history
        .iter()
        .map(|h| (h.role, h.content.as_str()))
        .collect();
    assert_eq!(
        turns,
        vec![
            (HistoryRole::User, "first message"),
            (HistoryRole::Assistant, "reply one"),
            (HistoryRole::User, "second message"),
            (HistoryRole::Assistant, "reply two"),
        ]
    );

    // Third request is the second analyzer call: prior turn plus the new text.
    let requests = harness.mock_provider.requests().await;
    let contents: Vec<&str> = requests[2].messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first message", "reply one", "second message"]);
}

#[tokio::test]
async fn reprocessing_an_update_does_not_duplicate_history() {
    let harness = TestHarness::new().await.unwrap();

    harness.send_text(7, "same update").await.unwrap();
    harness.send_text(7, "same update").await.unwrap();

    let history = harness.storage.recent_history(TEST_CHAT_ID, 10).await.unwrap();
    assert_eq!(history.len(), 2);
    // Delivery is at-least-once.
    assert_eq!(harness.replies().await.len(), 2);
}

#[tokio::test]
async fn delivery_failure_fails_the_turn_and_commits_nothing() {
    let harness = TestHarness::new().await.unwrap();
    harness.mock_channel.fail_always(503);

    let err = harness.send_text(1, "/feedback").await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(
        harness.mock_channel.attempts(),
        harness.config.llm.retry_max_attempts
    );
    assert!(harness.storage.load_state(TEST_CHAT_ID).await.unwrap().is_none());
    let summary = harness.storage.flow_summary(Funnel::Feedback).await.unwrap();
    assert_eq!(summary.started, 0);

    harness.mock_channel.recover();
    harness.send_text(1, "/feedback").await.unwrap();
    let summary = harness.storage.flow_summary(Funnel::Feedback).await.unwrap();
    assert_eq!(summary.started, 1);
}

#[tokio::test]
async fn transient_delivery_failure_is_retried_locally() {
    let harness = TestHarness::new().await.unwrap();
    harness.mock_channel.fail_next(1);

    let reply = harness.send_text(1, "/help").await.unwrap();
    assert_eq!(reply, prompts::HELP);
    assert_eq!(harness.mock_channel.attempts(), 2);
    assert_eq!(harness.replies().await, vec![prompts::HELP.to_string()]);
}

#[tokio::test]
async fn mode_recommendation_switches_mode() {
    let harness = TestHarness::new().await.unwrap();

    let reply = harness.send_text(1, "/recommend").await.unwrap();
    assert_eq!(reply, prompts::RECOMMEND_PROMPT);

    let reply = harness
        .send_text(2, "I keep procrastinating, push me and hold me accountable")
        .await
        .unwrap();
    assert!(reply.contains("challenging"));

    let state = harness.storage.load_state(TEST_CHAT_ID).await.unwrap().unwrap();
    assert_eq!(state.coach_mode, CoachMode::Challenging);
    assert_eq!(state.state(), ConversationState::Idle);

    let summary = harness
        .storage
        .flow_summary(Funnel::ModeRecommendation)
        .await
        .unwrap();
    assert_eq!((summary.started, summary.completed), (1, 1));
}

#[tokio::test]
async fn mode_command_changes_generation_prompt() {
    let harness = TestHarness::new().await.unwrap();

    let reply = harness.send_text(1, "/mode strategic").await.unwrap();
    assert_eq!(reply, prompts::mode_switched(CoachMode::Strategic));

    harness.send_text(2, "what next?").await.unwrap();
    let requests = harness.mock_provider.requests().await;
    let system = requests[0].system_prompt.clone().unwrap_or_default();
    assert!(system.contains("strategic"));

    let reply = harness.send_text(3, "/mode gentle").await.unwrap();
    assert_eq!(reply, prompts::unknown_mode("gentle"));
    let state = harness.storage.load_state(TEST_CHAT_ID).await.unwrap().unwrap();
    assert_eq!(state.coach_mode, CoachMode::Strategic);
}

#[tokio::test]
async fn new_users_start_in_configured_mode() {
    let harness = TestHarness::builder()
        .with_config(|c| c.conversation.default_mode = "supportive".into())
        .build()
        .await
        .unwrap();

    harness.send_text(1, "/start").await.unwrap();
    let state = harness.storage.load_state(TEST_CHAT_ID).await.unwrap().unwrap();
    assert_eq!(state.coach_mode, CoachMode::Supportive);
    assert_eq!(harness.replies().await, vec![prompts::WELCOME.to_string()]);
}

#[tokio::test]
async fn voice_messages_are_transcribed_first() {
    let harness = TestHarness::builder()
        .with_transcriber(MockTranscriber::returning("  I feel stuck at work  "))
        .build()
        .await
        .unwrap();
    harness.mock_channel.add_file("voice-1", vec![1, 2, 3]).await;

    let outcome = harness
        .process(&TestHarness::voice_message(1, "voice-1"))
        .await
        .unwrap();
    assert!(matches!(outcome, TurnOutcome::Replied { intent: "message", .. }));

    let transcriber = harness.mock_transcriber.as_ref().unwrap();
    let requests = transcriber.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].data, vec![1, 2, 3]);
    assert_eq!(requests[0].file_name, "voice.ogg");

    let history = harness.storage.recent_history(TEST_CHAT_ID, 10).await.unwrap();
    assert_eq!(history[0].content, "I feel stuck at work");
}

#[tokio::test]
async fn voice_commands_drive_the_state_machine() {
    let harness = TestHarness::builder()
        .with_transcriber(MockTranscriber::returning("/feedback"))
        .build()
        .await
        .unwrap();
    harness.mock_channel.add_file("voice-1", vec![0]).await;

    harness
        .process(&TestHarness::voice_message(1, "voice-1"))
        .await
        .unwrap();
    let state = harness.storage.load_state(TEST_CHAT_ID).await.unwrap().unwrap();
    assert_eq!(state.state(), ConversationState::AwaitingFeedback);
}

#[tokio::test]
async fn failed_transcription_sends_notice_and_commits_nothing() {
    let harness = TestHarness::builder()
        .with_transcriber(MockTranscriber::failing(ScriptedReply::Status(400)))
        .build()
        .await
        .unwrap();
    harness.mock_channel.add_file("voice-1", vec![1]).await;

    let outcome = harness
        .process(&TestHarness::voice_message(1, "voice-1"))
        .await
        .unwrap();
    assert_eq!(outcome, TurnOutcome::TranscriptionFailed);
    assert_eq!(
        harness.replies().await,
        vec![harness.config.conversation.transcription_failure_reply.clone()]
    );
    assert!(harness.storage.load_state(TEST_CHAT_ID).await.unwrap().is_none());
    assert_eq!(harness.mock_provider.call_count().await, 0);
}

#[tokio::test]
async fn voice_without_transcriber_gets_notice() {
    let harness = TestHarness::new().await.unwrap();
    let outcome = harness
        .process(&TestHarness::voice_message(1, "voice-1"))
        .await
        .unwrap();
    assert_eq!(outcome, TurnOutcome::TranscriptionFailed);
}

#[tokio::test]
async fn blank_messages_are_skipped() {
    let harness = TestHarness::new().await.unwrap();
    let outcome = harness
        .process(&TestHarness::text_message(1, "   "))
        .await
        .unwrap();
    assert_eq!(outcome, TurnOutcome::Skipped);
    assert_eq!(harness.mock_channel.attempts(), 0);
}

#[tokio::test]
async fn undecodable_job_payload_is_terminal() {
    let harness = TestHarness::new().await.unwrap();
    let queue = harness.config.queue.name.clone();
    let job = NewJob {
        queue_name: queue.clone(),
        group_key: "1".into(),
        payload: "not json".into(),
        max_attempts: 3,
    };
    harness.storage.enqueue(job, now_ms()).await.unwrap();
    let job = harness
        .storage
        .dequeue(&queue, now_ms(), 60_000)
        .await
        .unwrap()
        .unwrap();

    let err = harness
        .engine
        .handle(&job, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(!parley_resilience::classify(&err).is_retryable());
}
