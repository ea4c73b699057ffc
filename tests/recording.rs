//! Recording lifecycle integration tests
//!
//! Runs on paused time so listening timeouts resolve instantly

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use harvest_assistant::config::Phrases;
use harvest_assistant::conversation::Role;
use harvest_assistant::llm::Completion;
use harvest_assistant::voice::{ControllerState, RecordingOutcome, RecordingStatus};
use harvest_assistant::{Error, Message, SessionSettings, TurnOutcome};

mod common;

use common::{FakeMicrophone, FakeTranscriber, Harness, ScriptedCompletion};

fn ephemerals(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .filter(|m| m.is_ephemeral())
        .filter_map(|m| m.content().map(ToString::to_string))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_recording_stops_at_timeout() {
    let harness = Harness::new(ScriptedCompletion::new(vec![Ok(Completion::text(
        "Here are today's tomatoes.",
    ))]))
    .with_transcriber(FakeTranscriber::new(vec![Ok("show tomatoes".to_string())]));
    let session = harness.session(SessionSettings::default());

    let started = Instant::now();
    let outcome = session.record_with(Duration::from_secs(5)).await;
    assert_eq!(outcome, RecordingOutcome::Submitted(TurnOutcome::Replied));

    let calls = harness.transcriber.calls();
    assert_eq!(calls.len(), 1);
    let waited = calls[0].at - started;
    assert!(waited >= Duration::from_secs(5), "stopped after {waited:?}");
    assert!(waited < Duration::from_secs(6), "stopped after {waited:?}");
    assert_eq!(calls[0].language, "en");

    let messages = session.messages();
    assert!(ephemerals(&messages).is_empty());
    assert_eq!(messages[1], Message::user("show tomatoes"));
    assert_eq!(messages[2].content(), Some("Here are today's tomatoes."));
    assert_eq!(session.recording_state(), ControllerState::Idle);
    assert_eq!(session.recording_session().status, RecordingStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_listening_status_counts_seconds() {
    let harness = Harness::new(ScriptedCompletion::default());
    let session = Arc::new(harness.session(SessionSettings::default()));

    let recording = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.record_with(Duration::from_secs(10)).await }
    });

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(session.recording_state(), ControllerState::Listening);
    let snapshot = session.recording_session();
    assert_eq!(snapshot.status, RecordingStatus::Listening);
    assert_eq!(snapshot.elapsed_seconds, 2);

    let messages = session.messages();
    assert_eq!(ephemerals(&messages), vec![Phrases::default().listening_for(2)]);
    assert!(messages.last().unwrap().is_ephemeral());

    assert!(session.stop_recording());
    assert_eq!(session.recording_state(), ControllerState::Stopping);
    assert!(!session.stop_recording());

    // Blank transcript from the default fake
    assert_eq!(recording.await.unwrap(), RecordingOutcome::NothingHeard);
}

#[tokio::test(start_paused = true)]
async fn test_new_recording_cancels_previous() {
    let harness = Harness::new(ScriptedCompletion::new(vec![Ok(Completion::text("Okay."))]))
        .with_transcriber(FakeTranscriber::new(vec![Ok("second attempt".to_string())]));
    let session = Arc::new(harness.session(SessionSettings::default()));

    let first = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.record_with(Duration::from_secs(10)).await }
    });
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let second = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.record_with(Duration::from_secs(10)).await }
    });

    assert_eq!(first.await.unwrap(), RecordingOutcome::Cancelled);
    assert_eq!(harness.microphone.discarded(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(session.stop_recording());
    assert_eq!(
        second.await.unwrap(),
        RecordingOutcome::Submitted(TurnOutcome::Replied)
    );

    // Only the second capture was transcribed
    let calls = harness.transcriber.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].audio, vec![2; 4]);
    assert_eq!(harness.microphone.opened(), 2);

    let users: Vec<_> = session
        .messages()
        .into_iter()
        .filter(|m| m.role() == Some(Role::User))
        .collect();
    assert_eq!(users, vec![Message::user("second attempt")]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_transcript_skips_completion() {
    let harness = Harness::new(ScriptedCompletion::default())
        .with_transcriber(FakeTranscriber::new(vec![Ok("   ".to_string())]));
    let session = harness.session(SessionSettings::default());

    let outcome = session.record_with(Duration::from_secs(3)).await;
    assert_eq!(outcome, RecordingOutcome::NothingHeard);

    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content(), Some(Phrases::default().didnt_catch.as_str()));
    assert_eq!(harness.completion.request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transcript_during_turn_asks_to_repeat() {
    let gate = Arc::new(Notify::new());
    let harness = Harness::new(ScriptedCompletion::gated(
        vec![Ok(Completion::text("Prices are steady today."))],
        Arc::clone(&gate),
    ))
    .with_transcriber(FakeTranscriber::new(vec![Ok("sell my wheat".to_string())]));
    let session = Arc::new(harness.session(SessionSettings::default()));

    let turn = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.submit_user_input("what are onion prices").await }
    });
    while harness.completion.request_count() == 0 {
        tokio::task::yield_now().await;
    }

    let outcome = session.record_with(Duration::from_secs(1)).await;
    assert_eq!(outcome, RecordingOutcome::Busy("sell my wheat".to_string()));

    let messages = session.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(
        messages.last().unwrap().content(),
        Some(Phrases::default().busy.as_str())
    );
    assert!(!messages.iter().any(|m| m.content() == Some("sell my wheat")));
    assert!(ephemerals(&messages).is_empty());
    assert_eq!(session.recording_session().status, RecordingStatus::Completed);

    gate.notify_one();
    assert_eq!(turn.await.unwrap(), TurnOutcome::Replied);
    assert_eq!(
        session.messages().last().unwrap().content(),
        Some("Prices are steady today.")
    );
    assert_eq!(harness.completion.request_count(), 1);
}

#[tokio::test]
async fn test_stop_when_idle_does_nothing() {
    let harness = Harness::new(ScriptedCompletion::default());
    let session = harness.session(SessionSettings::default());

    let before = session.messages();
    assert!(!session.stop_recording());
    assert_eq!(session.messages(), before);
    assert_eq!(session.recording_state(), ControllerState::Idle);
}

#[tokio::test]
async fn test_microphone_denied() {
    let harness = Harness::new(ScriptedCompletion::default())
        .with_microphone(FakeMicrophone::denied());
    let session = harness.session(SessionSettings::default());

    let outcome = session.record().await;
    assert!(matches!(outcome, RecordingOutcome::PermissionDenied(_)));

    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(
        messages[1].content(),
        Some(Phrases::default().microphone_unavailable.as_str())
    );
    assert!(ephemerals(&messages).is_empty());
    assert_eq!(session.recording_state(), ControllerState::Idle);
    assert_eq!(session.recording_session().status, RecordingStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn test_transcription_failure_is_reported() {
    let harness = Harness::new(ScriptedCompletion::default()).with_transcriber(
        FakeTranscriber::new(vec![Err(Error::Transcription("HTTP 503".to_string()))]),
    );
    let session = harness.session(SessionSettings::default());

    let outcome = session.record_with(Duration::from_secs(2)).await;
    assert!(matches!(outcome, RecordingOutcome::TranscriptionFailed(_)));

    let messages = session.messages();
    assert_eq!(
        messages.last().unwrap().content(),
        Some(Phrases::default().transcription_failed.as_str())
    );
    assert!(ephemerals(&messages).is_empty());
    assert_eq!(harness.completion.request_count(), 0);
    assert_eq!(session.recording_session().status, RecordingStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn test_close_discards_recording() {
    let harness = Harness::new(ScriptedCompletion::default());
    let session = Arc::new(harness.session(SessionSettings::default()));

    let recording = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.record_with(Duration::from_secs(10)).await }
    });
    tokio::time::sleep(Duration::from_millis(500)).await;

    session.close();
    assert_eq!(recording.await.unwrap(), RecordingOutcome::Cancelled);
    assert!(harness.transcriber.calls().is_empty());
    assert_eq!(harness.microphone.discarded(), 1);
    assert!(ephemerals(&session.messages()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_transcript_uses_active_language() {
    let harness = Harness::new(ScriptedCompletion::new(vec![Ok(Completion::text("ठीक है"))]))
        .with_transcriber(FakeTranscriber::new(vec![Ok("टमाटर".to_string())]));
    let session = harness.session(SessionSettings::default());

    let marathi = harvest_assistant::voice::LanguageProfile::builtin("mr").unwrap();
    session.set_language(marathi);

    session.record_with(Duration::from_secs(1)).await;

    let calls = harness.transcriber.calls();
    assert_eq!(calls[0].language, "mr");
    assert_eq!(session.recording_session().language, "mr");
}
