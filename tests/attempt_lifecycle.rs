mod common;

use assessment_backend::error::Error;
use assessment_backend::models::attempt::AttemptStatus;
use assessment_backend::models::session::AnswerPayload;
use assessment_backend::services::attempt_service::CreateAttemptInput;
use assessment_backend::stores::{clock_path, session_path, SessionStore};
use chrono::Duration;
use common::{harness, harness_with_sync, mcq, sample_test, t0};
use uuid::Uuid;

fn create_input(test_id: Uuid, student_id: Uuid) -> CreateAttemptInput {
    CreateAttemptInput {
        test_id,
        student_id,
        student_name: "Alice".into(),
        class_id: None,
    }
}

#[tokio::test]
async fn attempt_numbers_increase_and_limit_is_enforced() {
    let h = harness();
    let test = sample_test(10, 2, vec![mcq(1, 5, 0)]);
    let test_id = test.id;
    h.tests.insert(test).await;
    let student = Uuid::new_v4();

    let first = h
        .state
        .attempt_service
        .create_attempt(create_input(test_id, student))
        .await
        .expect("first attempt");
    assert_eq!(first.attempt_number, 1);
    assert_eq!(first.status, AttemptStatus::NotStarted);
    assert_eq!(first.time_remaining, 600);

    // A second attempt is blocked while the first is still active.
    let err = h
        .state
        .attempt_service
        .create_attempt(create_input(test_id, student))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    h.state
        .attempt_service
        .terminate_attempt(first.id)
        .await
        .expect("terminate");

    let second = h
        .state
        .attempt_service
        .create_attempt(create_input(test_id, student))
        .await
        .expect("second attempt");
    assert_eq!(second.attempt_number, 2);

    h.state
        .attempt_service
        .terminate_attempt(second.id)
        .await
        .expect("terminate");

    let err = h
        .state
        .attempt_service
        .create_attempt(create_input(test_id, student))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::AttemptLimitExceeded {
            attempts_allowed: 2
        }
    ));
}

#[tokio::test]
async fn creation_respects_the_availability_window() {
    let h = harness();
    let mut test = sample_test(10, 1, vec![mcq(1, 5, 0)]);
    test.available_until = Some(t0() - Duration::hours(1));
    let test_id = test.id;
    h.tests.insert(test).await;

    let err = h
        .state
        .attempt_service
        .create_attempt(create_input(test_id, Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TestUnavailable(_)));

    let mut inactive = sample_test(10, 1, vec![mcq(1, 5, 0)]);
    inactive.is_active = false;
    let inactive_id = inactive.id;
    h.tests.insert(inactive).await;
    let err = h
        .state
        .attempt_service
        .create_attempt(create_input(inactive_id, Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TestUnavailable(_)));
}

#[tokio::test]
async fn start_is_idempotent_across_reloads() {
    let h = harness();
    let test = sample_test(10, 1, vec![mcq(1, 5, 0)]);
    let test_id = test.id;
    h.tests.insert(test).await;

    let attempt = h
        .state
        .attempt_service
        .create_attempt(create_input(test_id, Uuid::new_v4()))
        .await
        .unwrap();

    let (started, _) = h.state.attempt_service.start_attempt(attempt.id).await.unwrap();
    assert_eq!(started.status, AttemptStatus::InProgress);
    assert_eq!(started.started_at, Some(t0()));
    assert_eq!(started.end_time_ceiling, Some(t0() + Duration::seconds(600)));

    h.clock.advance_secs(5);
    let (again, clock) = h.state.attempt_service.start_attempt(attempt.id).await.unwrap();
    assert_eq!(again.started_at, Some(t0()));
    assert!(clock.is_online);
    // The clock still anchors at the original start.
    assert_eq!(clock.session_start_time, Some(t0()));
}

#[tokio::test]
async fn heartbeats_are_monotonic_and_offline_is_free() {
    let h = harness();
    let test = sample_test(10, 1, vec![mcq(1, 5, 0)]);
    let test_id = test.id;
    h.tests.insert(test).await;
    let attempt = h
        .state
        .attempt_service
        .create_attempt(create_input(test_id, Uuid::new_v4()))
        .await
        .unwrap();
    h.state.attempt_service.start_attempt(attempt.id).await.unwrap();

    let mut last_remaining = 600;
    h.clock.advance_secs(60);
    let check = h
        .state
        .attempt_service
        .update_attempt_time(attempt.id)
        .await
        .unwrap();
    assert_eq!(check.time_spent, 60);
    assert_eq!(check.time_remaining, 540);
    assert!(check.time_remaining <= last_remaining);
    last_remaining = check.time_remaining;

    // Offline neutrality: heartbeats while disconnected change nothing.
    h.state
        .attempt_service
        .handle_disconnection(attempt.id)
        .await
        .unwrap();
    for _ in 0..3 {
        h.clock.advance_secs(100);
        let offline = h
            .state
            .attempt_service
            .update_attempt_time(attempt.id)
            .await
            .unwrap();
        assert_eq!(offline.time_remaining, last_remaining);
        assert_eq!(offline.time_spent, 60);
        assert!(offline.offline_seconds.unwrap() > 0);
    }

    let resumed = h
        .state
        .attempt_service
        .handle_reconnection(attempt.id)
        .await
        .unwrap();
    assert_eq!(resumed.status, AttemptStatus::InProgress);

    h.clock.advance_secs(40);
    let check = h
        .state
        .attempt_service
        .update_attempt_time(attempt.id)
        .await
        .unwrap();
    assert_eq!(check.time_spent, 100);
    assert_eq!(check.time_remaining, 500);
    assert!(check.time_remaining <= last_remaining);
}

#[tokio::test]
async fn expiry_converges_and_auto_submits_exactly_once() {
    let h = harness();
    let test = sample_test(1, 1, vec![mcq(1, 10, 1)]);
    let test_id = test.id;
    h.tests.insert(test).await;
    let attempt = h
        .state
        .attempt_service
        .create_attempt(create_input(test_id, Uuid::new_v4()))
        .await
        .unwrap();
    h.state.attempt_service.start_attempt(attempt.id).await.unwrap();

    h.state
        .session_service
        .save_answer(
            attempt.id,
            1,
            AnswerPayload::Selected { selected_option: 1 },
            15,
            None,
        )
        .await
        .unwrap();

    h.clock.advance_secs(61);
    let check = h
        .state
        .attempt_service
        .update_attempt_time(attempt.id)
        .await
        .unwrap();
    assert!(check.is_expired);
    assert_eq!(check.time_remaining, 0);

    let after = h.state.attempt_service.get_attempt(attempt.id).await.unwrap();
    assert_eq!(after.status, AttemptStatus::AutoSubmitted);
    assert_eq!(after.time_remaining, 0);

    // The pipeline already graded the answers.
    let submission = h
        .state
        .submission_service
        .get_submission(attempt.id)
        .await
        .unwrap();
    assert!(submission.is_auto_submitted);
    assert_eq!(submission.auto_graded_score, 10);

    // Late heartbeats are rejected as terminal, never re-opening the attempt.
    h.clock.advance_secs(10);
    let err = h
        .state
        .attempt_service
        .update_attempt_time(attempt.id)
        .await
        .unwrap_err();
    assert!(err.is_terminal_guard());
    let still = h.state.attempt_service.get_attempt(attempt.id).await.unwrap();
    assert_eq!(still.status, AttemptStatus::AutoSubmitted);
}

#[tokio::test]
async fn ceiling_forces_expiry_even_with_offline_credit() {
    let h = harness();
    let test = sample_test(1, 1, vec![mcq(1, 10, 1)]);
    let test_id = test.id;
    h.tests.insert(test).await;
    let attempt = h
        .state
        .attempt_service
        .create_attempt(create_input(test_id, Uuid::new_v4()))
        .await
        .unwrap();
    h.state.attempt_service.start_attempt(attempt.id).await.unwrap();

    h.clock.advance_secs(10);
    h.state
        .attempt_service
        .handle_disconnection(attempt.id)
        .await
        .unwrap();

    // A long offline stretch is never charged against time_remaining, but
    // the absolute ceiling has passed.
    h.clock.advance_secs(3600);
    let reconnected = h
        .state
        .attempt_service
        .handle_reconnection(attempt.id)
        .await
        .unwrap();
    assert!(reconnected.is_terminal());
    assert_eq!(reconnected.time_remaining, 0);
    // Only the online stretch was ever charged.
    assert_eq!(reconnected.time_spent, 10);
}

#[tokio::test]
async fn sweep_expires_abandoned_attempts() {
    let h = harness();
    let test = sample_test(1, 1, vec![mcq(1, 10, 1)]);
    let test_id = test.id;
    h.tests.insert(test).await;
    let attempt = h
        .state
        .attempt_service
        .create_attempt(create_input(test_id, Uuid::new_v4()))
        .await
        .unwrap();
    h.state.attempt_service.start_attempt(attempt.id).await.unwrap();

    // Client vanished; no heartbeat ever observes the expiry.
    h.clock.advance_secs(120);
    let expired = h.state.attempt_service.sweep_expired().await.unwrap();
    assert_eq!(expired, 1);
    let after = h.state.attempt_service.get_attempt(attempt.id).await.unwrap();
    assert!(after.is_terminal());

    // Sweep is at-least-once safe.
    let expired = h.state.attempt_service.sweep_expired().await.unwrap();
    assert_eq!(expired, 0);
}

#[tokio::test]
async fn heartbeat_resyncs_after_ephemeral_data_loss() {
    let h = harness_with_sync(30);
    let test = sample_test(10, 1, vec![mcq(1, 5, 0)]);
    let test_id = test.id;
    h.tests.insert(test).await;
    let attempt = h
        .state
        .attempt_service
        .create_attempt(create_input(test_id, Uuid::new_v4()))
        .await
        .unwrap();
    h.state.attempt_service.start_attempt(attempt.id).await.unwrap();

    h.clock.advance_secs(10);
    // First heartbeat has no prior sync, so it writes through durably.
    h.state
        .attempt_service
        .update_attempt_time(attempt.id)
        .await
        .unwrap();

    // Ephemeral store loses everything.
    h.sessions.delete(&clock_path(attempt.id)).await.unwrap();
    h.sessions.delete(&session_path(attempt.id)).await.unwrap();

    h.clock.advance_secs(5);
    let check = h
        .state
        .attempt_service
        .update_attempt_time(attempt.id)
        .await
        .expect("resync heartbeat must not fail");
    // Time accounting picks up from the last durable sync.
    assert_eq!(check.time_spent, 10);
    assert_eq!(check.time_remaining, 590);

    h.clock.advance_secs(20);
    let check = h
        .state
        .attempt_service
        .update_attempt_time(attempt.id)
        .await
        .unwrap();
    assert_eq!(check.time_spent, 30);
}

#[tokio::test]
async fn durable_sync_is_batched_between_heartbeats() {
    let h = harness_with_sync(30);
    let test = sample_test(10, 1, vec![mcq(1, 5, 0)]);
    let test_id = test.id;
    h.tests.insert(test).await;
    let attempt = h
        .state
        .attempt_service
        .create_attempt(create_input(test_id, Uuid::new_v4()))
        .await
        .unwrap();
    h.state.attempt_service.start_attempt(attempt.id).await.unwrap();

    h.clock.advance_secs(5);
    h.state
        .attempt_service
        .update_attempt_time(attempt.id)
        .await
        .unwrap();
    let synced = h.state.attempt_service.get_attempt(attempt.id).await.unwrap();
    assert_eq!(synced.time_spent, 5);

    // Beats inside the sync window stay ephemeral-only.
    for _ in 0..10 {
        h.clock.advance_secs(1);
        h.state
            .attempt_service
            .update_attempt_time(attempt.id)
            .await
            .unwrap();
    }
    let durable = h.state.attempt_service.get_attempt(attempt.id).await.unwrap();
    assert_eq!(durable.time_spent, 5);

    // Past the window the durable record catches up.
    h.clock.advance_secs(30);
    h.state
        .attempt_service
        .update_attempt_time(attempt.id)
        .await
        .unwrap();
    let durable = h.state.attempt_service.get_attempt(attempt.id).await.unwrap();
    assert_eq!(durable.time_spent, 45);
}

#[tokio::test]
async fn spurious_reconnect_never_rolls_back_time() {
    let h = harness_with_sync(30);
    let test = sample_test(10, 1, vec![mcq(1, 5, 0)]);
    let test_id = test.id;
    h.tests.insert(test).await;
    let attempt = h
        .state
        .attempt_service
        .create_attempt(create_input(test_id, Uuid::new_v4()))
        .await
        .unwrap();
    h.state.attempt_service.start_attempt(attempt.id).await.unwrap();

    // Durable sync at t=20; the next beat at t=45 stays ephemeral-only.
    h.clock.advance_secs(20);
    h.state
        .attempt_service
        .update_attempt_time(attempt.id)
        .await
        .unwrap();
    h.clock.advance_secs(25);
    let check = h
        .state
        .attempt_service
        .update_attempt_time(attempt.id)
        .await
        .unwrap();
    assert_eq!(check.time_spent, 45);

    // Flaky browser online event: reconnect fires while still in_progress.
    // The unsynced 25 seconds must survive it.
    let reconnected = h
        .state
        .attempt_service
        .handle_reconnection(attempt.id)
        .await
        .unwrap();
    assert_eq!(reconnected.status, AttemptStatus::InProgress);

    h.clock.advance_secs(1);
    let check = h
        .state
        .attempt_service
        .update_attempt_time(attempt.id)
        .await
        .unwrap();
    assert_eq!(check.time_spent, 46);
    assert_eq!(check.time_remaining, 554);
}

#[tokio::test]
async fn starting_a_paused_attempt_past_the_ceiling_expires_it() {
    let h = harness();
    let test = sample_test(1, 1, vec![mcq(1, 10, 1)]);
    let test_id = test.id;
    h.tests.insert(test).await;
    let attempt = h
        .state
        .attempt_service
        .create_attempt(create_input(test_id, Uuid::new_v4()))
        .await
        .unwrap();
    h.state.attempt_service.start_attempt(attempt.id).await.unwrap();

    h.clock.advance_secs(10);
    h.state
        .attempt_service
        .handle_disconnection(attempt.id)
        .await
        .unwrap();

    // The student comes back via the start path long after the ceiling.
    h.clock.advance_secs(3600);
    let err = h
        .state
        .attempt_service
        .start_attempt(attempt.id)
        .await
        .unwrap_err();
    assert!(err.is_terminal_guard());

    let after = h.state.attempt_service.get_attempt(attempt.id).await.unwrap();
    assert!(after.is_terminal());
    // No clock is recreated for the expired attempt; grading archived it.
    assert!(h
        .sessions
        .get(&clock_path(attempt.id))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn server_side_disconnect_hook_freezes_the_clock() {
    let h = harness();
    let test = sample_test(10, 1, vec![mcq(1, 5, 0)]);
    let test_id = test.id;
    h.tests.insert(test).await;
    let attempt = h
        .state
        .attempt_service
        .create_attempt(create_input(test_id, Uuid::new_v4()))
        .await
        .unwrap();
    h.state.attempt_service.start_attempt(attempt.id).await.unwrap();

    h.clock.advance_secs(20);
    // Connection drops without any client call; the registered
    // on-disconnect write flips the clock offline server-side.
    h.sessions.fire_disconnect_writes().await.unwrap();

    let raw = h
        .sessions
        .get(&clock_path(attempt.id))
        .await
        .unwrap()
        .expect("clock still present");
    assert_eq!(raw.get("is_online"), Some(&serde_json::json!(false)));
}

#[tokio::test]
async fn session_updates_are_observable_via_subscribe() {
    let h = harness();
    let test = sample_test(10, 1, vec![mcq(1, 5, 0)]);
    let test_id = test.id;
    h.tests.insert(test).await;
    let attempt = h
        .state
        .attempt_service
        .create_attempt(create_input(test_id, Uuid::new_v4()))
        .await
        .unwrap();
    h.state.attempt_service.start_attempt(attempt.id).await.unwrap();

    let mut updates = h.sessions.subscribe();
    h.state
        .session_service
        .save_answer(
            attempt.id,
            1,
            AnswerPayload::Selected { selected_option: 2 },
            5,
            None,
        )
        .await
        .unwrap();

    let seen = loop {
        let update = updates.recv().await.expect("update stream open");
        if update.path == session_path(attempt.id) {
            break update;
        }
    };
    assert!(seen.value.get("answers").is_some());
}

#[tokio::test]
async fn writes_against_terminal_attempts_are_rejected() {
    let h = harness();
    let test = sample_test(10, 1, vec![mcq(1, 10, 1)]);
    let test_id = test.id;
    h.tests.insert(test).await;
    let attempt = h
        .state
        .attempt_service
        .create_attempt(create_input(test_id, Uuid::new_v4()))
        .await
        .unwrap();
    h.state.attempt_service.start_attempt(attempt.id).await.unwrap();
    h.state
        .session_service
        .save_answer(
            attempt.id,
            1,
            AnswerPayload::Selected { selected_option: 1 },
            5,
            None,
        )
        .await
        .unwrap();
    h.state
        .attempt_service
        .submit_attempt(attempt.id, false)
        .await
        .unwrap();

    let err = h
        .state
        .session_service
        .save_answer(
            attempt.id,
            1,
            AnswerPayload::Selected { selected_option: 0 },
            5,
            None,
        )
        .await
        .unwrap_err();
    assert!(err.is_terminal_guard());

    let err = h
        .state
        .session_service
        .track_suspicious_activity(
            attempt.id,
            assessment_backend::models::session::SuspiciousKind::TabSwitch,
        )
        .await
        .unwrap_err();
    assert!(err.is_terminal_guard());
}

#[tokio::test]
async fn unknown_attempt_ids_surface_not_found() {
    let h = harness();
    let missing = Uuid::new_v4();
    let err = h
        .state
        .attempt_service
        .update_attempt_time(missing)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AttemptNotFound(id) if id == missing));
}
