//! Event bus integration tests: scheduler, log, and hub working together.

use std::sync::Arc;
use std::time::Duration;

use tiller::adapter::{Adapter, ScriptStep, ScriptedAdapter};
use tiller::api::AppState;
use tiller::config::TillerConfig;
use tiller_protocol::{EventPayload, SessionState, TurnItem};

mod common;
use common::{test_app, wait_for_state};

#[tokio::test]
async fn test_push_subscriber_sees_gapless_stream_across_resume() {
    let app = test_app();
    app.adapter
        .push_script(ScriptedAdapter::simple_turn("first"))
        .await;

    app.state
        .scheduler
        .submit("sess_a", "go".to_string(), None)
        .await
        .unwrap();
    wait_for_state(&app, "sess_a", SessionState::AwaitingInput).await;
    let last = app.state.log.last_seq("sess_a").await;

    // Resume from mid-stream while a second turn is appending live.
    let mut sub = app.state.hub.open_push("sess_a", Some(3)).await.unwrap();
    app.adapter
        .push_script(ScriptedAdapter::simple_turn("second"))
        .await;
    app.state
        .scheduler
        .submit("sess_a", "again".to_string(), None)
        .await
        .unwrap();
    wait_for_state(&app, "sess_a", SessionState::AwaitingInput).await;
    let final_seq = app.state.log.last_seq("sess_a").await;
    assert!(final_seq > last);

    let mut expected = 4;
    while expected <= final_seq {
        let event = sub.rx.recv().await.unwrap();
        assert_eq!(event.seq, expected, "push stream must have no gaps");
        expected += 1;
    }
}

#[tokio::test]
async fn test_every_turn_ends_with_exactly_one_done_heartbeat() {
    let app = test_app();

    // Completed, failed, and cancelled turns on the same session.
    app.adapter
        .push_script(ScriptedAdapter::simple_turn("ok"))
        .await;
    app.state
        .scheduler
        .submit("sess_a", "one".to_string(), None)
        .await
        .unwrap();
    wait_for_state(&app, "sess_a", SessionState::AwaitingInput).await;

    app.adapter
        .push_script(vec![ScriptStep::Fail("crash".to_string())])
        .await;
    app.state
        .scheduler
        .submit("sess_a", "two".to_string(), None)
        .await
        .unwrap();
    wait_for_state(&app, "sess_a", SessionState::Error).await;

    app.adapter
        .push_script(vec![ScriptStep::Delay(Duration::from_secs(60))])
        .await;
    app.state
        .scheduler
        .submit("sess_a", "three".to_string(), None)
        .await
        .unwrap();
    app.state.scheduler.stop("sess_a").await.unwrap();
    wait_for_state(&app, "sess_a", SessionState::Stopped).await;

    let events = app.state.log.query("sess_a", 0, None).await.unwrap();
    let done_beats = events
        .iter()
        .filter(|e| matches!(e.payload, EventPayload::Heartbeat { done: true, .. }))
        .count();
    assert_eq!(done_beats, 3);

    // One error event total (from the failed turn only).
    let errors = events
        .iter()
        .filter(|e| matches!(e.payload, EventPayload::Error { .. }))
        .count();
    assert_eq!(errors, 1);

    // Seqs stay gapless through all three teardowns.
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.seq, i as u64 + 1);
    }
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let app = test_app();
    app.adapter
        .push_script(ScriptedAdapter::simple_turn("a"))
        .await;
    app.adapter
        .push_script(ScriptedAdapter::simple_turn("b"))
        .await;

    app.state
        .scheduler
        .submit("sess_a", "go".to_string(), None)
        .await
        .unwrap();
    app.state
        .scheduler
        .submit("sess_b", "go".to_string(), None)
        .await
        .unwrap();
    wait_for_state(&app, "sess_a", SessionState::AwaitingInput).await;
    wait_for_state(&app, "sess_b", SessionState::AwaitingInput).await;

    for session_id in ["sess_a", "sess_b"] {
        let events = app.state.log.query(session_id, 0, None).await.unwrap();
        assert_eq!(events.first().unwrap().seq, 1);
        assert!(events.iter().all(|e| e.session_id == session_id));
    }
}

#[tokio::test]
async fn test_turn_against_fresh_state_uses_adapter_fallback() {
    // No script pushed: the scripted adapter echoes a default turn, which
    // still must satisfy the full event discipline.
    let tmp = tempfile::tempdir().unwrap();
    let config = TillerConfig {
        data_dir: tmp.path().to_path_buf(),
        ..TillerConfig::default()
    };
    let adapter = Arc::new(ScriptedAdapter::new());
    let state = AppState::new(config, adapter as Arc<dyn Adapter>);

    state
        .scheduler
        .submit("sess_a", "ping".to_string(), None)
        .await
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let record = state.registry.get("sess_a").unwrap();
        if record.lock().await.session.state == SessionState::AwaitingInput {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let events = state.log.query("sess_a", 0, None).await.unwrap();
    assert!(events.iter().any(|e| matches!(
        &e.payload,
        EventPayload::Output { text, is_final: true, .. } if text == "done: ping"
    )));
    assert!(
        events
            .iter()
            .any(|e| matches!(e.payload, EventPayload::Heartbeat { done: true, .. }))
    );
}

#[tokio::test]
async fn test_queued_turn_events_follow_first_turn_teardown() {
    let app = test_app();
    app.adapter
        .push_script(vec![
            ScriptStep::Delay(Duration::from_millis(50)),
            ScriptStep::Item(TurnItem::Final {
                text: "first".to_string(),
            }),
        ])
        .await;
    app.adapter
        .push_script(vec![ScriptStep::Item(TurnItem::Final {
            text: "second".to_string(),
        })])
        .await;

    app.state
        .scheduler
        .submit("sess_a", "one".to_string(), None)
        .await
        .unwrap();
    app.state
        .scheduler
        .submit("sess_a", "two".to_string(), None)
        .await
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let events = app.state.log.query("sess_a", 0, None).await.unwrap();
        let done = events
            .iter()
            .filter(|e| matches!(e.payload, EventPayload::Heartbeat { done: true, .. }))
            .count();
        if done == 2 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let events = app.state.log.query("sess_a", 0, None).await.unwrap();
    let first_final = events
        .iter()
        .find(|e| matches!(&e.payload, EventPayload::Output { text, .. } if text == "first"))
        .unwrap()
        .seq;
    let first_done = events
        .iter()
        .find(|e| matches!(e.payload, EventPayload::Heartbeat { done: true, .. }))
        .unwrap()
        .seq;
    let second_final = events
        .iter()
        .find(|e| matches!(&e.payload, EventPayload::Output { text, .. } if text == "second"))
        .unwrap()
        .seq;
    assert!(first_final < first_done);
    assert!(first_done < second_final);
}
