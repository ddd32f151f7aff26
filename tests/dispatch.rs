mod support;

use agent_link::{Role, SendStatus, SessionInput};
use pretty_assertions::assert_eq;
use serde_json::json;
use support::{next_frame, Harness};

#[tokio::test]
async fn send_message_echoes_user_turn_then_transmits() {
    let mut harness = Harness::new();
    let mut peer = harness.connect("s1").await;

    assert_eq!(harness.dispatcher.send_message("show revenue"), SendStatus::Sent);
    assert_eq!(
        next_frame(&mut peer).await,
        json!({"type": "message", "content": "show revenue"})
    );

    let snapshot = harness.wait_for_revision(1).await;
    assert_eq!(snapshot.turns.len(), 1);
    assert_eq!(snapshot.turns[0].role, Role::User);
    assert_eq!(snapshot.turns[0].text, "show revenue");
    assert!(!snapshot.turns[0].is_open);
}

#[tokio::test]
async fn code_and_resize_frames_have_no_local_echo() {
    let mut harness = Harness::new();
    let mut peer = harness.connect("s1").await;

    assert_eq!(harness.dispatcher.send_code("df.head()"), SendStatus::Sent);
    assert_eq!(harness.dispatcher.send_resize(40, 120), SendStatus::Sent);

    assert_eq!(
        next_frame(&mut peer).await,
        json!({"type": "run_code", "code": "df.head()"})
    );
    assert_eq!(
        next_frame(&mut peer).await,
        json!({"type": "resize", "rows": 40, "cols": 120})
    );
    assert!(harness.session.snapshot().turns.is_empty());
}

#[tokio::test]
async fn sends_while_disconnected_are_dropped_not_queued() {
    let mut harness = Harness::new();

    assert_eq!(harness.dispatcher.send_message("hello?"), SendStatus::NotConnected);
    assert_eq!(harness.dispatcher.send_code("1 + 1"), SendStatus::NotConnected);
    assert_eq!(harness.dispatcher.send_resize(24, 80), SendStatus::NotConnected);
    assert_eq!(
        harness.connection.send_raw(r#"{"type":"ping"}"#),
        SendStatus::NotConnected
    );

    let mut peer = harness.connect("s1").await;
    assert_eq!(harness.dispatcher.send_code("after"), SendStatus::Sent);
    assert_eq!(
        next_frame(&mut peer).await,
        json!({"type": "run_code", "code": "after"}),
        "nothing sent before connect was buffered"
    );
    assert!(harness.session.snapshot().turns.is_empty());
}

#[tokio::test]
async fn message_after_channel_loss_leaves_no_user_turn() {
    let mut harness = Harness::new();
    let peer = harness.connect("s1").await;
    drop(peer);
    harness
        .wait_for(|snapshot| snapshot.connection_lost.is_some())
        .await;

    assert_eq!(
        harness.dispatcher.send_message("are you there?"),
        SendStatus::NotConnected
    );

    // Inputs are folded in order, so once the marker lands any echo of the
    // dropped message would already be visible.
    assert!(harness
        .session
        .submit(SessionInput::LocalUserMessage("marker".to_string())));
    let snapshot = harness
        .wait_for(|snapshot| snapshot.turns.iter().any(|turn| turn.text == "marker"))
        .await;
    let user_texts: Vec<&str> = snapshot
        .turns
        .iter()
        .filter(|turn| turn.role == Role::User)
        .map(|turn| turn.text.as_str())
        .collect();
    assert_eq!(user_texts, vec!["marker"]);
}

#[tokio::test]
async fn user_echo_does_not_close_streaming_reply() {
    let mut harness = Harness::new();
    let peer = harness.connect("s1").await;

    peer.send_text(r#"{"type":"text","content":"thinking about "}"#);
    harness.wait_for_revision(1).await;
    harness.dispatcher.send_message("also include Q4");
    peer.send_text(r#"{"type":"text_delta","content":"Q3"}"#);

    let snapshot = harness.wait_for_revision(3).await;
    let assistant = snapshot.turns.iter().find(|turn| turn.role == Role::Assistant).expect("assistant turn");
    assert_eq!(assistant.text, "thinking about Q3");
    assert!(assistant.is_open);
    assert_eq!(snapshot.turns.len(), 2);
}
