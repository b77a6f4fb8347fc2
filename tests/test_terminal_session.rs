// ABOUTME: Behavior tests for the terminal session lifecycle and relay frame handling
// Drives a session through an in-memory transport and checks wire traffic and screen output

mod common;

use common::{Call, FakeConnector};
use indirex_term::identity::StaticIdentity;
use indirex_term::terminal::{
    ClientFrame, ConnectionId, ConnectionState, TerminalEmulator, TerminalSession, TransportEvent,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

type TestSession = TerminalSession<FakeConnector, TerminalEmulator>;

fn new_session(connector: &FakeConnector, identity: StaticIdentity) -> TestSession {
    TerminalSession::new(
        "ws://relay.test/ssh",
        connector.clone(),
        TerminalEmulator::new(24, 80),
        Arc::new(identity),
    )
}

/// Open a session and complete the handshake, returning the live connection id
fn connected_session(connector: &FakeConnector) -> (TestSession, ConnectionId) {
    let mut session = new_session(connector, StaticIdentity::anonymous());
    session.open("MTR-0042", 22).unwrap();
    let id = session.connection_id().unwrap();
    connector.mark_open(id);
    session.handle_event(id, TransportEvent::Opened);
    session.handle_event(id, TransportEvent::Message(r#"{"type":"connected"}"#.to_string()));
    assert_eq!(session.state(), ConnectionState::Connected);
    (session, id)
}

fn output(data: &str) -> TransportEvent {
    TransportEvent::Message(serde_json::json!({ "type": "output", "data": data }).to_string())
}

#[test]
fn test_handshake_frames() {
    let connector = FakeConnector::new();
    let mut session = new_session(&connector, StaticIdentity::new("field-tech"));

    session.open("MTR-0042", 2222).unwrap();
    assert_eq!(session.state(), ConnectionState::Connecting);

    let id = session.connection_id().unwrap();
    connector.mark_open(id);
    session.handle_event(id, TransportEvent::Opened);

    assert_eq!(
        connector.frames(id),
        vec![
            ClientFrame::connect("MTR-0042", 2222, Some("field-tech".to_string())),
            ClientFrame::resize(24, 80),
        ]
    );
}

#[test]
fn test_connect_frame_omits_missing_identity() {
    let connector = FakeConnector::new();
    let (_session, id) = connected_session(&connector);

    assert_eq!(connector.frames(id)[0], ClientFrame::connect("MTR-0042", 22, None));
    let raw = connector
        .calls()
        .into_iter()
        .find_map(|call| match call {
            Call::Send(_, text) if text.contains("connect") => Some(text),
            _ => None,
        })
        .unwrap();
    assert!(!raw.contains("userId"));
}

#[test]
fn test_input_and_resize_are_forwarded_while_connected() {
    let connector = FakeConnector::new();
    let (mut session, id) = connected_session(&connector);

    session.send_input("uptime\r");
    session.resize(50, 132);

    let frames = connector.frames(id);
    assert_eq!(
        &frames[2..],
        &[ClientFrame::input("uptime\r"), ClientFrame::resize(50, 132)]
    );
}

#[test]
fn test_close_is_idempotent_and_stops_forwarding() {
    // BEHAVIOR: after close, nothing but the single disconnect reaches the socket
    let connector = FakeConnector::new();
    let (mut session, id) = connected_session(&connector);
    let sent_before_close = connector.frames(id).len();

    session.close();
    session.close();
    session.send_input("reboot\r");
    session.resize(10, 10);
    session.close();
    drop(session);

    let frames = connector.frames(id);
    assert_eq!(&frames[sent_before_close..], &[ClientFrame::Disconnect]);

    let closes = connector
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::Close(_)))
        .count();
    assert_eq!(closes, 1);
}

#[test]
fn test_close_before_open_completes() {
    let connector = FakeConnector::new();
    let mut session = new_session(&connector, StaticIdentity::anonymous());
    session.open("MTR-0042", 22).unwrap();
    let id = session.connection_id().unwrap();

    session.close();

    // Socket never opened, so no disconnect frame is attempted
    assert_eq!(connector.calls(), vec![Call::Connect(id), Call::Close(id)]);
    assert_eq!(session.state(), ConnectionState::Disconnected);

    // A late open event for the released socket is ignored
    connector.mark_open(id);
    session.handle_event(id, TransportEvent::Opened);
    assert!(connector.frames(id).is_empty());
}

#[test]
fn test_output_concatenates_in_arrival_order() {
    let connector = FakeConnector::new();

    let (mut per_char, id) = connected_session(&connector);
    let before = per_char.screen().transcript().len();
    for chunk in ["A", "B", "C"] {
        per_char.handle_event(id, output(chunk));
    }

    let (mut merged, merged_id) = connected_session(&connector);
    merged.handle_event(merged_id, output("AB"));
    merged.handle_event(merged_id, output("C"));

    assert_eq!(&per_char.screen().transcript()[before..], "ABC");
    assert_eq!(
        per_char.screen().transcript(),
        merged.screen().transcript()
    );
}

#[test]
fn test_first_output_marks_connected() {
    let connector = FakeConnector::new();
    let mut session = new_session(&connector, StaticIdentity::anonymous());
    session.open("MTR-0042", 22).unwrap();
    let id = session.connection_id().unwrap();
    connector.mark_open(id);
    session.handle_event(id, TransportEvent::Opened);

    session.handle_event(id, output("login: "));
    assert_eq!(session.state(), ConnectionState::Connected);
    assert!(session.screen().contents().contains("login:"));
}

#[test]
fn test_input_dropped_when_disconnected_or_errored() {
    let connector = FakeConnector::new();

    let (mut errored, errored_id) = connected_session(&connector);
    errored.handle_event(
        errored_id,
        TransportEvent::Message(r#"{"type":"error","error":"meter unreachable"}"#.to_string()),
    );
    assert_eq!(errored.state(), ConnectionState::Errored);
    assert_eq!(errored.last_error(), Some("meter unreachable"));
    let sent = connector.frames(errored_id).len();
    errored.send_input("ls\r");
    errored.resize(30, 90);
    assert_eq!(connector.frames(errored_id).len(), sent);
    assert!(errored.screen().transcript().contains("Error: meter unreachable"));

    let (mut disconnected, disconnected_id) = connected_session(&connector);
    disconnected.handle_event(
        disconnected_id,
        TransportEvent::Message(r#"{"type":"disconnected"}"#.to_string()),
    );
    let sent = connector.frames(disconnected_id).len();
    disconnected.send_input("ls\r");
    assert_eq!(connector.frames(disconnected_id).len(), sent);
}

#[test]
fn test_unframed_message_rendered_verbatim() {
    let connector = FakeConnector::new();
    let (mut session, id) = connected_session(&connector);

    session.handle_event(id, TransportEvent::Message("BusyBox v1.36 built-in shell\r\n".to_string()));
    session.handle_event(id, TransportEvent::Message("{not json".to_string()));
    session.handle_event(id, TransportEvent::Binary(b"# ".to_vec()));

    let transcript = session.screen().transcript();
    assert!(transcript.ends_with("BusyBox v1.36 built-in shell\r\n{not json# "));
    assert_eq!(session.state(), ConnectionState::Connected);
}

#[test]
fn test_repeated_disconnected_frames_append_one_line() {
    let connector = FakeConnector::new();
    let (mut session, id) = connected_session(&connector);

    for _ in 0..3 {
        session.handle_event(id, TransportEvent::Message(r#"{"type":"disconnected"}"#.to_string()));
    }

    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(session.screen().transcript().matches("[Disconnected]").count(), 1);
}

#[test]
fn test_finished_state_is_final() {
    // BEHAVIOR: once errored, later relay frames neither change the state nor add lines
    let connector = FakeConnector::new();
    let (mut session, id) = connected_session(&connector);

    for frame in [
        r#"{"type":"error","error":"meter unreachable"}"#,
        r#"{"type":"disconnected"}"#,
        r#"{"type":"error","error":"again"}"#,
        r#"{"type":"connected"}"#,
    ] {
        session.handle_event(id, TransportEvent::Message(frame.to_string()));
        assert_eq!(session.state(), ConnectionState::Errored);
    }
    session.handle_event(id, TransportEvent::Error("socket reset".to_string()));

    let transcript = session.screen().transcript();
    assert_eq!(session.state(), ConnectionState::Errored);
    assert_eq!(session.last_error(), Some("meter unreachable"));
    assert_eq!(transcript.matches("[Error:").count(), 1);
    assert!(!transcript.contains("[Disconnected]"));
}

#[test]
fn test_disconnected_state_is_final() {
    let connector = FakeConnector::new();
    let (mut session, id) = connected_session(&connector);

    session.handle_event(id, TransportEvent::Message(r#"{"type":"disconnected"}"#.to_string()));
    session.handle_event(id, TransportEvent::Message(r#"{"type":"error","error":"late"}"#.to_string()));
    session.handle_event(id, TransportEvent::Error("socket reset".to_string()));

    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(session.last_error(), None);
    assert!(!session.screen().transcript().contains("Error:"));
}

#[test]
fn test_repeated_connected_frames_append_one_line() {
    let connector = FakeConnector::new();
    let (mut session, id) = connected_session(&connector);

    session.handle_event(id, TransportEvent::Message(r#"{"type":"connected"}"#.to_string()));

    assert_eq!(
        session.screen().transcript().matches("[Connected to MTR-0042:22]").count(),
        1
    );
}

#[test]
fn test_open_twice_supersedes_previous_socket() {
    let connector = FakeConnector::new();
    let (mut session, first) = connected_session(&connector);

    session.open("MTR-0042", 22).unwrap();
    let second = session.connection_id().unwrap();
    assert_ne!(first, second);

    // The first socket is closed before the second is created
    let calls = connector.calls();
    let close_first = calls.iter().position(|c| *c == Call::Close(first)).unwrap();
    let connect_second = calls.iter().position(|c| *c == Call::Connect(second)).unwrap();
    assert!(close_first < connect_second);
    assert_eq!(session.state(), ConnectionState::Connecting);

    // Traffic from the superseded socket no longer reaches the screen
    let transcript_len = session.screen().transcript().len();
    session.handle_event(first, output("stale"));
    session.handle_event(first, TransportEvent::Closed(None));
    assert_eq!(session.screen().transcript().len(), transcript_len);
    assert_eq!(session.state(), ConnectionState::Connecting);
}

#[test]
fn test_relay_closing_socket_ends_session() {
    let connector = FakeConnector::new();
    let (mut session, id) = connected_session(&connector);

    session.handle_event(id, TransportEvent::Closed(Some("relay shutting down".to_string())));

    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(session.connection_id(), None);
    assert!(session
        .screen()
        .transcript()
        .contains("[Connection closed: relay shutting down]"));
}

#[test]
fn test_transport_error_while_connecting() {
    let connector = FakeConnector::new();
    let mut session = new_session(&connector, StaticIdentity::anonymous());
    session.open("MTR-0042", 22).unwrap();
    let id = session.connection_id().unwrap();

    session.handle_event(id, TransportEvent::Error("Connection timed out after 10 seconds".to_string()));

    assert_eq!(session.state(), ConnectionState::Errored);
    assert_eq!(connector.calls().last(), Some(&Call::Close(id)));
    assert!(session
        .screen()
        .transcript()
        .contains("Error: Connection timed out after 10 seconds"));
}

#[test]
fn test_refused_connection_is_reported() {
    let connector = FakeConnector::new();
    connector.refuse_connections();
    let mut session = new_session(&connector, StaticIdentity::anonymous());

    assert!(session.open("MTR-0042", 22).is_err());
    assert_eq!(session.state(), ConnectionState::Errored);
    assert!(session.screen().transcript().contains("connection refused"));

    // Still safe to tear down
    session.close();
    session.close();
}
