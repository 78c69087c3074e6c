//! End-to-end bridge tests: a real PTY shell behind a real WebSocket server.
//!
//! Each test boots the full stack on an ephemeral port with a plain shell in
//! place of the multiplexer, then drives it through actual WebSocket clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite;

use pty_session::{SessionActor, SessionConfig};

use crate::config::{BridgeConfig, FileConfig};
use crate::metrics::ServerMetrics;
use crate::registry::ClientRegistry;
use crate::{AppState, bridge, build_router};

type WsClient = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Timeout for each async operation in tests.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Boot the full bridge with /bin/sh as the session command. Returns the
/// bound address and the app state for direct inspection.
async fn start_test_server() -> (SocketAddr, AppState) {
    let mut fc = FileConfig::default();
    fc.server.host = "127.0.0.1".to_string();
    fc.server.port = 0;
    fc.session.command = Some("/bin/sh".to_string());
    fc.session.cols = 80;
    fc.session.rows = 24;
    let config = Arc::new(BridgeConfig::from_file(&fc).expect("config"));

    let session = SessionActor::spawn(SessionConfig {
        command: config.session.command.clone(),
        args: config.session.args.clone(),
        working_dir: None,
        env: Vec::new(),
        cols: config.session.cols,
        rows: config.session.rows,
    })
    .expect("failed to spawn test session");

    let registry = Arc::new(ClientRegistry::new());
    let metrics = Arc::new(ServerMetrics::new());
    bridge::spawn_output_pump(session.subscribe(), registry.clone(), metrics.clone());

    let state = AppState {
        session,
        registry,
        metrics,
        config,
    };

    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("server");
    });

    (addr, state)
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("websocket connect");
    ws
}

/// Collect broadcast bytes until `needle` shows up; returns everything seen.
/// Panics if the deadline passes first.
async fn recv_until(ws: &mut WsClient, needle: &str) -> Vec<u8> {
    let mut collected = Vec::new();
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;

    loop {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .unwrap_or_else(|| {
                panic!(
                    "timed out waiting for {:?}; saw {:?}",
                    needle,
                    String::from_utf8_lossy(&collected)
                )
            });

        match timeout(remaining, ws.next()).await {
            Ok(Some(Ok(tungstenite::Message::Binary(data)))) => {
                collected.extend_from_slice(&data);
            }
            Ok(Some(Ok(tungstenite::Message::Text(text)))) => {
                collected.extend_from_slice(text.as_bytes());
            }
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => panic!("websocket error while waiting for output: {e}"),
            Ok(None) => panic!("websocket closed while waiting for {needle:?}"),
            Err(_) => panic!(
                "timed out waiting for {:?}; saw {:?}",
                needle,
                String::from_utf8_lossy(&collected)
            ),
        }

        if String::from_utf8_lossy(&collected).contains(needle) {
            return collected;
        }
    }
}

async fn send_text(ws: &mut WsClient, text: &str) {
    ws.send(tungstenite::Message::Text(text.to_string().into()))
        .await
        .expect("send text frame");
}

#[tokio::test]
async fn keystrokes_echo_back_to_the_sender() {
    let (addr, _state) = start_test_server().await;
    let mut client = connect(addr).await;

    send_text(&mut client, "echo tide_marker_one\n").await;
    recv_until(&mut client, "tide_marker_one").await;
}

#[tokio::test]
async fn a_second_client_drives_the_same_session() {
    let (addr, _state) = start_test_server().await;
    let mut a = connect(addr).await;

    send_text(&mut a, "echo tide_marker_first\n").await;
    recv_until(&mut a, "tide_marker_first").await;

    // B joins mid-session; its keystrokes land in the same terminal and the
    // resulting output reaches both clients.
    let mut b = connect(addr).await;
    send_text(&mut b, "echo tide_marker_second\n").await;

    recv_until(&mut b, "tide_marker_second").await;
    recv_until(&mut a, "tide_marker_second").await;
}

#[tokio::test]
async fn resize_message_reaches_the_terminal_not_the_shell() {
    let (addr, state) = start_test_server().await;
    let mut client = connect(addr).await;

    send_text(&mut client, r#"{"type":"resize","cols":100,"rows":40}"#).await;

    // The resize is applied asynchronously; poll the session state.
    let mut resized = false;
    for _ in 0..100 {
        let s = state.session.state().await.expect("session state");
        if (s.cols, s.rows) == (100, 40) {
            resized = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(resized, "viewport size was not applied");

    // Nothing from the control message may have been typed into the shell;
    // the terminal would have echoed it back to us if it had been.
    send_text(&mut client, "echo after_resize_marker\n").await;
    let seen = recv_until(&mut client, "after_resize_marker").await;
    assert!(
        !String::from_utf8_lossy(&seen).contains(r#""type":"resize""#),
        "control message leaked into the terminal input"
    );
}

#[tokio::test]
async fn malformed_json_is_typed_into_the_terminal_verbatim() {
    let (addr, state) = start_test_server().await;
    let mut client = connect(addr).await;

    // Not valid JSON: goes straight through as keystrokes, and the terminal
    // echoes it back.
    send_text(&mut client, "{not json").await;
    recv_until(&mut client, "{not json").await;

    let s = state.session.state().await.expect("session state");
    assert_eq!((s.cols, s.rows), (80, 24), "no resize may have happened");
}

#[tokio::test]
async fn binary_frames_are_written_verbatim() {
    let (addr, _state) = start_test_server().await;
    let mut client = connect(addr).await;

    client
        .send(tungstenite::Message::Binary(
            b"echo tide_binary_marker\n".to_vec().into(),
        ))
        .await
        .expect("send binary frame");

    recv_until(&mut client, "tide_binary_marker").await;
}

#[tokio::test]
async fn disconnecting_leaves_the_session_running() {
    let (addr, state) = start_test_server().await;

    let mut client = connect(addr).await;
    send_text(&mut client, "echo tide_marker_alive\n").await;
    recv_until(&mut client, "tide_marker_alive").await;
    client.close(None).await.expect("close");

    // The registry empties out, but the session stays up for the next viewer.
    let mut emptied = false;
    for _ in 0..100 {
        if state.registry.is_empty().await {
            emptied = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(emptied, "client was not unregistered after close");

    let s = state.session.state().await.expect("session state");
    assert!(s.running, "session must outlive its viewers");

    let mut again = connect(addr).await;
    send_text(&mut again, "echo tide_marker_back\n").await;
    recv_until(&mut again, "tide_marker_back").await;
}
