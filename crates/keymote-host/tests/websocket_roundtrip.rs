//! End-to-end tests over a real WebSocket.
//!
//! Each test binds the accept loop on `127.0.0.1:0`, connects with a
//! tokio-tungstenite client and speaks the JSON protocol exactly like a
//! phone would.

mod common;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use keymote_core::protocol::codec::decode_server_message;
use keymote_core::protocol::messages::ServerMessage;
use keymote_host::application::credentials::MemoryCredentialStore;
use keymote_host::application::router::MessageRouter;
use keymote_host::infrastructure::worker::mock::ScriptedLauncher;
use keymote_host::infrastructure::ws_server::serve;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const PIN: &str = "2468";
const WAIT: Duration = Duration::from_secs(5);

struct Server {
    addr: SocketAddr,
    router: Arc<MessageRouter>,
    launcher: Arc<ScriptedLauncher>,
    running: Arc<AtomicBool>,
}

impl Drop for Server {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

async fn start_server(pin: Option<&str>) -> Server {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let launcher = ScriptedLauncher::ok();
    let router = common::router_with(pin, Arc::new(MemoryCredentialStore::new()), launcher.clone());
    let running = Arc::new(AtomicBool::new(true));
    tokio::spawn(serve(listener, Arc::clone(&router), Arc::clone(&running)));
    Server {
        addr,
        router,
        launcher,
        running,
    }
}

async fn dial(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    client
}

async fn send(client: &mut Client, value: Value) {
    client.send(Message::Text(value.to_string())).await.unwrap();
}

/// Next protocol message, skipping control frames.  `None` once the socket
/// is closed.
async fn next_message(client: &mut Client) -> Option<ServerMessage> {
    loop {
        let frame = timeout(WAIT, client.next()).await.expect("timed out")?;
        match frame {
            Ok(Message::Text(text)) => return Some(decode_server_message(&text).unwrap()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

async fn authenticate(client: &mut Client) {
    assert!(matches!(
        next_message(client).await,
        Some(ServerMessage::Connected {
            auth_required: true,
            ..
        })
    ));
    send(client, json!({"type": "auth", "pin": PIN})).await;
    assert!(matches!(
        next_message(client).await,
        Some(ServerMessage::AuthResult { success: true, .. })
    ));
}

async fn wait_until_disconnected(router: &MessageRouter) {
    timeout(WAIT, async {
        while !router.registry().is_empty().await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("session was not removed");
}

#[tokio::test]
async fn test_pin_auth_then_key_is_acked_over_websocket() {
    // Arrange
    let server = start_server(Some(PIN)).await;
    let mut client = dial(server.addr).await;
    authenticate(&mut client).await;

    // Act
    send(
        &mut client,
        json!({"type": "key", "key": "Enter", "modifiers": {"ctrl": true}, "id": 3}),
    )
    .await;

    // Assert
    assert_eq!(
        next_message(&mut client).await,
        Some(ServerMessage::Ack {
            id: 3,
            success: true
        })
    );
    assert_eq!(server.launcher.commands(), vec!["key,13,ctrl"]);
}

#[tokio::test]
async fn test_input_before_auth_is_rejected_over_websocket() {
    // Arrange
    let server = start_server(Some(PIN)).await;
    let mut client = dial(server.addr).await;
    next_message(&mut client).await;

    // Act
    send(&mut client, json!({"type": "text", "text": "nope"})).await;

    // Assert
    assert_eq!(
        next_message(&mut client).await,
        Some(ServerMessage::not_authenticated())
    );
    assert!(server.launcher.commands().is_empty());
}

#[tokio::test]
async fn test_no_pin_host_authenticates_on_connect() {
    let server = start_server(None).await;
    let mut client = dial(server.addr).await;

    assert!(matches!(
        next_message(&mut client).await,
        Some(ServerMessage::Connected {
            auth_required: false,
            ..
        })
    ));
    send(&mut client, json!({"type": "mouse", "action": "scroll", "delta": 3, "id": 1})).await;

    assert_eq!(
        next_message(&mut client).await,
        Some(ServerMessage::Ack {
            id: 1,
            success: true
        })
    );
    assert_eq!(server.launcher.commands(), vec!["scroll,3"]);
}

#[tokio::test]
async fn test_application_ping_is_echoed() {
    let server = start_server(Some(PIN)).await;
    let mut client = dial(server.addr).await;
    next_message(&mut client).await;

    send(&mut client, json!({"type": "ping", "time": 1234})).await;

    assert_eq!(
        next_message(&mut client).await,
        Some(ServerMessage::Pong { time: 1234 })
    );
}

#[tokio::test]
async fn test_screen_start_streams_frames_to_the_session() {
    // Arrange
    let server = start_server(Some(PIN)).await;
    let mut client = dial(server.addr).await;
    authenticate(&mut client).await;

    // Act
    send(&mut client, json!({"type": "screen", "action": "start"})).await;
    let frame = next_message(&mut client).await;
    send(&mut client, json!({"type": "screen", "action": "stop"})).await;

    // Assert
    match frame {
        Some(ServerMessage::ScreenFrame {
            width,
            height,
            cursor_x,
            cursor_y,
            ..
        }) => assert_eq!((width, height, cursor_x, cursor_y), (4, 3, 1, 2)),
        other => panic!("expected a frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_session_answering_pings_survives_heartbeat() {
    // Arrange
    let server = start_server(Some(PIN)).await;
    let mut client = dial(server.addr).await;
    authenticate(&mut client).await;

    // Act: the first sweep sends a protocol ping; the client's automatic pong
    // is flushed ahead of the next text frame it writes.
    assert_eq!(server.router.heartbeat_sweep().await, 0);
    let ping = timeout(WAIT, client.next()).await.unwrap().unwrap().unwrap();
    send(&mut client, json!({"type": "ping", "time": 1})).await;
    assert_eq!(
        next_message(&mut client).await,
        Some(ServerMessage::Pong { time: 1 })
    );
    let pruned = server.router.heartbeat_sweep().await;

    // Assert
    assert!(matches!(ping, Message::Ping(_)));
    assert_eq!(pruned, 0);
    assert!(server.router.connection_info().await.connected);
}

#[tokio::test]
async fn test_silent_session_is_closed_by_second_sweep() {
    // Arrange
    let server = start_server(Some(PIN)).await;
    let mut client = dial(server.addr).await;
    authenticate(&mut client).await;

    // Act: the client reads nothing between sweeps, so it never answers
    server.router.heartbeat_sweep().await;
    let pruned = server.router.heartbeat_sweep().await;

    // Assert
    assert_eq!(pruned, 1);
    assert!(!server.router.connection_info().await.connected);
    assert_eq!(next_message(&mut client).await, None);
}

#[tokio::test]
async fn test_client_close_removes_session() {
    // Arrange
    let server = start_server(Some(PIN)).await;
    let mut client = dial(server.addr).await;
    authenticate(&mut client).await;
    assert_eq!(server.router.registry().len().await, 1);

    // Act
    client.close(None).await.unwrap();

    // Assert
    wait_until_disconnected(&server.router).await;
    assert!(!server.router.connection_info().await.connected);
}
