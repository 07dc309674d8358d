use std::sync::Arc;
use std::time::Duration;
use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::models::{ErrorResponse, Identity, ServerEvent};
use crate::services::auth_service::extract_credential;
use crate::utils::scope_guard::ScopeGuard;
use super::connctx::ConnId;
use super::hub::RoomHub;
use super::router::EventRouter;

#[derive(Deserialize, Debug, Default)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Liveness timing of a connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnTiming {
    /// A connection that shows no transport activity for this long is closed.
    pub idle_timeout: Duration,
    /// How often the server pings so that healthy clients produce activity.
    pub ping_interval: Duration,
}

/// WebSocket handler. The credential is checked before the upgrade; a
/// rejected client never gets a socket.
pub async fn websocket_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let credential = extract_credential(&headers, params.token.as_deref());
    let identity = match state.authenticator.authenticate(credential.as_deref()) {
        Ok(identity) => identity,
        Err(e) => {
            warn!("Rejected WebSocket connection: {}", e);
            return ErrorResponse::reply(StatusCode::UNAUTHORIZED, format!("Authentication error: {}", e))
                .into_response();
        }
    };

    info!("WebSocket connection accepted for {}", identity.id);
    let hub = state.hub.clone();
    let timing = state.timing;
    ws.on_upgrade(move |socket| handle_socket(socket, identity, hub, timing))
}

/// Drive one connection until it closes, errors or idles out.
pub async fn handle_socket(socket: WebSocket, identity: Identity, hub: Arc<RoomHub>, timing: ConnTiming) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let mut router = EventRouter::new(hub.clone());
    let conn_id = match router.activate(identity, tx) {
        Some(conn_id) => conn_id,
        None => return,
    };

    // Backstop for when this future is dropped before `supervise` finishes.
    let cleanup_hub = hub.clone();
    let _cleanup = ScopeGuard::new(move || {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                cleanup_hub.disconnect(conn_id).await;
            });
        }
    });

    // Writer: drains the outbound queue and keeps the transport alive.
    let send_task = tokio::spawn(async move {
        let mut ping = tokio::time::interval(timing.ping_interval);
        ping.tick().await;
        loop {
            tokio::select! {
                next = rx.recv() => {
                    let Some(event) = next else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to serialize event for connection {}: {}", conn_id, e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sender.close().await;
    });

    // Reader: every frame, pongs included, counts as activity.
    let recv_task = tokio::spawn(async move {
        loop {
            let next = match tokio::time::timeout(timing.idle_timeout, receiver.next()).await {
                Ok(next) => next,
                Err(_) => {
                    info!("Connection {} idle for {:?}, closing", conn_id, timing.idle_timeout);
                    break;
                }
            };
            match next {
                Some(Ok(Message::Text(text))) => router.handle_text(&text).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Transport error on connection {}: {}", conn_id, e);
                    break;
                }
            }
        }
        router.close().await;
    });

    supervise(send_task, recv_task, &hub, conn_id).await;
    info!("WebSocket connection {} terminated", conn_id);
}

/// Wait for either half to finish and stop the other. Teardown only starts
/// once the reader has fully stopped, so no join can land after it.
async fn supervise(mut send_task: JoinHandle<()>, mut recv_task: JoinHandle<()>, hub: &RoomHub, conn_id: ConnId) {
    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
            let _ = recv_task.await;
        }
        _ = (&mut recv_task) => send_task.abort(),
    };
    hub.disconnect(conn_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::{api::tests::test_state, create_app};
    use crate::services::auth_service::tests::token_for;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use std::net::SocketAddr;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn serve(timing: ConnTiming) -> (SocketAddr, AppState) {
        let state = test_state(timing);
        let app = create_app(state.clone(), "http://localhost:3000");
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, state)
    }

    async fn connect(addr: SocketAddr, user: &str) -> Client {
        let url = format!("ws://{}/ws?token={}", addr, token_for(user));
        let (client, _) = connect_async(url).await.unwrap();
        client
    }

    async fn send(client: &mut Client, frame: serde_json::Value) {
        client.send(tungstenite::Message::Text(frame.to_string().into())).await.unwrap();
    }

    /// Next server event, skipping control frames.
    async fn next_event(client: &mut Client) -> ServerEvent {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(3), client.next())
                .await
                .expect("timed out waiting for an event")
                .expect("stream ended")
                .expect("transport error");
            if let tungstenite::Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    fn timing(idle_ms: u64, ping_ms: u64) -> ConnTiming {
        ConnTiming {
            idle_timeout: Duration::from_millis(idle_ms),
            ping_interval: Duration::from_millis(ping_ms),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn writer_exit_stops_reader_before_teardown() {
        use crate::ws::connctx::ConnCtx;

        for _ in 0..20 {
            let hub = Arc::new(RoomHub::new());
            let (obs_tx, mut obs_rx) = mpsc::unbounded_channel();
            let observer = ConnCtx::new(Identity { id: "bob".to_string(), display_label: "bob".to_string(), roles: Vec::new() }, obs_tx);
            hub.register(&observer);
            hub.join(&observer, "document:1").await;

            let (tx, _rx) = mpsc::unbounded_channel();
            let conn = ConnCtx::new(Identity { id: "alice".to_string(), display_label: "alice".to_string(), roles: Vec::new() }, tx);
            hub.register(&conn);
            let conn_id = conn.conn_id;
            hub.join(&conn, "document:1").await;

            let reader_hub = hub.clone();
            let recv_task = tokio::spawn(async move {
                loop {
                    reader_hub.join(&conn, "document:1").await;
                    tokio::task::yield_now().await;
                }
            });
            let send_task = tokio::spawn(async {});

            supervise(send_task, recv_task, &hub, conn_id).await;

            assert_eq!(hub.current_members("document:1").await, vec!["bob"]);
            assert!(hub.rooms_of(conn_id).is_empty());
            assert_eq!(hub.stats().connections, 1);
            let mut last = None;
            while let Ok(ev) = obs_rx.try_recv() {
                last = Some(ev);
            }
            assert_eq!(
                last,
                Some(ServerEvent::MemberLeft { identity: "alice".to_string(), document_id: "1".to_string() })
            );
        }
    }

    #[tokio::test]
    async fn rejects_connections_without_valid_credential() {
        let (addr, state) = serve(timing(5_000, 1_000)).await;

        for url in [format!("ws://{}/ws", addr), format!("ws://{}/ws?token=garbage", addr)] {
            match connect_async(url).await {
                Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 401),
                other => panic!("expected HTTP 401, got {:?}", other.map(|_| ())),
            }
        }
        assert_eq!(state.hub.stats().connections, 0);
    }

    #[tokio::test]
    async fn presence_cursor_and_disconnect_over_the_wire() {
        let (addr, state) = serve(timing(5_000, 1_000)).await;
        let mut alice = connect(addr, "alice").await;
        let mut bob = connect(addr, "bob").await;

        send(&mut alice, json!({"event": "join-room", "data": {"documentId": "42"}})).await;
        assert_eq!(
            next_event(&mut alice).await,
            ServerEvent::PresenceUpdate { document_id: "42".to_string(), member_identities: vec!["alice".to_string()] }
        );

        send(&mut bob, json!({"event": "join-room", "data": {"documentId": "42"}})).await;
        assert_eq!(
            next_event(&mut bob).await,
            ServerEvent::PresenceUpdate {
                document_id: "42".to_string(),
                member_identities: vec!["alice".to_string(), "bob".to_string()],
            }
        );
        assert_eq!(
            next_event(&mut alice).await,
            ServerEvent::MemberJoined { identity: "bob".to_string(), document_id: "42".to_string() }
        );

        send(&mut alice, json!({"event": "cursor-update", "data": {"documentId": "42", "x": 5, "y": 9}})).await;
        assert_eq!(
            next_event(&mut bob).await,
            ServerEvent::CursorUpdate { identity: "alice".to_string(), x: json!(5), y: json!(9) }
        );

        bob.close(None).await.unwrap();
        assert_eq!(
            next_event(&mut alice).await,
            ServerEvent::MemberLeft { identity: "bob".to_string(), document_id: "42".to_string() }
        );
        assert_eq!(state.hub.current_members("document:42").await, vec!["alice"]);
    }

    #[tokio::test]
    async fn silent_connection_is_dropped_after_idle_timeout() {
        let (addr, state) = serve(timing(300, 100)).await;
        let mut watcher = connect(addr, "watcher").await;
        let mut silent = connect(addr, "silent").await;

        send(&mut watcher, json!({"event": "join-room", "data": {"documentId": "7"}})).await;
        next_event(&mut watcher).await;
        send(&mut silent, json!({"event": "join-room", "data": {"documentId": "7"}})).await;
        assert!(matches!(next_event(&mut watcher).await, ServerEvent::MemberJoined { .. }));

        // `silent` is never polled again, so it never answers a ping.
        assert_eq!(
            next_event(&mut watcher).await,
            ServerEvent::MemberLeft { identity: "silent".to_string(), document_id: "7".to_string() }
        );
        assert_eq!(state.hub.current_members("document:7").await, vec!["watcher"]);
        drop(silent);
    }
}
