//! Consumers wired to loopback socket and REST servers.

use axum::extract::Path;
use axum::routing::{get, put};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use socialink_core::{ConnectionState, CurrentUser, ReconnectPolicy};
use socialink_engine::{ChatFeed, NotificationBadge};
use socialink_networking::{ApiClient, AppContext, ChatConnection, NotificationConnection};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type ServerSocket = WebSocketStream<TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

async fn spawn_socket_server<F, Fut>(behavior: F) -> SocketAddr
where
    F: Fn(ServerSocket, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let behavior = Arc::new(behavior);
    let counter = Arc::new(AtomicUsize::new(0));

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let behavior = behavior.clone();
            tokio::spawn(async move {
                if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                    behavior(ws, index).await;
                }
            });
        }
    });
    addr
}

async fn serve_rest(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn context_for(addr: SocketAddr) -> Arc<AppContext> {
    let ctx = AppContext::new(ApiClient::new(&format!("http://{}", addr), None).unwrap());
    ctx.set_current_user(CurrentUser {
        id: "17".to_string(),
        username: "mina".to_string(),
        name: None,
        email: None,
        profile_image: None,
        role: None,
    });
    Arc::new(ctx)
}

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy::linear(3, Duration::from_millis(10))
}

async fn next_frame(rx: &mut mpsc::UnboundedReceiver<(usize, Value)>) -> (usize, Value) {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("frame channel closed")
}

async fn wait_until(cond: impl Fn() -> bool) {
    timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}

#[tokio::test]
async fn chat_feed_rejoins_and_reads_in_active_room() {
    let (frames_tx, mut frames) = mpsc::unbounded_channel::<(usize, Value)>();
    let addr = spawn_socket_server(move |mut ws, index| {
        let frames_tx = frames_tx.clone();
        async move {
            while let Some(Ok(msg)) = ws.next().await {
                let Message::Text(text) = msg else { continue };
                let value: Value = serde_json::from_str(&text).unwrap();
                let joined = value["type"] == "JOIN_ROOM";
                let _ = frames_tx.send((index, value));

                if joined && index == 0 {
                    let frame = CloseFrame {
                        code: CloseCode::Error,
                        reason: "restarting".into(),
                    };
                    let _ = ws.close(Some(frame)).await;
                } else if joined {
                    let push = json!({
                        "type": "NEW_MESSAGE",
                        "roomId": 3,
                        "message": {"id": 91, "roomId": 3, "senderId": 8, "content": "hi"}
                    });
                    ws.send(Message::Text(push.to_string().into())).await.unwrap();
                }
            }
        }
    })
    .await;

    let chat = ChatConnection::with_policy(context_for(addr), fast_policy());
    let feed = ChatFeed::attach(&chat);
    // Offline: the join is dropped and replayed once connected
    feed.open_room("3");
    chat.connect().await;

    assert_eq!(
        next_frame(&mut frames).await,
        (0, json!({"type": "JOIN_ROOM", "roomId": "3"}))
    );
    assert_eq!(
        next_frame(&mut frames).await,
        (1, json!({"type": "JOIN_ROOM", "roomId": "3"}))
    );
    assert_eq!(
        next_frame(&mut frames).await,
        (1, json!({"type": "MESSAGE_READ", "roomId": "3", "messageId": "91"}))
    );

    assert_eq!(feed.messages("3").len(), 1);
    assert_eq!(feed.unread_count("3"), 0);

    chat.disconnect().await;
}

#[tokio::test]
async fn chat_feed_switching_rooms_leaves_previous() {
    let (frames_tx, mut frames) = mpsc::unbounded_channel::<(usize, Value)>();
    let addr = spawn_socket_server(move |mut ws, index| {
        let frames_tx = frames_tx.clone();
        async move {
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = frames_tx.send((index, serde_json::from_str(&text).unwrap()));
            }
        }
    })
    .await;

    let chat = ChatConnection::with_policy(context_for(addr), fast_policy());
    let feed = ChatFeed::attach(&chat);
    let mut state = chat.subscribe_state();
    chat.connect().await;
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Connected))
        .await
        .unwrap()
        .unwrap();

    feed.open_room("1");
    feed.open_room("2");
    feed.open_room("2");

    assert_eq!(next_frame(&mut frames).await.1, json!({"type": "JOIN_ROOM", "roomId": "1"}));
    assert_eq!(next_frame(&mut frames).await.1, json!({"type": "LEAVE_ROOM", "roomId": "1"}));
    assert_eq!(next_frame(&mut frames).await.1, json!({"type": "JOIN_ROOM", "roomId": "2"}));

    feed.close_room();
    assert_eq!(next_frame(&mut frames).await.1, json!({"type": "LEAVE_ROOM", "roomId": "2"}));
    assert!(feed.active_room().is_none());

    chat.disconnect().await;
}

#[tokio::test]
async fn badge_marks_read_over_socket() {
    let (frames_tx, mut frames) = mpsc::unbounded_channel::<(usize, Value)>();
    let addr = spawn_socket_server(move |mut ws, index| {
        let frames_tx = frames_tx.clone();
        async move {
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let value: Value = serde_json::from_str(&text).unwrap();
                let hello = value["type"] == "CONNECT";
                let _ = frames_tx.send((index, value));
                if hello {
                    let push = json!({
                        "type": "NOTIFICATION",
                        "notification": {"id": 5, "type": "COMMENT", "message": "jo commented", "isRead": false}
                    });
                    ws.send(Message::Text(push.to_string().into())).await.unwrap();
                }
            }
        }
    })
    .await;

    let notifications = NotificationConnection::with_policy(context_for(addr), fast_policy());
    let badge = NotificationBadge::attach(&notifications);
    notifications.connect().await;

    assert_eq!(
        next_frame(&mut frames).await.1,
        json!({"type": "CONNECT", "recipientId": "17"})
    );
    wait_until(|| badge.unread_count() == 1).await;

    badge.mark_as_read("5").await.unwrap();
    assert_eq!(badge.unread_count(), 0);
    assert_eq!(
        next_frame(&mut frames).await.1,
        json!({"type": "MARK_AS_READ", "notificationId": "5"})
    );

    badge.mark_all_as_read().await.unwrap();
    assert_eq!(
        next_frame(&mut frames).await.1,
        json!({"type": "MARK_ALL_AS_READ", "recipientId": "17"})
    );

    notifications.disconnect().await;
}

#[tokio::test]
async fn consumers_fall_back_to_rest() {
    let marked = Arc::new(Mutex::new(Vec::<String>::new()));
    let seen = marked.clone();
    let router = Router::new()
        .route(
            "/api/notifications/unread-count",
            get(|| async { Json(json!({"count": 6})) }),
        )
        .route(
            "/api/notifications/:id/read",
            put(move |Path(id): Path<String>| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(id);
                    Json(json!({}))
                }
            }),
        )
        .route(
            "/api/chat/rooms/unread",
            get(|| async {
                Json(json!([
                    {"roomId": 1, "unreadCount": 2},
                    {"roomId": 2, "unreadCount": 5},
                    {"roomId": 4, "unreadCount": 0}
                ]))
            }),
        )
        .route(
            "/api/chat/rooms/:id/messages",
            get(|| async {
                Json(json!([
                    {"id": 1, "senderId": 8, "content": "first"},
                    {"id": 2, "senderId": 17, "content": "second"}
                ]))
            }),
        );
    let addr = serve_rest(router).await;
    let ctx = context_for(addr);

    let badge = NotificationBadge::attach(&NotificationConnection::new(ctx.clone()));
    badge.refresh().await.unwrap();
    assert_eq!(badge.unread_count(), 6);

    badge.mark_as_read("42").await.unwrap();
    assert_eq!(marked.lock().unwrap().clone(), vec!["42".to_string()]);

    let feed = ChatFeed::attach(&ChatConnection::new(ctx));
    feed.open_room("2");
    feed.refresh_unread().await.unwrap();
    assert_eq!(feed.unread_count("1"), 2);
    // Active room stays read
    assert_eq!(feed.unread_count("2"), 0);
    assert_eq!(feed.total_unread(), 2);

    feed.load_history("2").await.unwrap();
    let contents: Vec<_> = feed.messages("2").into_iter().map(|m| m.content).collect();
    assert_eq!(contents, vec!["first", "second"]);
}
