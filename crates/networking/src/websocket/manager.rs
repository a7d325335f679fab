//! Connection manager: one live socket per channel, fanned out to consumers
//!
//! `connect()` resolves the user, then hands off to a supervisor task that
//! owns the socket for its whole life: open, read/write until close, back
//! off, retry. The supervisor is the only place the socket is touched;
//! consumers only see the handler registries and `send()`.

use super::channel::Channel;
use super::registry::HandlerRegistry;
use crate::AppContext;
use futures_util::{SinkExt, StreamExt};
use socialink_core::{ConnectionEvent, ConnectionState, DisconnectReason, ReconnectPolicy};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Close code for a normal, intentional closure
const NORMAL_CLOSURE: u16 = 1000;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Supervisor {
    cancel: CancellationToken,
    /// `None` while `connect()` is still resolving the user
    task: Option<JoinHandle<()>>,
}

struct Shared<C: Channel> {
    context: Arc<AppContext>,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ConnectionState>,
    attempts: AtomicU32,
    message_handlers: HandlerRegistry<C::Inbound>,
    connection_handlers: HandlerRegistry<ConnectionEvent>,
    /// Present only while a session is live
    outbound: std::sync::Mutex<Option<mpsc::UnboundedSender<Message>>>,
    /// Also serializes connect/disconnect
    supervisor: Mutex<Option<Supervisor>>,
    _channel: PhantomData<fn() -> C>,
}

/// Handle to a channel's connection; clones share the same socket
pub struct ConnectionManager<C: Channel> {
    shared: Arc<Shared<C>>,
}

impl<C: Channel> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<C: Channel> ConnectionManager<C> {
    /// Create a manager with the channel's default reconnect policy
    pub fn new(context: Arc<AppContext>) -> Self {
        Self::with_policy(context, C::default_policy())
    }

    pub fn with_policy(context: Arc<AppContext>, policy: ReconnectPolicy) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                context,
                policy,
                state_tx,
                attempts: AtomicU32::new(0),
                message_handlers: HandlerRegistry::new(),
                connection_handlers: HandlerRegistry::new(),
                outbound: std::sync::Mutex::new(None),
                supervisor: Mutex::new(None),
                _channel: PhantomData,
            }),
        }
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.shared.context
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.shared.policy
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Watch connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Reconnect attempts made since the last successful open
    pub fn attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Open the channel.
    ///
    /// No-op while connecting (including a pending retry) or connected.
    /// Returns silently, leaving the channel disconnected, when the current
    /// user cannot be resolved. A `disconnect()` issued while the user is
    /// still being resolved abandons the attempt.
    pub async fn connect(&self) {
        let cancel = {
            let mut supervisor = self.shared.supervisor.lock().await;

            let state = self.state();
            if state != ConnectionState::Disconnected {
                debug!(channel = C::NAME, ?state, "connect() ignored");
                return;
            }

            // A previous supervisor may have finished (max retries, server close)
            if let Some(old) = supervisor.take() {
                old.cancel.cancel();
            }

            let cancel = CancellationToken::new();
            *supervisor = Some(Supervisor {
                cancel: cancel.clone(),
                task: None,
            });
            self.shared.set_state(ConnectionState::Connecting);
            cancel
        };

        // Identity lookup runs without the lock so disconnect() can cut it short
        let resolved = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(channel = C::NAME, "connect() abandoned while resolving user");
                return;
            }
            result = self.shared.context.resolve_user_id() => result,
        };

        let url = resolved.and_then(|user_id| {
            let url = C::socket_url(self.shared.context.ws_base_url(), &user_id)?;
            Ok((url, user_id))
        });

        let mut supervisor = self.shared.supervisor.lock().await;
        if cancel.is_cancelled() {
            return;
        }

        let (url, user_id) = match url {
            Ok(pair) => pair,
            Err(e) => {
                warn!(channel = C::NAME, "Not connecting: {}", e);
                supervisor.take();
                self.shared.set_state(ConnectionState::Disconnected);
                return;
            }
        };

        self.shared.attempts.store(0, Ordering::SeqCst);
        let task = tokio::spawn(run_supervisor(
            self.shared.clone(),
            url.to_string(),
            user_id,
            cancel.clone(),
        ));
        *supervisor = Some(Supervisor {
            cancel,
            task: Some(task),
        });
    }

    /// Close the channel with a normal closure and cancel any pending retry
    pub async fn disconnect(&self) {
        let mut supervisor = self.shared.supervisor.lock().await;

        let Some(Supervisor { cancel, task }) = supervisor.take() else {
            debug!(channel = C::NAME, "disconnect() with nothing running");
            return;
        };

        cancel.cancel();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(channel = C::NAME, "Supervisor task ended abnormally: {}", e);
            }
        }

        self.shared.clear_outbound();
        self.shared.attempts.store(0, Ordering::SeqCst);

        let was = self.shared.set_state(ConnectionState::Disconnected);
        if was != ConnectionState::Disconnected {
            info!(channel = C::NAME, "Disconnected");
            self.shared
                .connection_handlers
                .dispatch(&ConnectionEvent::Disconnected(DisconnectReason::Manual));
        }
    }

    /// Send a message if the socket is open; dropped otherwise.
    ///
    /// Returns whether the message was handed to the socket.
    pub fn send(&self, message: &C::Outbound) -> bool {
        self.shared.send(message)
    }

    /// Register a handler for every inbound message
    pub fn add_message_handler<F>(&self, key: impl Into<String>, handler: F)
    where
        F: Fn(&C::Inbound) + Send + Sync + 'static,
    {
        self.shared.message_handlers.add(key, handler);
    }

    pub fn remove_message_handler(&self, key: &str) -> bool {
        self.shared.message_handlers.remove(key)
    }

    /// Register a handler for every connection-state change
    pub fn add_connection_handler<F>(&self, key: impl Into<String>, handler: F)
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.shared.connection_handlers.add(key, handler);
    }

    pub fn remove_connection_handler(&self, key: &str) -> bool {
        self.shared.connection_handlers.remove(key)
    }

    pub fn has_message_handler(&self, key: &str) -> bool {
        self.shared.message_handlers.contains(key)
    }

    pub fn has_connection_handler(&self, key: &str) -> bool {
        self.shared.connection_handlers.contains(key)
    }
}

impl<C: Channel> Shared<C> {
    /// Returns the previous state
    fn set_state(&self, state: ConnectionState) -> ConnectionState {
        self.state_tx.send_replace(state)
    }

    fn install_outbound(&self, tx: mpsc::UnboundedSender<Message>) {
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
    }

    fn clear_outbound(&self) {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn send(&self, message: &C::Outbound) -> bool {
        let guard = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            debug!(channel = C::NAME, "Socket not open, dropping outbound message");
            return false;
        };

        match serde_json::to_string(message) {
            Ok(json) => tx.send(Message::Text(json)).is_ok(),
            Err(e) => {
                warn!(channel = C::NAME, "Failed to serialize outbound message: {}", e);
                false
            }
        }
    }

    fn dispatch_text(&self, text: &str) {
        match serde_json::from_str::<C::Inbound>(text) {
            Ok(message) => {
                self.message_handlers.dispatch(&message);
            }
            Err(e) => {
                debug!(channel = C::NAME, "Dropping malformed message: {}", e);
            }
        }
    }
}

enum SessionEnd {
    Cancelled,
    Closed(Option<u16>),
}

/// Connect, run the session, back off, retry; until cancelled or out of attempts
async fn run_supervisor<C: Channel>(
    shared: Arc<Shared<C>>,
    url: String,
    user_id: String,
    cancel: CancellationToken,
) {
    loop {
        debug!(channel = C::NAME, "Opening {}", url);

        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            result = tokio_tungstenite::connect_async(url.as_str()) => result,
        };

        match opened {
            Ok((socket, _)) => {
                shared.attempts.store(0, Ordering::SeqCst);

                match run_session(&shared, socket, &user_id, &cancel).await {
                    SessionEnd::Cancelled => return,
                    SessionEnd::Closed(code) => {
                        shared.clear_outbound();
                        let reason = DisconnectReason::Closed { code };

                        if code == Some(NORMAL_CLOSURE) {
                            info!(channel = C::NAME, "Server closed the connection normally");
                            shared.set_state(ConnectionState::Disconnected);
                            shared
                                .connection_handlers
                                .dispatch(&ConnectionEvent::Disconnected(reason));
                            return;
                        }

                        warn!(channel = C::NAME, "Connection lost: {}", reason);
                        shared.set_state(ConnectionState::Connecting);
                        shared
                            .connection_handlers
                            .dispatch(&ConnectionEvent::Disconnected(reason));
                    }
                }
            }
            Err(e) => {
                warn!(channel = C::NAME, "Connection attempt failed: {}", e);
            }
        }

        let attempts = shared.attempts.load(Ordering::SeqCst);
        if attempts >= shared.policy.max_attempts {
            warn!(
                channel = C::NAME,
                "Giving up after {} reconnect attempts", attempts
            );
            shared.set_state(ConnectionState::Disconnected);
            shared
                .connection_handlers
                .dispatch(&ConnectionEvent::Disconnected(DisconnectReason::MaxRetries));
            return;
        }

        let attempt = attempts + 1;
        shared.attempts.store(attempt, Ordering::SeqCst);
        let delay = shared.policy.delay_for(attempt);
        shared.set_state(ConnectionState::Connecting);
        info!(
            channel = C::NAME,
            "Reconnecting in {:?} (attempt {}/{})", delay, attempt, shared.policy.max_attempts
        );

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Pump one open socket until it closes or the supervisor is cancelled
async fn run_session<C: Channel>(
    shared: &Shared<C>,
    socket: Socket,
    user_id: &str,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (mut write, mut read) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    shared.install_outbound(tx);
    shared.set_state(ConnectionState::Connected);
    info!(channel = C::NAME, "Connected");
    shared
        .connection_handlers
        .dispatch(&ConnectionEvent::Connected);

    if let Some(hello) = C::handshake(user_id) {
        shared.send(&hello);
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "".into(),
                };
                if let Err(e) = write.send(Message::Close(Some(frame))).await {
                    debug!(channel = C::NAME, "Close frame not delivered: {}", e);
                }
                return SessionEnd::Cancelled;
            }
            Some(outgoing) = rx.recv() => {
                if let Err(e) = write.send(outgoing).await {
                    debug!(channel = C::NAME, "Write failed: {}", e);
                    return SessionEnd::Closed(None);
                }
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => shared.dispatch_text(&text),
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code));
                    debug!(channel = C::NAME, ?code, "Close frame received");
                    return SessionEnd::Closed(code);
                }
                // Binary, ping, pong
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(channel = C::NAME, "Read failed: {}", e);
                    return SessionEnd::Closed(None);
                }
                None => return SessionEnd::Closed(None),
            }
        }
    }
}
