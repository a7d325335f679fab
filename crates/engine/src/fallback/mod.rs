//! REST polling for channels whose socket gave up
//!
//! Registered as a connection handler: when the manager reports
//! `max_retries` a polling loop starts, and the next successful open (or a
//! manual disconnect) stops it.

use socialink_core::{ConnectionEvent, DisconnectReason, Result};
use socialink_networking::{Channel, ConnectionManager};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type Slot = Arc<Mutex<Option<CancellationToken>>>;

/// Polling fallback bound to one channel
pub struct FallbackPoller<C: Channel> {
    manager: ConnectionManager<C>,
    key: String,
    slot: Slot,
}

impl<C: Channel> FallbackPoller<C> {
    /// Register on `manager` under `key`; `poll` runs every `interval`
    /// (first run immediately) while the socket is given up on.
    pub fn attach<F, Fut>(
        manager: &ConnectionManager<C>,
        key: impl Into<String>,
        interval: Duration,
        poll: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let key = key.into();
        let slot: Slot = Arc::new(Mutex::new(None));
        let poll = Arc::new(poll);

        let handler_slot = slot.clone();
        let handler_key = key.clone();
        manager.add_connection_handler(key.clone(), move |event| match event {
            ConnectionEvent::Disconnected(DisconnectReason::MaxRetries) => {
                start_polling(&handler_slot, &handler_key, interval, poll.clone());
            }
            ConnectionEvent::Connected
            | ConnectionEvent::Disconnected(DisconnectReason::Manual) => {
                stop_polling(&handler_slot, &handler_key);
            }
            // Still retrying
            ConnectionEvent::Disconnected(DisconnectReason::Closed { .. }) => {}
        });

        Self {
            manager: manager.clone(),
            key,
            slot,
        }
    }

    pub fn is_polling(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Stop a running polling loop; it restarts on the next `max_retries`
    pub fn stop(&self) {
        stop_polling(&self.slot, &self.key);
    }

    /// Unregister from the manager and stop polling for good
    pub fn detach(self) {
        self.manager.remove_connection_handler(&self.key);
        self.stop();
    }
}

fn start_polling<F, Fut>(slot: &Slot, key: &str, interval: Duration, poll: Arc<F>)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if guard.is_some() {
        return;
    }

    let cancel = CancellationToken::new();
    *guard = Some(cancel.clone());
    info!(poller = key, "Socket unavailable, polling every {:?}", interval);

    tokio::spawn(poll_loop(key.to_string(), cancel, interval, poll));
}

fn stop_polling(slot: &Slot, key: &str) {
    if let Some(cancel) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
        cancel.cancel();
        info!(poller = key, "Polling stopped");
    }
}

async fn poll_loop<F, Fut>(key: String, cancel: CancellationToken, interval: Duration, poll: Arc<F>)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(poller = %key, "Polling loop exiting");
                return;
            }
            _ = ticker.tick() => {
                if let Err(e) = poll().await {
                    warn!(poller = %key, "Poll failed: {}", e);
                }
            }
        }
    }
}
