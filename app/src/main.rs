//! Socialink - headless realtime client

use anyhow::Context;
use socialink_core::{ClientConfig, ConnectionEvent};
use socialink_engine::{ChatFeed, FallbackPoller, NotificationBadge};
use socialink_networking::{AppContext, Channel, ChatConnection, ConnectionManager, NotificationConnection};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log every state change of a channel
fn log_connection_events<C: Channel>(manager: &ConnectionManager<C>) {
    manager.add_connection_handler("app-log", |event| match event {
        ConnectionEvent::Connected => tracing::info!(channel = C::NAME, "Channel up"),
        ConnectionEvent::Disconnected(reason) => {
            tracing::info!(channel = C::NAME, %reason, "Channel down")
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine, the environment may already be set
    dotenvy::dotenv().ok();

    let config = ClientConfig::from_env().context("Invalid configuration")?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Socialink client against {}", config.base_url);

    let context = Arc::new(AppContext::from_config(&config).context("Failed to build client")?);

    let notifications =
        NotificationConnection::with_policy(context.clone(), config.notification_policy);
    let chat = ChatConnection::with_policy(context.clone(), config.chat_policy);
    log_connection_events(&notifications);
    log_connection_events(&chat);

    let badge = Arc::new(NotificationBadge::attach(&notifications));
    let feed = Arc::new(ChatFeed::attach(&chat));

    let poll_badge = badge.clone();
    let notification_poller = FallbackPoller::attach(
        &notifications,
        "notification-fallback",
        config.poll_interval,
        move || {
            let badge = poll_badge.clone();
            async move { badge.refresh().await }
        },
    );
    let poll_feed = feed.clone();
    let chat_poller = FallbackPoller::attach(&chat, "chat-fallback", config.poll_interval, move || {
        let feed = poll_feed.clone();
        async move { feed.refresh_unread().await }
    });

    let mut unread = badge.subscribe_unread();
    tokio::spawn(async move {
        while unread.changed().await.is_ok() {
            let count = *unread.borrow_and_update();
            tracing::info!("Unread notifications: {}", count);
        }
    });

    // Seed the badge before the socket takes over
    if let Err(e) = badge.refresh().await {
        tracing::warn!("Initial unread count unavailable: {}", e.user_message());
    }

    tokio::join!(notifications.connect(), chat.connect());
    if context.current_user().is_none() {
        tracing::warn!("No signed-in user; realtime channels stay closed");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");

    notification_poller.detach();
    chat_poller.detach();
    tokio::join!(notifications.disconnect(), chat.disconnect());

    tracing::info!(
        "Closed with {} unread notifications and {} unread messages",
        badge.unread_count(),
        feed.total_unread()
    );
    Ok(())
}
