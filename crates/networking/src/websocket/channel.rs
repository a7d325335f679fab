//! Channel definitions: URL, identity parameter and message vocabulary

use reqwest::Url;
use serde::{de::DeserializeOwned, Serialize};
use socialink_core::{
    config::{default_chat_policy, default_notification_policy},
    ChatCommand, ChatEvent, Error, NotificationCommand, NotificationEvent, ReconnectPolicy, Result,
};

/// One logical WebSocket purpose
pub trait Channel: Send + Sync + 'static {
    /// Server → client envelope
    type Inbound: DeserializeOwned + Send + Sync + 'static;
    /// Client → server envelope
    type Outbound: Serialize + Send + Sync + 'static;

    /// Name used in logs
    const NAME: &'static str;
    /// Socket path on the server
    const PATH: &'static str;
    /// Query parameter carrying the user id
    const IDENTITY_PARAM: &'static str;

    fn default_policy() -> ReconnectPolicy;

    /// Message sent right after the socket opens, if any
    fn handshake(_user_id: &str) -> Option<Self::Outbound> {
        None
    }

    /// `ws(s)://<host><PATH>?<IDENTITY_PARAM>=<user_id>`
    fn socket_url(ws_base_url: &str, user_id: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", ws_base_url.trim_end_matches('/'), Self::PATH))
            .map_err(|e| Error::Config(format!("Invalid {} socket URL: {}", Self::NAME, e)))?;
        url.query_pairs_mut()
            .append_pair(Self::IDENTITY_PARAM, user_id);
        Ok(url)
    }
}

/// Chat socket: `/ws/chat?userId=<id>`
pub struct ChatChannel;

impl Channel for ChatChannel {
    type Inbound = ChatEvent;
    type Outbound = ChatCommand;

    const NAME: &'static str = "chat";
    const PATH: &'static str = "/ws/chat";
    const IDENTITY_PARAM: &'static str = "userId";

    fn default_policy() -> ReconnectPolicy {
        default_chat_policy()
    }
}

/// Notification socket: `/ws/notifications?recipientId=<id>`
pub struct NotificationChannel;

impl Channel for NotificationChannel {
    type Inbound = NotificationEvent;
    type Outbound = NotificationCommand;

    const NAME: &'static str = "notifications";
    const PATH: &'static str = "/ws/notifications";
    const IDENTITY_PARAM: &'static str = "recipientId";

    fn default_policy() -> ReconnectPolicy {
        default_notification_policy()
    }

    fn handshake(user_id: &str) -> Option<NotificationCommand> {
        Some(NotificationCommand::Connect {
            recipient_id: user_id.to_string(),
        })
    }
}
