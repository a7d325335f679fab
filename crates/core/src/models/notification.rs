//! Notification channel envelopes and records

use crate::types::{deserialize_id, deserialize_opt_id, parse_timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A notification entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Server-side category, e.g. `LIKE`, `COMMENT`, `FRIEND_REQUEST`
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default, alias = "read")]
    pub is_read: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Notification {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_deref().and_then(parse_timestamp)
    }
}

/// Friendship change pushed alongside notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendshipEvent {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub friendship_id: Option<String>,
    /// The other party of the friendship
    #[serde(deserialize_with = "deserialize_id")]
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `GET /api/notifications/unread-count`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCount {
    #[serde(alias = "unreadCount")]
    pub count: u64,
}

/// Server → client envelope on the notification socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum NotificationEvent {
    Notification {
        notification: Notification,
    },
    NotificationUpdate {
        notification: Notification,
    },
    NotificationDelete {
        #[serde(deserialize_with = "deserialize_id")]
        notification_id: String,
    },
    UnreadCountUpdate {
        #[serde(alias = "unreadCount")]
        count: u64,
    },
    FriendshipRequest {
        friendship: FriendshipEvent,
    },
    FriendshipAccepted {
        friendship: FriendshipEvent,
    },
    FriendshipRejected {
        friendship: FriendshipEvent,
    },
    FriendshipRemoved {
        friendship: FriendshipEvent,
    },
    #[serde(other)]
    Unknown,
}

/// Client → server envelope on the notification socket
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum NotificationCommand {
    Connect { recipient_id: String },
    MarkAsRead { notification_id: String },
    MarkAllAsRead { recipient_id: String },
}
