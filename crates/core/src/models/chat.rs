//! Chat channel envelopes and records

use crate::types::{deserialize_id, deserialize_opt_id, parse_timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message as pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub room_id: Option<String>,
    #[serde(deserialize_with = "deserialize_id")]
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ChatMessage {
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_deref().and_then(parse_timestamp)
    }
}

/// File shared in a chat room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub file_name: String,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Per-room unread counter from `GET /api/chat/rooms/unread`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUnread {
    #[serde(deserialize_with = "deserialize_id")]
    pub room_id: String,
    #[serde(default)]
    pub unread_count: u64,
}

/// Server → client envelope on the chat socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ChatEvent {
    ConnectionEstablished {
        #[serde(default, deserialize_with = "deserialize_opt_id")]
        user_id: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    NewMessage {
        #[serde(deserialize_with = "deserialize_id")]
        room_id: String,
        message: ChatMessage,
    },
    MessageRead {
        #[serde(deserialize_with = "deserialize_id")]
        room_id: String,
        #[serde(default, deserialize_with = "deserialize_opt_id")]
        message_id: Option<String>,
        #[serde(deserialize_with = "deserialize_id")]
        user_id: String,
    },
    UserOnline {
        #[serde(deserialize_with = "deserialize_id")]
        user_id: String,
    },
    UserOffline {
        #[serde(deserialize_with = "deserialize_id")]
        user_id: String,
    },
    FileUploaded {
        #[serde(deserialize_with = "deserialize_id")]
        room_id: String,
        file: FileAttachment,
    },
    FilesUploaded {
        #[serde(deserialize_with = "deserialize_id")]
        room_id: String,
        #[serde(default)]
        files: Vec<FileAttachment>,
    },
    /// Any `type` this client does not know yet
    #[serde(other)]
    Unknown,
}

/// Client → server envelope on the chat socket
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ChatCommand {
    JoinRoom { room_id: String },
    LeaveRoom { room_id: String },
    MessageRead { room_id: String, message_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_envelope() {
        let raw = r#"{
            "type": "NEW_MESSAGE",
            "roomId": 3,
            "message": {"id": 91, "roomId": 3, "senderId": 8, "senderName": "jo", "content": "hi"}
        }"#;
        let event: ChatEvent = serde_json::from_str(raw).unwrap();
        match event {
            ChatEvent::NewMessage { room_id, message } => {
                assert_eq!(room_id, "3");
                assert_eq!(message.id, "91");
                assert_eq!(message.sender_id, "8");
                assert_eq!(message.content, "hi");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_sent_at_parses_server_time() {
        let message: ChatMessage = serde_json::from_str(
            r#"{"id": 1, "senderId": 2, "content": "x", "createdAt": "2024-05-02T09:30:00"}"#,
        )
        .unwrap();
        assert_eq!(message.sent_at().unwrap().to_rfc3339(), "2024-05-02T09:30:00+00:00");
    }

    #[test]
    fn test_unknown_type_is_tolerated() {
        let event: ChatEvent =
            serde_json::from_str(r#"{"type": "TYPING", "roomId": 1}"#).unwrap();
        assert_eq!(event, ChatEvent::Unknown);
    }

    #[test]
    fn test_files_uploaded_defaults_to_empty() {
        let event: ChatEvent =
            serde_json::from_str(r#"{"type": "FILES_UPLOADED", "roomId": "r1"}"#).unwrap();
        assert_eq!(
            event,
            ChatEvent::FilesUploaded { room_id: "r1".to_string(), files: vec![] }
        );
    }

    #[test]
    fn test_commands_use_wire_names() {
        let cmd = ChatCommand::MessageRead {
            room_id: "3".to_string(),
            message_id: "91".to_string(),
        };
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value["type"], "MESSAGE_READ");
        assert_eq!(value["roomId"], "3");
        assert_eq!(value["messageId"], "91");
    }
}
