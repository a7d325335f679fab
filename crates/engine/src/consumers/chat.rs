//! Chat feed: presence, per-room unread counters and message buffers

use socialink_core::{
    ChatCommand, ChatEvent, ChatMessage, ConnectionEvent, FileAttachment, FileValidator, Result,
};
use socialink_networking::{api, ChatConnection, UploadFile};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, info, instrument};

pub const FEED_HANDLER_KEY: &str = "chat-feed";
pub const MAX_BUFFERED_MESSAGES: usize = 100;

#[derive(Default)]
struct Feed {
    online: HashSet<String>,
    unread: HashMap<String, u64>,
    active_room: Option<String>,
    messages: HashMap<String, VecDeque<ChatMessage>>,
    /// room -> reader -> last message id read
    receipts: HashMap<String, HashMap<String, String>>,
    files: HashMap<String, Vec<FileAttachment>>,
}

impl Feed {
    fn buffer(&mut self, room_id: &str, message: ChatMessage) {
        let buffer = self.messages.entry(room_id.to_string()).or_default();
        buffer.push_back(message);
        while buffer.len() > MAX_BUFFERED_MESSAGES {
            buffer.pop_front();
        }
    }
}

struct FeedState {
    manager: ChatConnection,
    feed: Mutex<Feed>,
}

impl FeedState {
    fn feed(&self) -> MutexGuard<'_, Feed> {
        self.feed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, event: &ChatEvent) {
        match event {
            ChatEvent::ConnectionEstablished { user_id, .. } => {
                debug!("Chat session established for {:?}", user_id);
            }
            ChatEvent::NewMessage { room_id, message } => self.on_message(room_id, message),
            ChatEvent::MessageRead {
                room_id,
                message_id,
                user_id,
            } => {
                if let Some(message_id) = message_id {
                    self.feed()
                        .receipts
                        .entry(room_id.clone())
                        .or_default()
                        .insert(user_id.clone(), message_id.clone());
                }
            }
            ChatEvent::UserOnline { user_id } => {
                self.feed().online.insert(user_id.clone());
            }
            ChatEvent::UserOffline { user_id } => {
                self.feed().online.remove(user_id);
            }
            ChatEvent::FileUploaded { room_id, file } => {
                self.feed()
                    .files
                    .entry(room_id.clone())
                    .or_default()
                    .push(file.clone());
            }
            ChatEvent::FilesUploaded { room_id, files } => {
                self.feed()
                    .files
                    .entry(room_id.clone())
                    .or_default()
                    .extend(files.iter().cloned());
            }
            ChatEvent::Unknown => debug!("Ignoring unknown chat envelope"),
        }
    }

    fn on_message(&self, room_id: &str, message: &ChatMessage) {
        let me = self.manager.context().cached_user_id();
        let from_me = me.as_deref() == Some(message.sender_id.as_str());

        let read_now = {
            let mut feed = self.feed();
            feed.buffer(room_id, message.clone());
            let active = feed.active_room.as_deref() == Some(room_id);
            if !active && !from_me {
                *feed.unread.entry(room_id.to_string()).or_insert(0) += 1;
            }
            active && !from_me
        };

        if read_now {
            self.manager.send(&ChatCommand::MessageRead {
                room_id: room_id.to_string(),
                message_id: message.id.clone(),
            });
        }
    }

    fn on_connection(&self, event: &ConnectionEvent) {
        if !event.is_connected() {
            return;
        }
        let active = self.feed().active_room.clone();
        if let Some(room_id) = active {
            info!("Rejoining room {} after reconnect", room_id);
            self.manager.send(&ChatCommand::JoinRoom { room_id });
        }
    }
}

/// Consumer of the chat channel behind the messenger view
pub struct ChatFeed {
    state: Arc<FeedState>,
    validator: FileValidator,
}

impl ChatFeed {
    pub fn attach(manager: &ChatConnection) -> Self {
        let state = Arc::new(FeedState {
            manager: manager.clone(),
            feed: Mutex::new(Feed::default()),
        });

        let weak: Weak<FeedState> = Arc::downgrade(&state);
        manager.add_message_handler(FEED_HANDLER_KEY, move |event| {
            if let Some(state) = weak.upgrade() {
                state.apply(event);
            }
        });

        let weak: Weak<FeedState> = Arc::downgrade(&state);
        manager.add_connection_handler(FEED_HANDLER_KEY, move |event| {
            if let Some(state) = weak.upgrade() {
                state.on_connection(event);
            }
        });

        Self {
            state,
            validator: FileValidator::default(),
        }
    }

    pub fn with_validator(mut self, validator: FileValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn detach(self) {
        let manager = &self.state.manager;
        manager.remove_message_handler(FEED_HANDLER_KEY);
        manager.remove_connection_handler(FEED_HANDLER_KEY);
    }

    /// Apply one envelope as if it arrived on the socket
    pub fn apply(&self, event: &ChatEvent) {
        self.state.apply(event);
    }

    /// Switch the active room: leave the previous one, join the new one and
    /// clear its unread counter.
    pub fn open_room(&self, room_id: &str) {
        let previous = {
            let mut feed = self.state.feed();
            feed.unread.remove(room_id);
            feed.active_room.replace(room_id.to_string())
        };

        if previous.as_deref() == Some(room_id) {
            return;
        }
        if let Some(previous) = previous {
            self.state
                .manager
                .send(&ChatCommand::LeaveRoom { room_id: previous });
        }
        self.state.manager.send(&ChatCommand::JoinRoom {
            room_id: room_id.to_string(),
        });
    }

    pub fn close_room(&self) {
        let previous = self.state.feed().active_room.take();
        if let Some(room_id) = previous {
            self.state.manager.send(&ChatCommand::LeaveRoom { room_id });
        }
    }

    pub fn active_room(&self) -> Option<String> {
        self.state.feed().active_room.clone()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.state.feed().online.contains(user_id)
    }

    /// Sorted for stable display
    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<_> = self.state.feed().online.iter().cloned().collect();
        users.sort();
        users
    }

    pub fn unread_count(&self, room_id: &str) -> u64 {
        self.state.feed().unread.get(room_id).copied().unwrap_or(0)
    }

    pub fn total_unread(&self) -> u64 {
        self.state.feed().unread.values().sum()
    }

    /// Oldest first
    pub fn messages(&self, room_id: &str) -> Vec<ChatMessage> {
        self.state
            .feed()
            .messages
            .get(room_id)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn last_read(&self, room_id: &str, user_id: &str) -> Option<String> {
        self.state
            .feed()
            .receipts
            .get(room_id)
            .and_then(|readers| readers.get(user_id).cloned())
    }

    pub fn files(&self, room_id: &str) -> Vec<FileAttachment> {
        self.state
            .feed()
            .files
            .get(room_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Reload per-room unread counters from the REST endpoint
    #[instrument(skip(self))]
    pub async fn refresh_unread(&self) -> Result<()> {
        let rooms = self.state.manager.context().api().chat_unread_counts().await?;

        let mut feed = self.state.feed();
        let active = feed.active_room.clone();
        feed.unread = rooms
            .into_iter()
            .filter(|r| r.unread_count > 0 && active.as_deref() != Some(r.room_id.as_str()))
            .map(|r| (r.room_id, r.unread_count))
            .collect();
        debug!("Unread counters refreshed for {} rooms", feed.unread.len());
        Ok(())
    }

    /// Replace a room's buffer with its latest messages from REST
    #[instrument(skip(self))]
    pub async fn load_history(&self, room_id: &str) -> Result<()> {
        let messages = self
            .state
            .manager
            .context()
            .api()
            .room_messages(room_id, MAX_BUFFERED_MESSAGES as u32)
            .await?;

        let mut feed = self.state.feed();
        let buffer = feed.messages.entry(room_id.to_string()).or_default();
        buffer.clear();
        buffer.extend(messages);
        while buffer.len() > MAX_BUFFERED_MESSAGES {
            buffer.pop_front();
        }
        Ok(())
    }

    /// Validate and upload files; the server announces them on the socket
    pub async fn upload(&self, room_id: &str, files: Vec<UploadFile>) -> Result<()> {
        api::upload_files(
            self.state.manager.context().api(),
            &self.validator,
            room_id,
            files,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socialink_core::{CurrentUser, Error, ValidationError};
    use socialink_networking::{ApiClient, AppContext};

    const ME: &str = "17";

    fn feed() -> ChatFeed {
        let ctx = AppContext::new(ApiClient::new("http://127.0.0.1:9", None).unwrap());
        ctx.set_current_user(CurrentUser {
            id: ME.to_string(),
            username: "mina".to_string(),
            name: None,
            email: None,
            profile_image: None,
            role: None,
        });
        ChatFeed::attach(&ChatConnection::new(Arc::new(ctx)))
    }

    fn message(room_id: &str, id: &str, sender_id: &str) -> ChatEvent {
        ChatEvent::NewMessage {
            room_id: room_id.to_string(),
            message: ChatMessage {
                id: id.to_string(),
                room_id: Some(room_id.to_string()),
                sender_id: sender_id.to_string(),
                sender_name: None,
                content: format!("message {}", id),
                message_type: None,
                created_at: None,
            },
        }
    }

    #[test]
    fn test_presence_tracking() {
        let feed = feed();
        feed.apply(&ChatEvent::UserOnline { user_id: "8".to_string() });
        feed.apply(&ChatEvent::UserOnline { user_id: "3".to_string() });
        feed.apply(&ChatEvent::UserOffline { user_id: "8".to_string() });

        assert!(!feed.is_online("8"));
        assert_eq!(feed.online_users(), vec!["3".to_string()]);
    }

    #[test]
    fn test_unread_counts_only_inactive_rooms() {
        let feed = feed();
        feed.open_room("1");

        feed.apply(&message("1", "10", "8"));
        feed.apply(&message("2", "11", "8"));
        feed.apply(&message("2", "12", "8"));
        feed.apply(&message("2", "13", ME));

        assert_eq!(feed.unread_count("1"), 0);
        assert_eq!(feed.unread_count("2"), 2);
        assert_eq!(feed.total_unread(), 2);
        assert_eq!(feed.messages("2").len(), 3);

        feed.open_room("2");
        assert_eq!(feed.unread_count("2"), 0);
        assert_eq!(feed.active_room().as_deref(), Some("2"));
    }

    #[test]
    fn test_buffer_keeps_latest_messages() {
        let feed = feed();
        for i in 0..(MAX_BUFFERED_MESSAGES + 3) {
            feed.apply(&message("5", &i.to_string(), "8"));
        }
        let messages = feed.messages("5");
        assert_eq!(messages.len(), MAX_BUFFERED_MESSAGES);
        assert_eq!(messages[0].id, "3");
    }

    #[test]
    fn test_read_receipts_and_files() {
        let feed = feed();
        feed.apply(&ChatEvent::MessageRead {
            room_id: "1".to_string(),
            message_id: Some("40".to_string()),
            user_id: "8".to_string(),
        });
        feed.apply(&ChatEvent::MessageRead {
            room_id: "1".to_string(),
            message_id: Some("42".to_string()),
            user_id: "8".to_string(),
        });
        assert_eq!(feed.last_read("1", "8").as_deref(), Some("42"));
        assert_eq!(feed.last_read("1", "9"), None);

        let file = FileAttachment {
            id: "f1".to_string(),
            file_name: "cat.png".to_string(),
            file_url: None,
            file_size: 512,
            mime_type: Some("image/png".to_string()),
        };
        feed.apply(&ChatEvent::FileUploaded {
            room_id: "1".to_string(),
            file: file.clone(),
        });
        feed.apply(&ChatEvent::FilesUploaded {
            room_id: "1".to_string(),
            files: vec![file.clone(), file],
        });
        assert_eq!(feed.files("1").len(), 3);
    }

    #[tokio::test]
    async fn test_upload_rejects_before_request() {
        let feed = feed().with_validator(FileValidator::default().with_max_files(1));
        let files = vec![
            UploadFile::new("a.png", "image/png", vec![0u8; 4]),
            UploadFile::new("b.png", "image/png", vec![0u8; 4]),
        ];
        let err = feed.upload("1", files).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::TooManyFiles { .. })
        ));
    }

    #[test]
    fn test_detach_removes_both_handlers() {
        let feed = feed();
        let manager = feed.state.manager.clone();
        assert!(manager.has_message_handler(FEED_HANDLER_KEY));
        assert!(manager.has_connection_handler(FEED_HANDLER_KEY));

        feed.detach();
        assert!(!manager.has_message_handler(FEED_HANDLER_KEY));
        assert!(!manager.has_connection_handler(FEED_HANDLER_KEY));
    }
}
