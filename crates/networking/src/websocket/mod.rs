//! WebSocket channels with reconnection and multi-consumer dispatch

mod channel;
mod manager;
mod registry;

pub use channel::{Channel, ChatChannel, NotificationChannel};
pub use manager::ConnectionManager;
pub use registry::HandlerRegistry;

/// Manager for the chat socket
pub type ChatConnection = ConnectionManager<ChatChannel>;

/// Manager for the notification socket
pub type NotificationConnection = ConnectionManager<NotificationChannel>;
