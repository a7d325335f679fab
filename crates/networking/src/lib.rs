//! Socialink Networking - REST client, application context, and WebSocket channels

pub mod api;
pub mod context;
pub mod http;
pub mod websocket;

pub use context::AppContext;
pub use http::{ApiClient, UploadFile};
pub use websocket::{
    Channel, ChatChannel, ChatConnection, ConnectionManager, NotificationChannel,
    NotificationConnection,
};
