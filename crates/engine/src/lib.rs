//! Socialink Engine - Channel consumers and the polling fallback

pub mod consumers;
pub mod fallback;

pub use consumers::{ChatFeed, NotificationBadge};
pub use fallback::FallbackPoller;
