//! Data models for Socialink entities and socket envelopes

mod chat;
mod notification;
mod post;
mod user;

pub use chat::*;
pub use notification::*;
pub use post::*;
pub use user::*;
