//! Consumers that turn channel traffic into view state
//!
//! Each consumer registers itself on a connection manager under a fixed key
//! and holds only a weak reference inside its handlers, so dropping the
//! consumer is enough to make them inert.

mod badge;
mod chat;

pub use badge::*;
pub use chat::*;
