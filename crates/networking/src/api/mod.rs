//! High-level API wrappers for Socialink endpoints
//!
//! This module provides convenient wrappers around the raw HTTP client,
//! running the client-side validation before any request goes out.

mod chat;
mod posts;

pub use chat::*;
pub use posts::*;
