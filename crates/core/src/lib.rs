//! Socialink Core - Shared data models, socket envelopes, types, and errors

pub mod config;
pub mod errors;
pub mod models;
pub mod types;
pub mod validation;

pub use config::{ClientConfig, ConfigError, ReconnectPolicy};
pub use errors::{Error, Result};
pub use models::*;
pub use types::*;
pub use validation::{FileCandidate, FileValidator, ValidationError};
