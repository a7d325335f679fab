//! Error types and Result alias for the Socialink client

use crate::validation::ValidationError;
use thiserror::Error;

/// Main error type for the Socialink client
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not authenticated: {0}")]
    Unauthorized(String),

    #[error("Could not resolve current user: {0}")]
    Identity(String),

    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Message suitable for an error toast
    pub fn user_message(&self) -> String {
        match self {
            Error::Api { message, .. } => message.clone(),
            Error::Validation(e) => e.to_string(),
            Error::Unauthorized(_) => "Please sign in again".to_string(),
            Error::Network(_) | Error::WebSocket(_) => {
                "Network error, please try again".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidData(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(err.to_string())
    }
}
