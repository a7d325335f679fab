//! REST transport

mod client;

pub use client::{ApiClient, UploadFile, REQUEST_TIMEOUT};
