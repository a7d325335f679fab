//! Socialink REST client
//!
//! Every call carries the bearer token (when configured) and the cookie jar,
//! so both token and session-cookie deployments authenticate the same way.
//! Non-2xx responses are turned into [`Error::Api`] using the `message`
//! field of the response body.

use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION},
    multipart, Client, Response,
};
use serde::de::DeserializeOwned;
use socialink_core::{
    ApiErrorBody, Comment, CreateCommentRequest, CurrentUser, Error, FileCandidate, Result,
    RoomUnread, UnreadCount,
};
use std::time::Duration;
use tracing::{debug, error, instrument};

/// Upper bound for any single REST call
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A file ready for upload: its metadata plus the bytes
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub meta: FileCandidate,
    pub data: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: &str, mime_type: &str, data: Vec<u8>) -> Self {
        Self {
            meta: FileCandidate::new(name, mime_type, data.len() as u64),
            data,
        }
    }
}

/// HTTP client for the Socialink REST API
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new client for the given origin
    ///
    /// # Arguments
    /// * `base_url` - HTTP origin, e.g. `https://social.example.com`
    /// * `token` - Optional bearer token sent with every request
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        Self::with_timeout(base_url, token, REQUEST_TIMEOUT)
    }

    /// Same as [`ApiClient::new`] with a custom per-request timeout
    pub fn with_timeout(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(str::to_string),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Default headers for every request
    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(token) = &self.token {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => error!("Bearer token contains invalid header characters, sending without it"),
            }
        }

        headers
    }

    /// Turn a non-2xx response into an error, reading `message` from the body
    async fn error_from_response(response: Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(ApiErrorBody::into_message)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            });

        match status.as_u16() {
            401 | 403 => Error::Unauthorized(message),
            code => Error::Api {
                status: code,
                message,
            },
        }
    }

    /// Check the status and decode a JSON body
    async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        if !response.status().is_success() {
            let err = Self::error_from_response(response).await;
            error!("{} request failed: {}", what, err);
            return Err(err);
        }

        response.json::<T>().await.map_err(|e| {
            error!("Failed to parse {} response: {}", what, e);
            Error::InvalidData(e.to_string())
        })
    }

    /// Check the status and discard the body
    async fn read_empty(response: Response, what: &str) -> Result<()> {
        if !response.status().is_success() {
            let err = Self::error_from_response(response).await;
            error!("{} request failed: {}", what, err);
            return Err(err);
        }
        Ok(())
    }

    /// Get the signed-in user (`GET /api/auth/me`)
    #[instrument(skip(self))]
    pub async fn current_user(&self) -> Result<CurrentUser> {
        let url = self.url("/api/auth/me");
        debug!("Fetching current user from: {}", url);

        let response = self
            .http
            .get(&url)
            .headers(self.default_headers())
            .send()
            .await?;

        let user: CurrentUser = Self::read_json(response, "Current user").await?;
        debug!("Resolved current user {} ({})", user.username, user.id);
        Ok(user)
    }

    /// Get the unread notification count
    #[instrument(skip(self))]
    pub async fn unread_notification_count(&self) -> Result<u64> {
        let response = self
            .http
            .get(self.url("/api/notifications/unread-count"))
            .headers(self.default_headers())
            .send()
            .await?;

        let count: UnreadCount = Self::read_json(response, "Unread count").await?;
        Ok(count.count)
    }

    /// Mark one notification as read
    #[instrument(skip(self))]
    pub async fn mark_notification_read(&self, notification_id: &str) -> Result<()> {
        let response = self
            .http
            .put(self.url(&format!("/api/notifications/{}/read", notification_id)))
            .headers(self.default_headers())
            .send()
            .await?;

        Self::read_empty(response, "Mark notification read").await
    }

    /// Mark every notification as read
    #[instrument(skip(self))]
    pub async fn mark_all_notifications_read(&self) -> Result<()> {
        let response = self
            .http
            .put(self.url("/api/notifications/read-all"))
            .headers(self.default_headers())
            .send()
            .await?;

        Self::read_empty(response, "Mark all notifications read").await
    }

    /// Get unread message counts for every chat room the user is in
    #[instrument(skip(self))]
    pub async fn chat_unread_counts(&self) -> Result<Vec<RoomUnread>> {
        let response = self
            .http
            .get(self.url("/api/chat/rooms/unread"))
            .headers(self.default_headers())
            .send()
            .await?;

        let rooms: Vec<RoomUnread> = Self::read_json(response, "Chat unread").await?;
        debug!("Fetched unread counts for {} rooms", rooms.len());
        Ok(rooms)
    }

    /// Get the most recent messages of a room
    #[instrument(skip(self))]
    pub async fn room_messages(
        &self,
        room_id: &str,
        limit: u32,
    ) -> Result<Vec<socialink_core::ChatMessage>> {
        let url = self.url(&format!("/api/chat/rooms/{}/messages?limit={}", room_id, limit));

        let response = self
            .http
            .get(&url)
            .headers(self.default_headers())
            .send()
            .await?;

        Self::read_json(response, "Room messages").await
    }

    /// Create a comment; callers validate the content first
    #[instrument(skip(self, request))]
    pub async fn create_comment(
        &self,
        post_id: &str,
        request: &CreateCommentRequest,
    ) -> Result<Comment> {
        let response = self
            .http
            .post(self.url(&format!("/api/posts/{}/comments", post_id)))
            .headers(self.default_headers())
            .json(request)
            .send()
            .await?;

        let comment: Comment = Self::read_json(response, "Create comment").await?;
        debug!("Comment {} created on post {}", comment.id, post_id);
        Ok(comment)
    }

    /// Upload files to a chat room as one multipart request
    #[instrument(skip(self, files), fields(count = files.len()))]
    pub async fn upload_room_files(&self, room_id: &str, files: Vec<UploadFile>) -> Result<()> {
        let mut form = multipart::Form::new();
        for file in files {
            let part = multipart::Part::bytes(file.data)
                .file_name(file.meta.name.clone())
                .mime_str(&file.meta.mime_type)
                .map_err(|e| Error::InvalidData(e.to_string()))?;
            form = form.part("files", part);
        }

        let response = self
            .http
            .post(self.url(&format!("/api/chat/rooms/{}/files", room_id)))
            .headers(self.default_headers())
            .multipart(form)
            .send()
            .await?;

        Self::read_empty(response, "File upload").await
    }
}
