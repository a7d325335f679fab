//! Post and comment models

use crate::types::deserialize_id;
use serde::{Deserialize, Serialize};

/// Request body for `POST /api/posts/{id}/comments`
#[derive(Debug, Clone, Serialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

/// A comment as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(deserialize_with = "deserialize_id")]
    pub post_id: String,
    #[serde(default)]
    pub author_name: Option<String>,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
}
