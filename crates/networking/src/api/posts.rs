//! Post and comment operations with validation

use crate::ApiClient;
use socialink_core::{validation::validate_comment, Comment, CreateCommentRequest, Result};
use tracing::{info, warn};

/// Post a comment on a post
///
/// Content is trimmed; empty content is rejected before any request is made.
pub async fn post_comment(client: &ApiClient, post_id: &str, content: &str) -> Result<Comment> {
    let content = validate_comment(content).map_err(|e| {
        warn!("Comment on post {} rejected: {}", post_id, e);
        e
    })?;

    let request = CreateCommentRequest {
        content: content.to_string(),
    };

    info!("Posting comment on post {}", post_id);
    client.create_comment(post_id, &request).await
}
