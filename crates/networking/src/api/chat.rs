//! Chat REST operations with validation

use crate::http::UploadFile;
use crate::ApiClient;
use socialink_core::{FileCandidate, FileValidator, Result};
use tracing::{info, warn};

/// Upload files to a chat room
///
/// Every file is checked against `validator` first; one bad file rejects the
/// whole batch and nothing is sent.
pub async fn upload_files(
    client: &ApiClient,
    validator: &FileValidator,
    room_id: &str,
    files: Vec<UploadFile>,
) -> Result<()> {
    let metas: Vec<FileCandidate> = files.iter().map(|f| f.meta.clone()).collect();
    if let Err(e) = validator.validate_all(&metas) {
        warn!("Upload to room {} rejected: {}", room_id, e);
        return Err(e.into());
    }

    info!("Uploading {} file(s) to room {}", files.len(), room_id);
    client.upload_room_files(room_id, files).await
}
