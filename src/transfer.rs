use crate::drive::DriveApi;
use crate::error::{AppError, Result};
use crate::resolver::find_file_in_folder;
use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub id: String,
    pub name: String,
    pub action: UploadAction,
}

/// Uploads `content` as `file_name` under `folder_id` (or the root).
///
/// An existing file of the same name in the folder is updated in place.
/// Concurrent uploads of the same name are not coordinated; the last write wins.
pub async fn upload(
    drive: &dyn DriveApi,
    access_token: &str,
    folder_id: Option<&str>,
    file_name: &str,
    content: Bytes,
    mime_type: &str,
) -> Result<UploadOutcome> {
    let existing = match folder_id {
        Some(folder_id) => find_file_in_folder(drive, access_token, folder_id, file_name).await?,
        None => None,
    };

    let (file, action) = match existing {
        Some(existing) => {
            debug!("Updating existing file {} in place", existing.id);
            let file = drive
                .update_file(access_token, &existing.id, file_name, content, mime_type)
                .await?;
            (file, UploadAction::Updated)
        }
        None => {
            let file = drive
                .create_file(access_token, file_name, folder_id, content, mime_type)
                .await?;
            (file, UploadAction::Created)
        }
    };

    info!("Upload {:?}: {} ({})", action, file.name, file.id);
    Ok(UploadOutcome {
        id: file.id,
        name: file.name,
        action,
    })
}

/// Pulls the whole object in `chunk_size` slices. Any failed pull aborts.
pub async fn download(
    drive: &dyn DriveApi,
    access_token: &str,
    file_id: &str,
    chunk_size: u64,
) -> Result<Bytes> {
    let chunk_size = chunk_size.max(1);
    let mut buffer = BytesMut::new();
    let mut received: u64 = 0;

    loop {
        let chunk = drive
            .media_chunk(access_token, file_id, received, chunk_size)
            .await?;
        received += chunk.data.len() as u64;
        buffer.extend_from_slice(&chunk.data);

        if let Some(total) = chunk.total_size.filter(|t| *t > 0) {
            debug!("Download {}%", received.min(total) * 100 / total);
        }

        if chunk.completes(received, chunk_size) {
            break;
        }
        if chunk.data.is_empty() {
            return Err(AppError::Upstream(format!(
                "Download of {} stalled at {} bytes",
                file_id, received
            )));
        }
    }

    info!("Downloaded {} ({} bytes)", file_id, received);
    Ok(buffer.freeze())
}
