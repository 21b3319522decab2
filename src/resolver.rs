//! Folder and file name resolution.
//!
//! Drive does not enforce unique names, so a lookup can match several items.
//! The first match in provider order wins and the collision is logged; callers
//! that need uniqueness must enforce it themselves.

use crate::drive::{DriveApi, DriveFile, SearchQuery};
use crate::error::{AppError, Result};
use tracing::{debug, warn};

fn first_match(kind: &str, name: &str, matches: Vec<DriveFile>) -> Option<DriveFile> {
    if matches.len() > 1 {
        warn!(
            "{} name '{}' is ambiguous ({} matches), using id {}",
            kind,
            name,
            matches.len(),
            matches[0].id
        );
    }
    matches.into_iter().next()
}

pub async fn resolve_folder(
    drive: &dyn DriveApi,
    access_token: &str,
    folder_name: &str,
) -> Result<DriveFile> {
    let matches = drive
        .search(access_token, &SearchQuery::folder(folder_name))
        .await?;
    let folder = first_match("Folder", folder_name, matches)
        .ok_or_else(|| AppError::NotFound(format!("folder '{}'", folder_name)))?;
    debug!("Resolved folder '{}' to {}", folder_name, folder.id);
    Ok(folder)
}

pub async fn find_file_in_folder(
    drive: &dyn DriveApi,
    access_token: &str,
    folder_id: &str,
    file_name: &str,
) -> Result<Option<DriveFile>> {
    let matches = drive
        .search(access_token, &SearchQuery::in_folder(file_name, folder_id))
        .await?;
    Ok(first_match("File", file_name, matches))
}

pub async fn resolve_file(
    drive: &dyn DriveApi,
    access_token: &str,
    folder_id: &str,
    file_name: &str,
) -> Result<DriveFile> {
    find_file_in_folder(drive, access_token, folder_id, file_name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("file '{}'", file_name)))
}
