use crate::{
    error::{AppError, Result},
    guard::AuthContext,
    resolver::{resolve_file, resolve_folder},
    transfer::{self, UploadOutcome},
    AppState,
};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderValue},
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, info};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Default)]
struct UploadForm {
    folder_name: Option<String>,
    file_name: Option<String>,
    file: Option<FilePart>,
}

#[derive(Debug)]
struct FilePart {
    file_name: Option<String>,
    content_type: String,
    data: Bytes,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("folder_name") => form.folder_name = non_empty(field.text().await?),
                Some("file_name") => form.file_name = non_empty(field.text().await?),
                Some("file") => {
                    let file_name = field.file_name().map(str::to_string);
                    let content_type = field
                        .content_type()
                        .unwrap_or(DEFAULT_CONTENT_TYPE)
                        .to_string();
                    let data = field.bytes().await?;
                    form.file = Some(FilePart {
                        file_name,
                        content_type,
                        data,
                    });
                }
                other => debug!("Ignoring multipart field {:?}", other),
            }
        }
        Ok(form)
    }

    /// The explicit `file_name` field wins over the part's own filename.
    fn take_file(&mut self) -> Result<(String, FilePart)> {
        let file = self
            .file
            .take()
            .ok_or_else(|| AppError::BadRequest("No file provided".into()))?;
        let name = self
            .file_name
            .take()
            .or_else(|| file.file_name.clone().and_then(non_empty))
            .ok_or_else(|| AppError::BadRequest("Missing file_name".into()))?;
        Ok((name, file))
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn attachment(display_name: &str, data: Bytes) -> impl IntoResponse {
    let safe_name: String = display_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
}

pub async fn upload_by_folder_name(
    State(state): State<AppState>,
    mut auth: AuthContext,
    multipart: Multipart,
) -> Result<Json<UploadOutcome>> {
    let mut form = UploadForm::read(multipart).await?;
    let folder_name = form
        .folder_name
        .take()
        .ok_or_else(|| AppError::BadRequest("Missing folder_name".into()))?;
    let (file_name, file) = form.take_file()?;

    info!("Uploading '{}' to folder '{}'", file_name, folder_name);
    let drive = state.drive.as_ref();
    let (folder_name, file_name) = (folder_name.as_str(), file_name.as_str());
    let content_type = file.content_type.as_str();
    let outcome = auth
        .run(&state, |token| {
            let data = file.data.clone();
            async move {
                let folder = resolve_folder(drive, &token, folder_name).await?;
                transfer::upload(
                    drive,
                    &token,
                    Some(folder.id.as_str()),
                    file_name,
                    data,
                    content_type,
                )
                .await
            }
        })
        .await?;

    Ok(Json(outcome))
}

pub async fn upload(
    State(state): State<AppState>,
    mut auth: AuthContext,
    multipart: Multipart,
) -> Result<Json<UploadOutcome>> {
    let mut form = UploadForm::read(multipart).await?;
    let (file_name, file) = form.take_file()?;

    info!("Uploading '{}' to drive root", file_name);
    let drive = state.drive.as_ref();
    let outcome = auth
        .run(&state, |token| {
            let data = file.data.clone();
            let (file_name, content_type) = (file_name.as_str(), file.content_type.as_str());
            async move {
                transfer::upload(drive, &token, None, file_name, data, content_type).await
            }
        })
        .await?;

    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    pub folder_name: Option<String>,
    pub filename: Option<String>,
}

pub async fn download_by_folder_name(
    State(state): State<AppState>,
    mut auth: AuthContext,
    Query(params): Query<DownloadParams>,
) -> Result<impl IntoResponse> {
    let folder_name = params
        .folder_name
        .and_then(non_empty)
        .ok_or_else(|| AppError::BadRequest("Missing folder_name".into()))?;
    let filename = params
        .filename
        .and_then(non_empty)
        .ok_or_else(|| AppError::BadRequest("Missing filename".into()))?;

    info!("Downloading '{}' from folder '{}'", filename, folder_name);
    let drive = state.drive.as_ref();
    let chunk_size = state.config.download_chunk_size;
    let (folder_name, file_name) = (folder_name.as_str(), filename.as_str());
    let data = auth
        .run(&state, |token| async move {
            let folder = resolve_folder(drive, &token, folder_name).await?;
            let file = resolve_file(drive, &token, &folder.id, file_name).await?;
            transfer::download(drive, &token, &file.id, chunk_size).await
        })
        .await?;

    Ok(attachment(&filename, data))
}

pub async fn download_by_id(
    State(state): State<AppState>,
    mut auth: AuthContext,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse> {
    let drive = state.drive.as_ref();
    let chunk_size = state.config.download_chunk_size;
    let id = file_id.as_str();
    let data = auth
        .run(&state, |token| async move {
            transfer::download(drive, &token, id, chunk_size).await
        })
        .await?;

    Ok(attachment(&format!("{}.bin", file_id), data))
}
