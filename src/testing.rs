//! In-memory Drive and app state for handler tests.

use crate::config::Config;
use crate::drive::{DriveApi, DriveFile, MediaChunk, SearchQuery, FOLDER_MIME_TYPE};
use crate::error::{AppError, Result};
use crate::session::SessionStore;
use crate::AppState;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct MemoryDrive {
    files: Mutex<Vec<DriveFile>>,
    contents: Mutex<HashMap<String, Bytes>>,
    next_id: AtomicUsize,
    pub searches: Mutex<Vec<SearchQuery>>,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub chunk_calls: AtomicUsize,
    /// Fail media pulls starting at this call index.
    pub fail_chunk_from: Mutex<Option<usize>>,
}

impl MemoryDrive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_folder(&self, id: &str, name: &str) {
        self.files.lock().unwrap().push(DriveFile {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: FOLDER_MIME_TYPE.to_string(),
            parents: vec![],
            trashed: false,
        });
    }

    pub fn add_file(&self, id: &str, name: &str, parent_id: &str, content: &[u8]) {
        self.files.lock().unwrap().push(DriveFile {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: "application/octet-stream".to_string(),
            parents: vec![parent_id.to_string()],
            trashed: false,
        });
        self.contents
            .lock()
            .unwrap()
            .insert(id.to_string(), Bytes::copy_from_slice(content));
    }

    pub fn trash(&self, id: &str) {
        for file in self.files.lock().unwrap().iter_mut() {
            if file.id == id {
                file.trashed = true;
            }
        }
    }

    pub fn children(&self, parent_id: &str) -> Vec<DriveFile> {
        self.files
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.parents.iter().any(|p| p == parent_id))
            .cloned()
            .collect()
    }

    pub fn content(&self, id: &str) -> Option<Bytes> {
        self.contents.lock().unwrap().get(id).cloned()
    }

    pub fn search_count(&self) -> usize {
        self.searches.lock().unwrap().len()
    }
}

#[async_trait]
impl DriveApi for MemoryDrive {
    async fn search(&self, _access_token: &str, query: &SearchQuery) -> Result<Vec<DriveFile>> {
        self.searches.lock().unwrap().push(query.clone());
        let files = self.files.lock().unwrap();
        Ok(files
            .iter()
            .filter(|f| !f.trashed)
            .filter(|f| match query {
                SearchQuery::Folder { name } => f.is_folder() && &f.name == name,
                SearchQuery::InFolder { name, parent_id } => {
                    &f.name == name && f.parents.iter().any(|p| p == parent_id)
                }
            })
            .cloned()
            .collect())
    }

    async fn create_file(
        &self,
        _access_token: &str,
        name: &str,
        parent_id: Option<&str>,
        content: Bytes,
        mime_type: &str,
    ) -> Result<DriveFile> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let id = format!("new-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let file = DriveFile {
            id: id.clone(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            parents: parent_id.map(|p| vec![p.to_string()]).unwrap_or_default(),
            trashed: false,
        };
        self.files.lock().unwrap().push(file.clone());
        self.contents.lock().unwrap().insert(id, content);
        Ok(file)
    }

    async fn update_file(
        &self,
        _access_token: &str,
        file_id: &str,
        name: &str,
        content: Bytes,
        _mime_type: &str,
    ) -> Result<DriveFile> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut files = self.files.lock().unwrap();
        let file = files
            .iter_mut()
            .find(|f| f.id == file_id)
            .ok_or_else(|| AppError::NotFound(file_id.to_string()))?;
        file.name = name.to_string();
        self.contents
            .lock()
            .unwrap()
            .insert(file_id.to_string(), content);
        Ok(file.clone())
    }

    async fn media_chunk(
        &self,
        _access_token: &str,
        file_id: &str,
        offset: u64,
        len: u64,
    ) -> Result<MediaChunk> {
        let call = self.chunk_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(from) = *self.fail_chunk_from.lock().unwrap() {
            if call >= from {
                return Err(AppError::Upstream("connection reset".into()));
            }
        }

        let content = self
            .content(file_id)
            .ok_or_else(|| AppError::NotFound(file_id.to_string()))?;
        let start = (offset as usize).min(content.len());
        let end = start.saturating_add(len as usize).min(content.len());
        Ok(MediaChunk {
            data: content.slice(start..end),
            total_size: Some(content.len() as u64),
        })
    }
}

pub fn test_state(drive: Arc<MemoryDrive>, config: Config) -> AppState {
    AppState {
        config: Arc::new(config),
        session_store: Arc::new(SessionStore::in_memory(Duration::from_secs(3600))),
        http_client: reqwest::Client::new(),
        drive,
    }
}
