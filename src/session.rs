use crate::token_mirror::write_private;
use crate::types::{Credential, PendingAuthorization, SessionData};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SessionRecord {
    data: SessionData,
    last_seen: DateTime<Utc>,
}

/// Cookie-keyed session state. Idle sessions are evicted lazily.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    persist_path: Option<PathBuf>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(persist_path: Option<PathBuf>, ttl: Duration) -> Self {
        let store = Self {
            sessions: RwLock::new(HashMap::new()),
            persist_path,
            ttl,
        };
        store.load_sessions();
        store
    }

    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(None, ttl)
    }

    fn load_sessions(&self) {
        let Some(path) = &self.persist_path else {
            return;
        };
        match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<HashMap<String, SessionRecord>>(&data) {
                Ok(sessions) => {
                    let mut store = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
                    *store = sessions;
                    self.evict_expired(&mut store);
                    info!("Loaded {} sessions from disk", store.len());
                }
                Err(e) => debug!("Failed to parse sessions file: {}", e),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No existing sessions file found");
            }
            Err(e) => {
                error!("Failed to load sessions: {}", e);
            }
        }
    }

    fn save_sessions(&self, sessions: &HashMap<String, SessionRecord>) {
        let Some(path) = &self.persist_path else {
            return;
        };
        match serde_json::to_vec_pretty(sessions) {
            Ok(data) => {
                if let Err(e) = write_private(path, &data) {
                    error!("Failed to save sessions: {:#}", e);
                } else {
                    debug!("Saved {} sessions to disk", sessions.len());
                }
            }
            Err(e) => {
                error!("Failed to serialize sessions: {}", e);
            }
        }
    }

    fn evict_expired(&self, sessions: &mut HashMap<String, SessionRecord>) {
        let ttl = chrono::Duration::from_std(self.ttl)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        let now = Utc::now();
        sessions.retain(|_, record| now - record.last_seen < ttl);
    }

    pub fn get(&self, session_id: &str) -> Option<SessionData> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        self.evict_expired(&mut sessions);
        let record = sessions.get_mut(session_id)?;
        record.last_seen = Utc::now();
        Some(record.data.clone())
    }

    pub fn credential(&self, session_id: &str) -> Option<Credential> {
        self.get(session_id).and_then(|data| data.credential)
    }

    /// Applies `f` to the session, creating it if needed, then persists.
    fn modify<T>(&self, session_id: &str, f: impl FnOnce(&mut SessionData) -> T) -> T {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        self.evict_expired(&mut sessions);
        let record = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRecord {
                data: SessionData::default(),
                last_seen: Utc::now(),
            });
        record.last_seen = Utc::now();
        let result = f(&mut record.data);
        self.save_sessions(&sessions);
        result
    }

    /// Replaces the session credential in full.
    pub fn store_credential(&self, session_id: &str, credential: Credential) {
        self.modify(session_id, |data| data.credential = Some(credential));
    }

    pub fn store_pending(&self, session_id: &str, pending: PendingAuthorization) {
        self.modify(session_id, |data| data.pending = Some(pending));
    }

    /// Removes and returns the pending authorization; it can be used once.
    pub fn take_pending(&self, session_id: &str) -> Option<PendingAuthorization> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        self.evict_expired(&mut sessions);
        let pending = sessions.get_mut(session_id)?.data.pending.take();
        if pending.is_some() {
            self.save_sessions(&sessions);
        }
        pending
    }

    pub fn remove(&self, session_id: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.remove(session_id).is_some() {
            self.save_sessions(&sessions);
        }
    }

    pub fn generate_session_id() -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_credential;

    fn pending(state: &str) -> PendingAuthorization {
        PendingAuthorization {
            state: state.to_string(),
            code_verifier: "verifier".to_string(),
        }
    }

    #[test]
    fn test_store_and_get_credential() {
        let store = SessionStore::in_memory(Duration::from_secs(60));
        let id = SessionStore::generate_session_id();
        assert!(store.get(&id).is_none());

        let credential = test_credential("https://token");
        store.store_credential(&id, credential.clone());

        assert_eq!(store.credential(&id), Some(credential));
    }

    #[test]
    fn test_store_credential_replaces_entry() {
        let store = SessionStore::in_memory(Duration::from_secs(60));
        store.store_credential("s", test_credential("https://old"));

        let mut replacement = test_credential("https://new");
        replacement.access_token = "other".into();
        replacement.refresh_token = None;
        store.store_credential("s", replacement.clone());

        assert_eq!(store.credential("s"), Some(replacement));
    }

    #[test]
    fn test_pending_is_one_time() {
        let store = SessionStore::in_memory(Duration::from_secs(60));
        store.store_pending("s", pending("abc"));

        assert_eq!(store.take_pending("s"), Some(pending("abc")));
        assert_eq!(store.take_pending("s"), None);
        assert!(store.get("s").is_some());
    }

    #[test]
    fn test_remove_drops_session() {
        let store = SessionStore::in_memory(Duration::from_secs(60));
        store.store_credential("s", test_credential("https://token"));

        store.remove("s");
        store.remove("never-issued");

        assert!(store.get("s").is_none());
    }

    #[test]
    fn test_idle_sessions_expire() {
        let store = SessionStore::in_memory(Duration::ZERO);
        store.store_credential("s", test_credential("https://token"));
        assert!(store.get("s").is_none());
    }

    #[test]
    fn test_sessions_persist_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let credential = test_credential("https://token");

        {
            let store = SessionStore::new(Some(path.clone()), Duration::from_secs(60));
            store.store_credential("s", credential.clone());
        }

        let reloaded = SessionStore::new(Some(path.clone()), Duration::from_secs(60));
        assert_eq!(reloaded.credential("s"), Some(credential));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }
}
