//! The auth boundary as seen by the core: a current session (or none) plus
//! a change notification. Sign-in itself lives in `backend::auth`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl User {
    /// Email, phone, or id, whichever is available first.
    pub fn display_name(&self) -> &str {
        self.email
            .as_deref()
            .filter(|e| !e.is_empty())
            .or(self.phone.as_deref().filter(|p| !p.is_empty()))
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

impl Session {
    pub fn is_expired(&self, now_unix: i64) -> bool {
        self.expires_at.map(|t| t <= now_unix).unwrap_or(false)
    }
}

/// Holds the current session and notifies subscribers when it changes.
///
/// Cloning shares the same underlying state.
#[derive(Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<Option<Session>>>,
    path: Option<PathBuf>,
}

impl SessionStore {
    pub fn in_memory() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            path: None,
        }
    }

    /// Open a file-backed store, restoring a previously saved session.
    ///
    /// An unreadable or expired file is treated as signed out.
    pub fn open(path: PathBuf) -> Result<Self> {
        let restored = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str::<Session>(&content)
                .ok()
                .filter(|s| !s.is_expired(chrono::Utc::now().timestamp()))
        } else {
            None
        };
        debug!(restored = restored.is_some(), "session store opened");

        let (tx, _rx) = watch::channel(restored);
        Ok(Self {
            tx: Arc::new(tx),
            path: Some(path),
        })
    }

    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn user_id(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|s| s.user.id.clone())
    }

    pub fn access_token(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|s| s.access_token.clone())
    }

    /// Replace the session, persist it, and notify subscribers.
    pub fn set(&self, session: Option<Session>) -> Result<()> {
        if let Some(path) = &self.path {
            match &session {
                Some(s) => {
                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(path, serde_json::to_string_pretty(s)?)?;
                }
                None => {
                    if path.exists() {
                        fs::remove_file(path)?;
                    }
                }
            }
        }
        self.tx.send_replace(session);
        Ok(())
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
pub(crate) fn test_session(user_id: &str) -> Session {
    Session {
        access_token: format!("token-{user_id}"),
        refresh_token: None,
        expires_at: None,
        user: User {
            id: user_id.to_string(),
            email: Some(format!("{user_id}@example.com")),
            phone: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trips_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = SessionStore::open(path.clone()).unwrap();
        assert!(!store.is_authenticated());
        store.set(Some(test_session("u1"))).unwrap();

        let reopened = SessionStore::open(path.clone()).unwrap();
        assert_eq!(reopened.user_id().as_deref(), Some("u1"));

        reopened.set(None).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn expired_session_is_not_restored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut session = test_session("u1");
        session.expires_at = Some(1);
        fs::write(&path, serde_json::to_string(&session).unwrap()).unwrap();

        let store = SessionStore::open(path).unwrap();
        assert!(!store.is_authenticated());
    }

    #[test]
    fn subscribers_see_changes() {
        let store = SessionStore::in_memory();
        let mut rx = store.subscribe();
        store.set(Some(test_session("u2"))).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().user.id, "u2");
    }

    #[test]
    fn display_name_prefers_email() {
        let mut user = test_session("u3").user;
        assert_eq!(user.display_name(), "u3@example.com");
        user.email = None;
        user.phone = Some("+15550100".into());
        assert_eq!(user.display_name(), "+15550100");
    }
}
