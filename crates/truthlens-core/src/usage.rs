//! Anonymous usage gating.
//!
//! Advisory only: the counter lives on the user's machine and nothing on
//! the server enforces it. A server-authoritative cap would have to live in
//! the remote functions.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::config::DEFAULT_MAX_FREE_USES;
use crate::error::{Error, Result};
use crate::session::Session;

pub const USAGE_KEY: &str = "truthlens_usage_count";

/// A small persisted string key-value store.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

impl<T: KvStore + ?Sized> KvStore for Box<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

#[derive(Default)]
pub struct MemoryKvStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().map_err(|_| poisoned())?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().map_err(|_| poisoned())?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().map_err(|_| poisoned())?;
        values.remove(key);
        Ok(())
    }
}

/// A JSON object file, rewritten on every mutation.
pub struct FileKvStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileKvStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = fs::read_to_string(&self.path)?;
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            _ => {
                warn!(path = %self.path.display(), "state file is not a JSON object, starting fresh");
                Ok(Map::new())
            }
        }
    }

    fn write(&self, map: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(map)?)?;
        Ok(())
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        Ok(self.read()?.get(key).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        let mut map = self.read()?;
        map.insert(key.to_string(), Value::String(value.to_string()));
        self.write(&map)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| poisoned())?;
        let mut map = self.read()?;
        if map.remove(key).is_some() {
            self.write(&map)?;
        }
        Ok(())
    }
}

fn poisoned() -> Error {
    Error::Storage("state lock poisoned".to_string())
}

/// Remaining free uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Limited(u32),
    Unlimited,
}

impl std::fmt::Display for Remaining {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Remaining::Limited(n) => write!(f, "{}", n),
            Remaining::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// Caps anonymous usage at `cap`; authenticated sessions are unlimited.
///
/// The count only moves up while anonymous. Signing in clears the stored
/// counter; signing out resumes from whatever is stored.
pub struct UsageLimiter<S: KvStore> {
    store: S,
    cap: u32,
    count: u32,
    authenticated: bool,
}

impl<S: KvStore> UsageLimiter<S> {
    pub fn new(store: S) -> Result<Self> {
        Self::with_cap(store, DEFAULT_MAX_FREE_USES)
    }

    pub fn with_cap(store: S, cap: u32) -> Result<Self> {
        let count = read_count(&store)?;
        Ok(Self {
            store,
            cap,
            count,
            authenticated: false,
        })
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn can_use(&self) -> bool {
        self.authenticated || self.count < self.cap
    }

    pub fn remaining(&self) -> Remaining {
        if self.authenticated {
            Remaining::Unlimited
        } else {
            Remaining::Limited(self.cap.saturating_sub(self.count))
        }
    }

    /// Record one use. No-op returning 0 while authenticated.
    pub fn increment(&mut self) -> Result<u32> {
        if self.authenticated {
            return Ok(0);
        }
        let next = self.count.saturating_add(1);
        self.store.set(USAGE_KEY, &next.to_string())?;
        self.count = next;
        debug!(count = next, cap = self.cap, "anonymous usage recorded");
        Ok(next)
    }

    /// React to the auth boundary's session-changed notification.
    pub fn on_session_changed(&mut self, session: Option<&Session>) -> Result<()> {
        match session {
            Some(_) => {
                self.store.remove(USAGE_KEY)?;
                self.count = 0;
                self.authenticated = true;
            }
            None => {
                self.authenticated = false;
                self.count = read_count(&self.store)?;
            }
        }
        Ok(())
    }
}

/// The limiter as shared between the analysis and chat flows.
pub type SharedUsage = Arc<Mutex<UsageLimiter<Box<dyn KvStore>>>>;

pub fn shared(limiter: UsageLimiter<Box<dyn KvStore>>) -> SharedUsage {
    Arc::new(Mutex::new(limiter))
}

/// Check the cap and record one use in a single step.
pub fn consume(usage: &SharedUsage) -> Result<()> {
    let mut limiter = usage.lock().map_err(|_| poisoned())?;
    if !limiter.can_use() {
        return Err(Error::UsageLimitReached);
    }
    limiter.increment()?;
    Ok(())
}

fn read_count<S: KvStore>(store: &S) -> Result<u32> {
    Ok(store
        .get(USAGE_KEY)?
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_session;

    fn limiter_at(count: u32) -> UsageLimiter<MemoryKvStore> {
        let store = MemoryKvStore::new();
        store.set(USAGE_KEY, &count.to_string()).unwrap();
        UsageLimiter::new(store).unwrap()
    }

    #[test]
    fn below_cap_allows_use() {
        for n in 0..3 {
            let limiter = limiter_at(n);
            assert!(limiter.can_use());
            assert_eq!(limiter.remaining(), Remaining::Limited(3 - n));
        }
    }

    #[test]
    fn at_or_above_cap_blocks_use() {
        for n in [3, 4, 10] {
            let limiter = limiter_at(n);
            assert!(!limiter.can_use());
            assert_eq!(limiter.remaining(), Remaining::Limited(0));
        }
    }

    #[test]
    fn increment_persists_count() {
        let mut limiter = limiter_at(0);
        assert_eq!(limiter.increment().unwrap(), 1);
        assert_eq!(limiter.increment().unwrap(), 2);
        assert_eq!(limiter.store.get(USAGE_KEY).unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn sign_in_resets_and_unlocks() {
        let mut limiter = limiter_at(7);
        assert!(!limiter.can_use());

        limiter.on_session_changed(Some(&test_session("u1"))).unwrap();
        assert!(limiter.can_use());
        assert_eq!(limiter.remaining(), Remaining::Unlimited);
        assert_eq!(limiter.count(), 0);
        assert_eq!(limiter.store.get(USAGE_KEY).unwrap(), None);
        assert_eq!(limiter.increment().unwrap(), 0);
    }

    #[test]
    fn sign_out_does_not_rezero() {
        let mut limiter = limiter_at(2);
        limiter.on_session_changed(Some(&test_session("u1"))).unwrap();
        limiter.on_session_changed(None).unwrap();
        // Cleared on sign-in, so resumes from zero, then counts up again.
        assert_eq!(limiter.count(), 0);
        limiter.increment().unwrap();

        limiter.on_session_changed(None).unwrap();
        assert_eq!(limiter.count(), 1);
        assert_eq!(limiter.remaining(), Remaining::Limited(2));
    }

    #[test]
    fn garbage_stored_value_reads_as_zero() {
        let store = MemoryKvStore::new();
        store.set(USAGE_KEY, "-4").unwrap();
        let limiter = UsageLimiter::new(store).unwrap();
        assert_eq!(limiter.count(), 0);
    }

    #[test]
    fn file_store_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut limiter = UsageLimiter::new(FileKvStore::new(path.clone())).unwrap();
        limiter.increment().unwrap();
        limiter.increment().unwrap();

        let reopened = UsageLimiter::new(FileKvStore::new(path)).unwrap();
        assert_eq!(reopened.count(), 2);
        assert_eq!(reopened.remaining(), Remaining::Limited(1));
    }

    #[test]
    fn consume_stops_at_cap() {
        let usage = shared(UsageLimiter::new(Box::new(MemoryKvStore::new()) as Box<dyn KvStore>).unwrap());
        for _ in 0..3 {
            consume(&usage).unwrap();
        }
        assert!(matches!(consume(&usage), Err(Error::UsageLimitReached)));
        assert_eq!(usage.lock().unwrap().count(), 3);
    }

    #[test]
    fn custom_cap() {
        let limiter = UsageLimiter::with_cap(MemoryKvStore::new(), 5).unwrap();
        assert_eq!(limiter.remaining(), Remaining::Limited(5));
    }
}
