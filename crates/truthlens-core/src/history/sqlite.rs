use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

use super::{HistoryFilter, HistoryItem, HistoryStore, NewHistoryItem};
use crate::error::{Error, Result};
use crate::kind::AnalysisKind;
use crate::session::Session;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS analysis_history (
    id            TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL,
    analysis_type TEXT NOT NULL,
    content       TEXT,
    verdict       TEXT NOT NULL,
    confidence    INTEGER NOT NULL,
    explanation   TEXT NOT NULL,
    indicators    TEXT NOT NULL,
    evidence      TEXT NOT NULL,
    is_bookmarked INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_history_user_created
    ON analysis_history (user_id, created_at DESC);
";

const COLUMNS: &str = "id, analysis_type, content, verdict, confidence, explanation, \
                       indicators, evidence, is_bookmarked, created_at";

/// History kept in a local SQLite file, for offline use.
///
/// Queries run on tokio's blocking pool, never on a runtime worker.
pub struct SqliteHistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistoryStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| Error::Storage("history database lock poisoned".to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| Error::Storage(format!("history database task failed: {}", e)))?
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    // Fixed width so text order is time order.
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<HistoryItem> {
    let kind: String = row.get(1)?;
    let created_at: String = row.get(9)?;
    Ok(HistoryItem {
        id: row.get(0)?,
        analysis_type: AnalysisKind::from_str(&kind).unwrap_or(AnalysisKind::Text),
        content: row.get(2)?,
        verdict: row.get(3)?,
        confidence: row.get::<_, i64>(4)?.clamp(0, 100) as u8,
        explanation: row.get(5)?,
        indicators: serde_json::from_str(&row.get::<_, String>(6)?).unwrap_or_default(),
        evidence: serde_json::from_str(&row.get::<_, String>(7)?).unwrap_or_default(),
        is_bookmarked: row.get(8)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_default(),
    })
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn list(&self, session: &Session, filter: HistoryFilter) -> Result<Vec<HistoryItem>> {
        let user_id = session.user.id.clone();
        self.with_conn(move |conn| {
            let sql = match filter {
                HistoryFilter::All => format!(
                    "SELECT {COLUMNS} FROM analysis_history WHERE user_id = ?1 \
                     ORDER BY created_at DESC, rowid DESC"
                ),
                HistoryFilter::Bookmarked => format!(
                    "SELECT {COLUMNS} FROM analysis_history WHERE user_id = ?1 \
                     AND is_bookmarked = 1 ORDER BY created_at DESC, rowid DESC"
                ),
            };
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![user_id], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn insert(&self, session: &Session, item: &NewHistoryItem) -> Result<HistoryItem> {
        let stored = HistoryItem {
            id: Uuid::new_v4().to_string(),
            analysis_type: item.analysis_type,
            content: item.content.clone(),
            verdict: item.verdict.clone(),
            confidence: item.confidence,
            explanation: item.explanation.clone(),
            indicators: item.indicators.clone(),
            evidence: item.evidence.clone(),
            is_bookmarked: false,
            created_at: Utc::now(),
        };
        let indicators = serde_json::to_string(&stored.indicators)?;
        let evidence = serde_json::to_string(&stored.evidence)?;
        let user_id = session.user.id.clone();
        let row = stored.clone();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO analysis_history (id, user_id, analysis_type, content, verdict, \
                 confidence, explanation, indicators, evidence, is_bookmarked, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)",
                params![
                    row.id,
                    user_id,
                    row.analysis_type.as_str(),
                    row.content,
                    row.verdict,
                    row.confidence,
                    row.explanation,
                    indicators,
                    evidence,
                    timestamp(row.created_at),
                ],
            )?;
            Ok(())
        })
        .await?;
        debug!(id = %stored.id, "history row stored locally");
        Ok(stored)
    }

    async fn set_bookmarked(&self, session: &Session, id: &str, bookmarked: bool) -> Result<()> {
        let (id, user_id) = (id.to_string(), session.user.id.clone());
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE analysis_history SET is_bookmarked = ?1 WHERE id = ?2 AND user_id = ?3",
                params![bookmarked, id, user_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, session: &Session, id: &str) -> Result<()> {
        let (id, user_id) = (id.to_string(), session.user.id.clone());
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM analysis_history WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::sample_result;
    use crate::session::test_session;

    fn row(user: &str, content: &str) -> NewHistoryItem {
        NewHistoryItem::from_result(user, AnalysisKind::Text, Some(content.to_string()), &sample_result())
    }

    #[tokio::test]
    async fn rows_come_back_newest_first() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        let session = test_session("u1");
        for content in ["first", "second", "third"] {
            store.insert(&session, &row("u1", content)).await.unwrap();
        }
        let items = store.list(&session, HistoryFilter::All).await.unwrap();
        let contents: Vec<_> = items.iter().map(|i| i.content.clone().unwrap()).collect();
        assert_eq!(contents, vec!["third", "second", "first"]);
        assert_eq!(items[0].indicators, sample_result().indicators);
    }

    #[tokio::test]
    async fn bookmark_filter_and_update() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        let session = test_session("u1");
        let a = store.insert(&session, &row("u1", "a")).await.unwrap();
        store.insert(&session, &row("u1", "b")).await.unwrap();

        store.set_bookmarked(&session, &a.id, true).await.unwrap();
        let marked = store.list(&session, HistoryFilter::Bookmarked).await.unwrap();
        assert_eq!(marked.len(), 1);
        assert_eq!(marked[0].id, a.id);
        assert!(marked[0].is_bookmarked);
    }

    #[tokio::test]
    async fn rows_are_scoped_to_their_user() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        let owner = test_session("u1");
        let other = test_session("u2");
        let a = store.insert(&owner, &row("u1", "mine")).await.unwrap();

        assert!(store.list(&other, HistoryFilter::All).await.unwrap().is_empty());
        store.delete(&other, &a.id).await.unwrap();
        assert_eq!(store.list(&owner, HistoryFilter::All).await.unwrap().len(), 1);

        store.delete(&owner, &a.id).await.unwrap();
        assert!(store.list(&owner, HistoryFilter::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn queries_leave_the_runtime_thread() {
        let store = SqliteHistoryStore::in_memory().unwrap();
        let caller = std::thread::current().id();
        let worker = store
            .with_conn(|_| Ok(std::thread::current().id()))
            .await
            .unwrap();
        assert_ne!(worker, caller);
    }

    #[tokio::test]
    async fn file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        let session = test_session("u1");
        {
            let store = SqliteHistoryStore::open(&path).unwrap();
            store.insert(&session, &row("u1", "kept")).await.unwrap();
        }
        let reopened = SqliteHistoryStore::open(&path).unwrap();
        assert_eq!(reopened.list(&session, HistoryFilter::All).await.unwrap().len(), 1);
    }
}
