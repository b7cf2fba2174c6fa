//! Past analyses of the signed-in user.
//!
//! Rows live behind a [`HistoryStore`]; [`HistoryClient`] holds the list
//! the UI is showing and applies bookmark and delete changes to it.

mod rest;
mod sqlite;

pub use rest::RestHistoryStore;
pub use sqlite::SqliteHistoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::analysis::{percent, AnalysisResult, Evidence, Indicator, Verdict};
use crate::error::{Error, Result};
use crate::kind::AnalysisKind;
use crate::session::{Session, SessionStore};

pub const HISTORY_TABLE: &str = "analysis_history";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryFilter {
    #[default]
    All,
    Bookmarked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    pub analysis_type: AnalysisKind,
    #[serde(default)]
    pub content: Option<String>,
    pub verdict: String,
    #[serde(deserialize_with = "percent")]
    pub confidence: u8,
    pub explanation: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub indicators: Vec<Indicator>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub is_bookmarked: bool,
    pub created_at: DateTime<Utc>,
}

impl HistoryItem {
    pub fn verdict(&self) -> Verdict {
        Verdict::parse(&self.verdict)
    }

    /// Rebuild a displayable result from the stored row.
    pub fn to_result(&self) -> AnalysisResult {
        AnalysisResult {
            verdict: self.verdict(),
            confidence: self.confidence,
            explanation: self.explanation.clone(),
            indicators: self.indicators.clone(),
            evidence: self.evidence.clone(),
            suggested_action: String::new(),
        }
    }

    fn matches(&self, needle: &str) -> bool {
        self.content
            .as_deref()
            .map(|c| c.to_lowercase().contains(needle))
            .unwrap_or(false)
            || self.explanation.to_lowercase().contains(needle)
    }
}

/// Stored rows may carry `null` or a differently shaped blob here.
fn lenient_list<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default())
}

/// Row written after a successful analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewHistoryItem {
    pub user_id: String,
    pub analysis_type: AnalysisKind,
    pub content: Option<String>,
    pub verdict: String,
    pub confidence: u8,
    pub explanation: String,
    pub indicators: Vec<Indicator>,
    pub evidence: Vec<Evidence>,
}

impl NewHistoryItem {
    pub fn from_result(
        user_id: &str,
        kind: AnalysisKind,
        content: Option<String>,
        result: &AnalysisResult,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            analysis_type: kind,
            content,
            verdict: result.verdict.as_str().to_string(),
            confidence: result.confidence,
            explanation: result.explanation.clone(),
            indicators: result.indicators.clone(),
            evidence: result.evidence.clone(),
        }
    }
}

/// Persistence for history rows, scoped to the session's user.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Newest first.
    async fn list(&self, session: &Session, filter: HistoryFilter) -> Result<Vec<HistoryItem>>;
    async fn insert(&self, session: &Session, item: &NewHistoryItem) -> Result<HistoryItem>;
    async fn set_bookmarked(&self, session: &Session, id: &str, bookmarked: bool) -> Result<()>;
    async fn delete(&self, session: &Session, id: &str) -> Result<()>;
}

pub struct HistoryClient {
    store: Arc<dyn HistoryStore>,
    sessions: SessionStore,
    items: Vec<HistoryItem>,
    filter: HistoryFilter,
}

impl HistoryClient {
    pub fn new(store: Arc<dyn HistoryStore>, sessions: SessionStore) -> Self {
        Self {
            store,
            sessions,
            items: Vec::new(),
            filter: HistoryFilter::All,
        }
    }

    pub fn items(&self) -> &[HistoryItem] {
        &self.items
    }

    pub fn filter(&self) -> HistoryFilter {
        self.filter
    }

    /// Fetch the full list for `filter`. Signed out yields an empty list.
    pub async fn list(&mut self, filter: HistoryFilter) -> Result<&[HistoryItem]> {
        self.filter = filter;
        self.items = match self.sessions.current() {
            Some(session) => self.store.list(&session, filter).await?,
            None => Vec::new(),
        };
        debug!(count = self.items.len(), ?filter, "history loaded");
        Ok(&self.items)
    }

    /// Flip the bookmark locally, then persist it. Returns the new state.
    ///
    /// The local flip is undone if the store rejects the update. Signed out
    /// or an id missing from the loaded list is an error; nothing is sent.
    pub async fn toggle_bookmark(&mut self, id: &str) -> Result<bool> {
        let Some(session) = self.sessions.current() else {
            return Err(Error::Auth("Please sign in to bookmark analyses".to_string()));
        };
        let Some(item) = self.items.iter_mut().find(|i| i.id == id) else {
            return Err(Error::Validation(format!("No analysis {} in history", id)));
        };
        item.is_bookmarked = !item.is_bookmarked;
        let bookmarked = item.is_bookmarked;

        if let Err(err) = self.store.set_bookmarked(&session, id, bookmarked).await {
            warn!(%id, error = %err, "bookmark update failed, reverting");
            if let Some(item) = self.items.iter_mut().find(|i| i.id == id) {
                item.is_bookmarked = !bookmarked;
            }
            return Err(err);
        }
        Ok(bookmarked)
    }

    pub async fn delete(&mut self, id: &str) -> Result<()> {
        let Some(session) = self.sessions.current() else {
            return Ok(());
        };
        self.store.delete(&session, id).await?;
        self.items.retain(|i| i.id != id);
        Ok(())
    }

    /// Store a completed analysis. Does nothing when signed out.
    pub async fn record(
        &mut self,
        kind: AnalysisKind,
        content: Option<String>,
        result: &AnalysisResult,
    ) -> Result<Option<HistoryItem>> {
        let Some(session) = self.sessions.current() else {
            return Ok(None);
        };
        let row = NewHistoryItem::from_result(&session.user.id, kind, content, result);
        let stored = self.store.insert(&session, &row).await?;
        if self.filter == HistoryFilter::All {
            self.items.insert(0, stored.clone());
        }
        Ok(Some(stored))
    }

    /// Case-insensitive match on content or explanation over the loaded list.
    pub fn search(&self, query: &str) -> Vec<&HistoryItem> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.items.iter().collect();
        }
        self.items.iter().filter(|i| i.matches(&needle)).collect()
    }
}


#[cfg(test)]
pub(crate) fn item(id: &str, verdict: &str, bookmarked: bool, age_days: i64) -> HistoryItem {
    HistoryItem {
        id: id.to_string(),
        analysis_type: AnalysisKind::Text,
        content: Some(format!("content of {id}")),
        verdict: verdict.to_string(),
        confidence: 80,
        explanation: format!("explanation for {id}"),
        indicators: Vec::new(),
        evidence: Vec::new(),
        is_bookmarked: bookmarked,
        created_at: Utc::now() - chrono::Duration::days(age_days),
    }
}
