use async_trait::async_trait;
use serde_json::json;

use super::{HistoryFilter, HistoryItem, HistoryStore, NewHistoryItem, HISTORY_TABLE};
use crate::backend::rest::eq;
use crate::backend::RestClient;
use crate::error::Result;
use crate::session::Session;

/// History in the hosted `analysis_history` table.
///
/// Row-level security restricts every query to the bearer's own rows, so no
/// explicit user filter is sent.
#[derive(Clone)]
pub struct RestHistoryStore {
    rest: RestClient,
}

impl RestHistoryStore {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }
}

pub(crate) fn list_query(filter: HistoryFilter) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("select", "*".to_string()),
        ("order", "created_at.desc".to_string()),
    ];
    if filter == HistoryFilter::Bookmarked {
        query.push(("is_bookmarked", eq(true)));
    }
    query
}

#[async_trait]
impl HistoryStore for RestHistoryStore {
    async fn list(&self, session: &Session, filter: HistoryFilter) -> Result<Vec<HistoryItem>> {
        self.rest
            .select(HISTORY_TABLE, &session.access_token, &list_query(filter))
            .await
    }

    async fn insert(&self, session: &Session, item: &NewHistoryItem) -> Result<HistoryItem> {
        self.rest
            .insert(HISTORY_TABLE, &session.access_token, item)
            .await
    }

    async fn set_bookmarked(&self, session: &Session, id: &str, bookmarked: bool) -> Result<()> {
        self.rest
            .update(
                HISTORY_TABLE,
                &session.access_token,
                &[("id", eq(id))],
                &json!({ "is_bookmarked": bookmarked }),
            )
            .await
    }

    async fn delete(&self, session: &Session, id: &str) -> Result<()> {
        self.rest
            .delete(HISTORY_TABLE, &session.access_token, &[("id", eq(id))])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bookmarked_filter_adds_eq_clause() {
        let all = list_query(HistoryFilter::All);
        assert_eq!(all, vec![("select", "*".to_string()), ("order", "created_at.desc".to_string())]);

        let bookmarked = list_query(HistoryFilter::Bookmarked);
        assert_eq!(bookmarked.last().unwrap(), &("is_bookmarked", "eq.true".to_string()));
    }
}
