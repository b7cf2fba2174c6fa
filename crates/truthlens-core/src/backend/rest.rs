use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::status_error;
use crate::error::{Error, Result};

/// Thin client for the hosted relational REST interface (`/rest/v1/<table>`).
///
/// Filters use the `column=op.value` query syntax; row-level security on
/// the server scopes every query to the bearer token's user.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl RestClient {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", token))
    }

    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        token: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        debug!(table, ?query, "rest select");
        let response = self
            .authed(self.client.get(self.table_url(table)), token)
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(response.json().await?)
    }

    /// Insert one row and return it as stored.
    pub async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        token: &str,
        row: &B,
    ) -> Result<T> {
        debug!(table, "rest insert");
        let response = self
            .authed(self.client.post(self.table_url(table)), token)
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let mut rows: Vec<T> = response.json().await?;
        if rows.is_empty() {
            return Err(Error::Remote {
                status: 200,
                message: format!("insert into {} returned no rows", table),
            });
        }
        Ok(rows.remove(0))
    }

    pub async fn update<B: Serialize + ?Sized>(
        &self,
        table: &str,
        token: &str,
        filter: &[(&str, String)],
        patch: &B,
    ) -> Result<()> {
        debug!(table, ?filter, "rest update");
        let response = self
            .authed(self.client.patch(self.table_url(table)), token)
            .query(filter)
            .json(patch)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }

    pub async fn delete(&self, table: &str, token: &str, filter: &[(&str, String)]) -> Result<()> {
        debug!(table, ?filter, "rest delete");
        let response = self
            .authed(self.client.delete(self.table_url(table)), token)
            .query(filter)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }
}

/// `column=eq.value`
pub fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{}", value)
}
