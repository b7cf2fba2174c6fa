use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde_json::Value;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

use super::status_error;
use crate::error::{Error, Result};
use crate::session::SessionStore;

/// Raw response chunks of a streaming function call.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

#[derive(Debug, Clone)]
pub struct FunctionResponse {
    pub status: u16,
    pub body: String,
}

impl FunctionResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Named remote functions (`analyze-content`, `verify-source`, `chat-assistant`).
#[async_trait]
pub trait RemoteFunctions: Send + Sync {
    /// Single request/response call. Non-success statuses are returned, not
    /// raised, so callers can read an `{error}` body.
    async fn invoke(&self, name: &str, body: &Value) -> Result<FunctionResponse>;

    /// Streaming call. Non-success statuses are raised as classified errors.
    async fn invoke_stream(&self, name: &str, body: &Value) -> Result<ByteStream>;
}

/// reqwest-backed implementation against `{base_url}/functions/v1/{name}`.
#[derive(Clone)]
pub struct HttpFunctions {
    client: Client,
    base_url: String,
    anon_key: String,
    sessions: SessionStore,
    timeout: Option<Duration>,
}

impl HttpFunctions {
    pub fn new(base_url: &str, anon_key: &str, sessions: SessionStore) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            sessions,
            timeout: None,
        }
    }

    /// Applies to request/response calls only; streams run to completion.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self, name: &str) -> String {
        format!("{}/functions/v1/{}", self.base_url, name)
    }

    fn bearer(&self) -> String {
        let token = self
            .sessions
            .access_token()
            .unwrap_or_else(|| self.anon_key.clone());
        format!("Bearer {}", token)
    }
}

#[async_trait]
impl RemoteFunctions for HttpFunctions {
    async fn invoke(&self, name: &str, body: &Value) -> Result<FunctionResponse> {
        debug!(function = name, "invoking remote function");

        let mut request = self
            .client
            .post(self.url(name))
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer())
            .json(body);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(function = name, status, bytes = body.len(), "remote function returned");

        Ok(FunctionResponse { status, body })
    }

    async fn invoke_stream(&self, name: &str, body: &Value) -> Result<ByteStream> {
        debug!(function = name, "opening remote stream");

        let response = self
            .client
            .post(self.url(name))
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer())
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(Error::from));
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory stand-in for the hosted functions.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    pub enum Reply {
        Response(FunctionResponse),
        Stream(Vec<Vec<u8>>),
        Fail(Error),
    }

    #[derive(Default)]
    pub struct FakeFunctions {
        replies: Mutex<VecDeque<Reply>>,
        pub calls: Mutex<Vec<(String, Value)>>,
    }

    impl FakeFunctions {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, reply: Reply) {
            self.replies.lock().unwrap().push_back(reply);
        }

        pub fn respond(&self, status: u16, body: &str) {
            self.push(Reply::Response(FunctionResponse {
                status,
                body: body.to_string(),
            }));
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn last_body(&self) -> Option<Value> {
            self.calls.lock().unwrap().last().map(|(_, b)| b.clone())
        }

        fn next(&self, name: &str, body: &Value) -> Reply {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), body.clone()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected remote call")
        }
    }

    #[async_trait]
    impl RemoteFunctions for FakeFunctions {
        async fn invoke(&self, name: &str, body: &Value) -> Result<FunctionResponse> {
            match self.next(name, body) {
                Reply::Response(r) => Ok(r),
                Reply::Fail(e) => Err(e),
                Reply::Stream(_) => panic!("stream reply queued for invoke"),
            }
        }

        async fn invoke_stream(&self, name: &str, body: &Value) -> Result<ByteStream> {
            match self.next(name, body) {
                Reply::Stream(chunks) => Ok(Box::pin(futures_util::stream::iter(
                    chunks.into_iter().map(Ok),
                ))),
                Reply::Fail(e) => Err(e),
                Reply::Response(_) => panic!("response reply queued for invoke_stream"),
            }
        }
    }
}
