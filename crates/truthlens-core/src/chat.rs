//! The follow-up chat assistant.

use futures_util::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::analysis::AnalysisResult;
use crate::backend::RemoteFunctions;
use crate::error::{Error, Result};
use crate::sse::{SseEvent, SseParser};
use crate::state::{ChatMessage, ChatRole};
use crate::usage::{self, SharedUsage};

pub const CHAT_FUNCTION: &str = "chat-assistant";

/// Greeting shown when a chat is opened on top of an analysis.
pub fn welcome_message(result: &AnalysisResult) -> String {
    format!(
        "I've analyzed your content and found it to be **{}** with {}% confidence.\n\n{}\n\n\
         Feel free to ask me any questions about this analysis or anything related to \
         fact-checking and misinformation!",
        result.verdict.as_str(),
        result.confidence,
        result.explanation
    )
}

/// An append-only transcript plus the streaming send loop.
///
/// Held in memory for the lifetime of one open chat; never persisted.
pub struct ChatSession {
    functions: Arc<dyn RemoteFunctions>,
    usage: SharedUsage,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(functions: Arc<dyn RemoteFunctions>, usage: SharedUsage) -> Self {
        Self {
            functions,
            usage,
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Insert the welcome summary of `result`. Only an empty chat is seeded.
    pub fn seed_from(&mut self, result: &AnalysisResult) {
        if self.messages.is_empty() {
            self.messages.push(ChatMessage::assistant(welcome_message(result)));
        }
    }

    pub fn reset(&mut self) {
        self.messages.clear();
    }

    /// Send `message` and stream the reply into one new assistant entry.
    ///
    /// `on_delta` sees the running reply after every applied token. On
    /// failure the partial reply is removed and the user message kept.
    pub async fn send<F>(
        &mut self,
        message: &str,
        context: Option<&AnalysisResult>,
        mut on_delta: F,
    ) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        let message = message.trim();
        if message.is_empty() {
            return Err(Error::Validation("Please type a message".to_string()));
        }
        usage::consume(&self.usage)?;

        self.messages.push(ChatMessage::user(message));
        let body = self.request_body(context);
        self.messages.push(ChatMessage::assistant(String::new()));
        let slot = self.messages.len() - 1;

        match self.stream_into(slot, &body, &mut on_delta).await {
            Ok(()) if !self.messages[slot].content.is_empty() => {
                debug!(chars = self.messages[slot].content.len(), "chat reply complete");
                Ok(self.messages[slot].content.clone())
            }
            Ok(()) => {
                self.messages.remove(slot);
                Err(Error::Remote {
                    status: 200,
                    message: "empty reply".to_string(),
                })
            }
            Err(err) => {
                warn!(error = %err, "chat stream failed");
                self.messages.remove(slot);
                Err(err)
            }
        }
    }

    fn request_body(&self, context: Option<&AnalysisResult>) -> Value {
        let mut body = json!({ "messages": self.messages });
        if let Some(result) = context {
            body["analysisContext"] = json!(result);
        }
        body
    }

    async fn stream_into<F>(&mut self, slot: usize, body: &Value, on_delta: &mut F) -> Result<()>
    where
        F: FnMut(&str) + Send,
    {
        let mut stream = self.functions.invoke_stream(CHAT_FUNCTION, body).await?;
        let mut parser = SseParser::new();

        while let Some(chunk) = stream.next().await {
            let events = parser.feed(&chunk?);
            self.apply(slot, events, on_delta);
            if parser.is_done() {
                return Ok(());
            }
        }
        let events = parser.finish();
        self.apply(slot, events, on_delta);
        Ok(())
    }

    fn apply<F: FnMut(&str)>(&mut self, slot: usize, events: Vec<SseEvent>, on_delta: &mut F) {
        let entry = &mut self.messages[slot];
        debug_assert_eq!(entry.role, ChatRole::Assistant);
        for event in events {
            if let SseEvent::Delta(text) = event {
                entry.content.push_str(&text);
                on_delta(&entry.content);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::sample_result;
    use crate::backend::functions::fake::{FakeFunctions, Reply};
    use crate::usage::{KvStore, MemoryKvStore, UsageLimiter, USAGE_KEY};

    fn usage_at(count: u32) -> SharedUsage {
        let store = MemoryKvStore::new();
        store.set(USAGE_KEY, &count.to_string()).unwrap();
        usage::shared(UsageLimiter::new(Box::new(store) as Box<dyn KvStore>).unwrap())
    }

    fn delta(text: &str) -> Vec<u8> {
        format!("data: {}\n\n", json!({"choices": [{"delta": {"content": text}}]})).into_bytes()
    }

    #[tokio::test]
    async fn reply_streams_into_one_entry_in_order() {
        let fake = Arc::new(FakeFunctions::new());
        let mut chunks = vec![delta("Lottery "), delta("scams ")];
        let mut tail = delta("ask for fees.");
        tail.extend_from_slice(b"data: [DONE]\n\n");
        // Break the last chunk mid-line.
        let cut = tail.len() / 2;
        chunks.push(tail[..cut].to_vec());
        chunks.push(tail[cut..].to_vec());
        fake.push(Reply::Stream(chunks));

        let mut chat = ChatSession::new(fake.clone(), usage_at(0));
        let mut seen = Vec::new();
        let reply = chat
            .send("Why is this fake?", None, |partial| seen.push(partial.to_string()))
            .await
            .unwrap();

        assert_eq!(reply, "Lottery scams ask for fees.");
        assert_eq!(seen, vec!["Lottery ", "Lottery scams ", "Lottery scams ask for fees."]);
        assert_eq!(chat.messages().len(), 2);
        assert_eq!(chat.messages()[0], ChatMessage::user("Why is this fake?"));
        assert_eq!(chat.messages()[1].role, ChatRole::Assistant);
    }

    #[tokio::test]
    async fn seeded_context_is_sent() {
        let fake = Arc::new(FakeFunctions::new());
        fake.push(Reply::Stream(vec![delta("Sure."), b"data: [DONE]\n".to_vec()]));
        let result = sample_result();

        let mut chat = ChatSession::new(fake.clone(), usage_at(0));
        chat.seed_from(&result);
        assert!(chat.messages()[0].content.contains("**fake** with 92% confidence"));
        chat.send("Explain", Some(&result), |_| {}).await.unwrap();

        let body = fake.last_body().unwrap();
        assert_eq!(fake.calls.lock().unwrap()[0].0, CHAT_FUNCTION);
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["analysisContext"]["verdict"], "fake");
    }

    #[tokio::test]
    async fn failure_removes_partial_reply() {
        let fake = Arc::new(FakeFunctions::new());
        fake.push(Reply::Fail(Error::classify(429, "Rate limit exceeded")));
        let mut chat = ChatSession::new(fake.clone(), usage_at(0));

        let err = chat.send("hello", None, |_| {}).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited(_)));
        assert_eq!(chat.messages(), &[ChatMessage::user("hello")]);
    }

    #[tokio::test]
    async fn quota_failure_is_distinguished() {
        let fake = Arc::new(FakeFunctions::new());
        fake.push(Reply::Fail(Error::classify(402, "Payment required")));
        let mut chat = ChatSession::new(fake, usage_at(0));
        let err = chat.send("hello", None, |_| {}).await.unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded(_)));
    }

    #[tokio::test]
    async fn mid_stream_error_removes_partial_reply() {
        struct Broken;

        #[async_trait::async_trait]
        impl RemoteFunctions for Broken {
            async fn invoke(&self, _: &str, _: &Value) -> Result<crate::backend::FunctionResponse> {
                unreachable!()
            }

            async fn invoke_stream(&self, _: &str, _: &Value) -> Result<crate::backend::ByteStream> {
                let items: Vec<Result<Vec<u8>>> = vec![
                    Ok(delta("partial")),
                    Err(Error::Remote {
                        status: 0,
                        message: "connection reset".into(),
                    }),
                ];
                Ok(Box::pin(futures_util::stream::iter(items)))
            }
        }

        let mut chat = ChatSession::new(Arc::new(Broken), usage_at(0));
        assert!(chat.send("hello", None, |_| {}).await.is_err());
        assert_eq!(chat.messages().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_usage_blocks_send() {
        let fake = Arc::new(FakeFunctions::new());
        let usage = usage_at(3);
        let mut chat = ChatSession::new(fake.clone(), usage);

        let err = chat.send("hello", None, |_| {}).await.unwrap_err();
        assert!(matches!(err, Error::UsageLimitReached));
        assert_eq!(fake.call_count(), 0);
        assert!(chat.is_empty());
    }

    #[tokio::test]
    async fn send_counts_against_anonymous_usage() {
        let fake = Arc::new(FakeFunctions::new());
        fake.push(Reply::Stream(vec![delta("ok"), b"data: [DONE]\n".to_vec()]));
        let usage = usage_at(1);
        let mut chat = ChatSession::new(fake, usage.clone());
        chat.send("hello", None, |_| {}).await.unwrap();
        assert_eq!(usage.lock().unwrap().count(), 2);
    }

    #[tokio::test]
    async fn blank_message_is_rejected() {
        let fake = Arc::new(FakeFunctions::new());
        let mut chat = ChatSession::new(fake.clone(), usage_at(0));
        assert!(matches!(
            chat.send("   ", None, |_| {}).await,
            Err(Error::Validation(_))
        ));
        assert_eq!(fake.call_count(), 0);
    }

    #[test]
    fn reset_clears_and_allows_reseed() {
        let mut chat = ChatSession::new(Arc::new(FakeFunctions::new()), usage_at(0));
        chat.seed_from(&sample_result());
        chat.seed_from(&sample_result());
        assert_eq!(chat.messages().len(), 1);
        chat.reset();
        assert!(chat.is_empty());
    }
}
