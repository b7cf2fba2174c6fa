//! The composed application: usage check, analysis, history, chat, auth.
//!
//! Front-ends hold one [`TruthLens`] and clone it into background tasks;
//! clones share sessions, the usage counter and the analysis state.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisClient, AnalysisRequest, AnalysisResult};
use crate::backend::{
    AuthClient, ByteStream, FunctionResponse, HttpFunctions, RemoteFunctions, RestClient,
};
use crate::chat::ChatSession;
use crate::config::{Config, HistoryBackend};
use crate::error::{Error, Result};
use crate::history::{
    HistoryClient, HistoryFilter, HistoryItem, HistoryStore, NewHistoryItem, RestHistoryStore,
    SqliteHistoryStore,
};
use crate::kind::AnalysisKind;
use crate::session::{Session, SessionStore, User};
use crate::state::AnalysisState;
use crate::stats::DashboardStats;
use crate::usage::{self, FileKvStore, KvStore, Remaining, SharedUsage, UsageLimiter};
use crate::verify::{VerificationResult, VerifyClient};

pub const SESSION_FILE: &str = "session.json";
pub const STATE_FILE: &str = "state.json";
pub const HISTORY_DB: &str = "history.db";

#[derive(Clone)]
pub struct TruthLens {
    config: Config,
    sessions: SessionStore,
    usage: SharedUsage,
    functions: Arc<dyn RemoteFunctions>,
    history: Arc<dyn HistoryStore>,
    auth: Option<AuthClient>,
    analysis: AnalysisClient,
    verify: VerifyClient,
    state: Arc<Mutex<AnalysisState>>,
}

impl TruthLens {
    pub fn new(
        config: Config,
        sessions: SessionStore,
        store: Box<dyn KvStore>,
        functions: Arc<dyn RemoteFunctions>,
        history: Arc<dyn HistoryStore>,
        auth: Option<AuthClient>,
    ) -> Result<Self> {
        let mut limiter = UsageLimiter::with_cap(store, config.max_free_uses)?;
        limiter.on_session_changed(sessions.current().as_ref())?;

        Ok(Self {
            analysis: AnalysisClient::new(functions.clone()),
            verify: VerifyClient::new(functions.clone()),
            config,
            sessions,
            usage: usage::shared(limiter),
            functions,
            history,
            auth,
            state: Arc::new(Mutex::new(AnalysisState::Idle)),
        })
    }

    /// Wire everything against the hosted backend, with local state files
    /// in the config directory.
    pub fn from_config(config: Config) -> Result<Self> {
        let dir = Config::state_dir()?;
        Self::open_in(config, &dir)
    }

    pub fn open_in(config: Config, dir: &Path) -> Result<Self> {
        let base_url = config.backend_url()?;
        let anon_key = config.anon_key()?;

        let sessions = SessionStore::open(dir.join(SESSION_FILE))?;
        let store: Box<dyn KvStore> = Box::new(FileKvStore::new(dir.join(STATE_FILE)));
        let functions = HttpFunctions::new(&base_url, &anon_key, sessions.clone())
            .with_timeout(config.request_timeout());
        let history: Arc<dyn HistoryStore> = match config.history_backend {
            HistoryBackend::Remote => {
                Arc::new(RestHistoryStore::new(RestClient::new(&base_url, &anon_key)))
            }
            HistoryBackend::Local => Arc::new(SqliteHistoryStore::open(&dir.join(HISTORY_DB))?),
        };
        debug!(backend = ?config.history_backend, dir = %dir.display(), "truthlens wired");

        Self::new(
            config,
            sessions,
            store,
            Arc::new(functions),
            history,
            Some(AuthClient::new(&base_url, &anon_key)),
        )
    }

    /// Like [`TruthLens::from_config`], but a missing backend is not an
    /// error. Only local state works then: usage, sessions, sign-out.
    pub fn local_from_config(config: Config) -> Result<Self> {
        let dir = Config::state_dir()?;
        Self::open_local_in(config, &dir)
    }

    pub fn open_local_in(config: Config, dir: &Path) -> Result<Self> {
        let missing = match (config.backend_url(), config.anon_key()) {
            (Ok(_), Ok(_)) => return Self::open_in(config, dir),
            (Err(err), _) | (_, Err(err)) => err.user_message(),
        };
        debug!(dir = %dir.display(), "truthlens wired without a backend");

        let sessions = SessionStore::open(dir.join(SESSION_FILE))?;
        let store: Box<dyn KvStore> = Box::new(FileKvStore::new(dir.join(STATE_FILE)));
        let unconfigured = Arc::new(Unconfigured(missing));
        Self::new(config, sessions, store, unconfigured.clone(), unconfigured, None)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn user(&self) -> Option<User> {
        self.sessions.current().map(|s| s.user)
    }

    fn limiter(&self) -> Result<MutexGuard<'_, UsageLimiter<Box<dyn KvStore>>>> {
        self.usage
            .lock()
            .map_err(|_| Error::Storage("usage lock poisoned".to_string()))
    }

    pub fn remaining(&self) -> Result<Remaining> {
        Ok(self.limiter()?.remaining())
    }

    pub fn can_use(&self) -> Result<bool> {
        Ok(self.limiter()?.can_use())
    }

    pub fn analysis_state(&self) -> AnalysisState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_state(&self, next: AnalysisState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    /// Back to the empty input view.
    pub fn clear_result(&self) {
        self.set_state(AnalysisState::Idle);
    }

    /// Run one analysis.
    ///
    /// Nothing is sent when the free uses are exhausted or the input is
    /// invalid; the state is left as it was. A successful result replaces
    /// the previous one and is recorded to history when signed in.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult> {
        if !self.can_use()? {
            info!("analysis blocked, free uses exhausted");
            return Err(Error::UsageLimitReached);
        }
        request.validate()?;
        usage::consume(&self.usage)?;

        self.set_state(AnalysisState::Loading);
        match self.analysis.analyze(&request).await {
            Ok(result) => {
                self.set_state(AnalysisState::Ready(result.clone()));
                if self.config.save_history {
                    self.record(&request, &result).await;
                }
                Ok(result)
            }
            Err(err) => {
                warn!(error = %err, kind = %request.kind(), "analysis failed");
                self.set_state(AnalysisState::Failed(err.user_message()));
                Err(err)
            }
        }
    }

    async fn record(&self, request: &AnalysisRequest, result: &AnalysisResult) {
        let Some(session) = self.sessions.current() else {
            return;
        };
        let row = NewHistoryItem::from_result(
            &session.user.id,
            request.kind(),
            request.history_content(),
            result,
        );
        // History is best effort; the result is already shown.
        if let Err(err) = self.history.insert(&session, &row).await {
            warn!(error = %err, "could not save analysis to history");
        }
    }

    pub async fn verify(&self, content: &str, kind: AnalysisKind) -> Result<VerificationResult> {
        self.verify.verify(content, kind).await
    }

    /// A fresh chat sharing this instance's usage counter.
    pub fn chat(&self) -> ChatSession {
        ChatSession::new(self.functions.clone(), self.usage.clone())
    }

    pub fn history(&self) -> HistoryClient {
        HistoryClient::new(self.history.clone(), self.sessions.clone())
    }

    pub async fn dashboard(&self, today: chrono::NaiveDate) -> Result<DashboardStats> {
        let mut history = self.history();
        let items = history.list(HistoryFilter::All).await?;
        Ok(DashboardStats::from_items(items, today))
    }

    /// Replace the session and let the usage counter react to it.
    pub fn set_session(&self, session: Option<Session>) -> Result<()> {
        self.sessions.set(session.clone())?;
        self.limiter()?.on_session_changed(session.as_ref())
    }

    fn auth(&self) -> Result<&AuthClient> {
        self.auth
            .as_ref()
            .ok_or_else(|| Error::Auth("Sign-in is not available".to_string()))
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<()> {
        self.auth()?.sign_up(email, password).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        let session = self.auth()?.sign_in_with_password(email, password).await?;
        let user = session.user.clone();
        self.set_session(Some(session))?;
        info!(user = %user.display_name(), "signed in");
        Ok(user)
    }

    pub async fn send_phone_otp(&self, phone: &str) -> Result<()> {
        self.auth()?.send_phone_otp(phone).await
    }

    pub async fn verify_phone_otp(&self, phone: &str, code: &str) -> Result<User> {
        let session = self.auth()?.verify_phone_otp(phone, code).await?;
        let user = session.user.clone();
        self.set_session(Some(session))?;
        info!(user = %user.display_name(), "signed in with phone");
        Ok(user)
    }

    /// Drops the local session even when the remote logout fails.
    pub async fn sign_out(&self) -> Result<()> {
        if let (Some(session), Some(auth)) = (self.sessions.current(), self.auth.as_ref()) {
            if let Err(err) = auth.sign_out(&session).await {
                warn!(error = %err, "remote sign-out failed");
            }
        }
        self.set_session(None)?;
        info!("signed out");
        Ok(())
    }
}

/// Stands in for the hosted services when none is configured.
struct Unconfigured(String);

impl Unconfigured {
    fn error(&self) -> Error {
        Error::Validation(self.0.clone())
    }
}

#[async_trait]
impl RemoteFunctions for Unconfigured {
    async fn invoke(&self, _name: &str, _body: &Value) -> Result<FunctionResponse> {
        Err(self.error())
    }

    async fn invoke_stream(&self, _name: &str, _body: &Value) -> Result<ByteStream> {
        Err(self.error())
    }
}

#[async_trait]
impl HistoryStore for Unconfigured {
    async fn list(&self, _session: &Session, _filter: HistoryFilter) -> Result<Vec<HistoryItem>> {
        Err(self.error())
    }

    async fn insert(&self, _session: &Session, _item: &NewHistoryItem) -> Result<HistoryItem> {
        Err(self.error())
    }

    async fn set_bookmarked(&self, _session: &Session, _id: &str, _bookmarked: bool) -> Result<()> {
        Err(self.error())
    }

    async fn delete(&self, _session: &Session, _id: &str) -> Result<()> {
        Err(self.error())
    }
}
