pub mod analysis;
pub mod app;
pub mod backend;
pub mod chat;
pub mod config;
pub mod error;
pub mod history;
pub mod kind;
pub mod session;
pub mod sse;
pub mod state;
pub mod stats;
pub mod usage;
pub mod util;
pub mod verify;

// Re-export main types for convenience
pub use analysis::{AnalysisClient, AnalysisRequest, AnalysisResult, Evidence, EvidenceKind, Indicator, Verdict};
pub use app::TruthLens;
pub use chat::ChatSession;
pub use config::{Config, HistoryBackend};
pub use error::{Error, Result};
pub use history::{HistoryClient, HistoryFilter, HistoryItem, HistoryStore};
pub use kind::AnalysisKind;
pub use session::{Session, SessionStore, User};
pub use sse::{SseEvent, SseParser};
pub use state::{AnalysisState, ChatMessage, ChatRole};
pub use stats::DashboardStats;
pub use usage::{KvStore, Remaining, UsageLimiter};
pub use verify::{VerificationResult, VerificationStatus, VerifyClient};
