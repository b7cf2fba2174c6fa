//! UI-agnostic application state types
//!
//! Shared between front-ends; nothing here depends on a UI framework.

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisResult;

/// A chat message in the assistant conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Lifecycle of the analysis panel.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AnalysisState {
    #[default]
    Idle,
    Loading,
    Ready(AnalysisResult),
    /// A request failed; the message is what the notification shows.
    Failed(String),
}

impl AnalysisState {
    pub fn is_loading(&self) -> bool {
        matches!(self, AnalysisState::Loading)
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            AnalysisState::Ready(result) => Some(result),
            _ => None,
        }
    }
}
