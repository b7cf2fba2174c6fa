//! Official-source verification via the remote `verify-source` function.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::analysis::{check_response, decode_structured, percent};
use crate::backend::{FunctionResponse, RemoteFunctions};
use crate::error::{Error, Result};
use crate::kind::AnalysisKind;

pub const VERIFY_FUNCTION: &str = "verify-source";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum VerificationStatus {
    Verified,
    #[default]
    Unverified,
    Misleading,
    LikelyFake,
}

impl From<String> for VerificationStatus {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "verified" => VerificationStatus::Verified,
            "misleading" => VerificationStatus::Misleading,
            "likely_fake" | "fake" => VerificationStatus::LikelyFake,
            _ => VerificationStatus::Unverified,
        }
    }
}

impl VerificationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            VerificationStatus::Verified => "Verified",
            VerificationStatus::Unverified => "Unverified",
            VerificationStatus::Misleading => "Misleading",
            VerificationStatus::LikelyFake => "Likely Fake",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum EntityType {
    Government,
    Company,
    Organization,
    #[default]
    Unknown,
}

impl From<String> for EntityType {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "government" => EntityType::Government,
            "company" => EntityType::Company,
            "organization" | "organisation" => EntityType::Organization,
            _ => EntityType::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum MatchLevel {
    Exact,
    Partial,
    Outdated,
    #[default]
    NotFound,
}

impl From<String> for MatchLevel {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "exact" => MatchLevel::Exact,
            "partial" => MatchLevel::Partial,
            "outdated" => MatchLevel::Outdated,
            _ => MatchLevel::NotFound,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: EntityType,
    #[serde(default)]
    pub official_domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    #[serde(default)]
    pub found_on_official: Option<bool>,
    #[serde(default)]
    pub match_level: MatchLevel,
    #[serde(default)]
    pub discrepancies: Vec<String>,
    #[serde(default)]
    pub last_known_update: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub status: VerificationStatus,
    #[serde(deserialize_with = "percent")]
    pub confidence: u8,
    pub entity: Entity,
    #[serde(default)]
    pub verification: Verification,
    pub explanation: String,
    #[serde(default)]
    pub suggested_action: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl VerificationResult {
    pub fn fallback() -> Self {
        Self {
            status: VerificationStatus::Unverified,
            confidence: 0,
            entity: Entity {
                name: "Unknown".to_string(),
                kind: EntityType::Unknown,
                official_domain: None,
            },
            verification: Verification::default(),
            explanation: "Unable to verify this content. Please check official sources manually."
                .to_string(),
            suggested_action: "Search for official announcements from the relevant authority."
                .to_string(),
            sources: Vec::new(),
        }
    }
}

pub fn decode_verification(response: &FunctionResponse) -> Result<VerificationResult> {
    check_response(response)?;
    Ok(decode_structured(&response.body).unwrap_or_else(|| {
        warn!(bytes = response.body.len(), "verification reply not understood, using fallback");
        VerificationResult::fallback()
    }))
}

#[derive(Clone)]
pub struct VerifyClient {
    functions: Arc<dyn RemoteFunctions>,
}

impl VerifyClient {
    pub fn new(functions: Arc<dyn RemoteFunctions>) -> Self {
        Self { functions }
    }

    pub async fn verify(&self, content: &str, kind: AnalysisKind) -> Result<VerificationResult> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::Validation("Nothing to verify".to_string()));
        }
        debug!(%kind, "verifying against official sources");

        let body = json!({ "content": content, "type": kind.as_str() });
        let response = self.functions.invoke(VERIFY_FUNCTION, &body).await?;
        decode_verification(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::functions::fake::FakeFunctions;

    const SAMPLE: &str = r#"{
        "status": "likely_fake",
        "confidence": 88,
        "entity": {"name": "Internal Revenue Service", "type": "government", "officialDomain": "irs.gov"},
        "verification": {"foundOnOfficial": false, "matchLevel": "not_found",
                         "discrepancies": ["IRS never requests gift cards"], "lastKnownUpdate": null},
        "explanation": "No such program is listed on irs.gov.",
        "suggestedAction": "Check irs.gov directly.",
        "sources": ["https://www.irs.gov/newsroom"]
    }"#;

    #[tokio::test]
    async fn verify_decodes_full_result() {
        let fake = Arc::new(FakeFunctions::new());
        fake.respond(200, SAMPLE);
        let client = VerifyClient::new(fake.clone());

        let result = client
            .verify("IRS refund: pay with gift cards", AnalysisKind::Text)
            .await
            .unwrap();
        assert_eq!(result.status, VerificationStatus::LikelyFake);
        assert_eq!(result.entity.kind, EntityType::Government);
        assert_eq!(result.entity.official_domain.as_deref(), Some("irs.gov"));
        assert_eq!(result.verification.found_on_official, Some(false));
        assert_eq!(result.sources.len(), 1);

        let sent = fake.last_body().unwrap();
        assert_eq!(sent["type"], "text");
        assert_eq!(sent["content"], "IRS refund: pay with gift cards");
    }

    #[test]
    fn unreadable_reply_falls_back() {
        let response = FunctionResponse {
            status: 200,
            body: "I could not find anything.".to_string(),
        };
        let result = decode_verification(&response).unwrap();
        assert_eq!(result, VerificationResult::fallback());
        assert_eq!(result.confidence, 0);
    }

    #[tokio::test]
    async fn empty_content_is_rejected_locally() {
        let fake = Arc::new(FakeFunctions::new());
        let client = VerifyClient::new(fake.clone());
        assert!(client.verify("  ", AnalysisKind::Link).await.is_err());
        assert_eq!(fake.call_count(), 0);
    }
}
