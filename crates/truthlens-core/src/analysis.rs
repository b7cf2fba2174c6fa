//! Content analysis: request building, the remote `analyze-content` call,
//! and decoding of whatever the model sent back.

use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::{FunctionResponse, RemoteFunctions};
use crate::error::{Error, Result};
use crate::kind::AnalysisKind;
use crate::util::extract_json_object;

pub const ANALYZE_FUNCTION: &str = "analyze-content";

/// Advisory upper bound on uploaded images.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// What the user submitted. Exactly one payload per variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisRequest {
    Text { content: String },
    Link { url: String },
    Image { bytes: Vec<u8> },
}

impl AnalysisRequest {
    pub fn text(content: impl Into<String>) -> Self {
        AnalysisRequest::Text {
            content: content.into(),
        }
    }

    pub fn link(url: impl Into<String>) -> Self {
        AnalysisRequest::Link { url: url.into() }
    }

    pub fn image(bytes: Vec<u8>) -> Self {
        AnalysisRequest::Image { bytes }
    }

    /// Build a request from front-end input; for images `input` is a file path.
    pub async fn from_input(kind: AnalysisKind, input: &str) -> Result<Self> {
        match kind {
            AnalysisKind::Text => Ok(Self::text(input)),
            AnalysisKind::Link => Ok(Self::link(input)),
            AnalysisKind::Image => {
                let path = input.trim();
                if path.is_empty() {
                    return Err(Error::Validation("Please choose an image file".to_string()));
                }
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    Error::Validation(format!("Could not read image {}: {}", path, e))
                })?;
                Ok(Self::image(bytes))
            }
        }
    }

    pub fn kind(&self) -> AnalysisKind {
        match self {
            AnalysisRequest::Text { .. } => AnalysisKind::Text,
            AnalysisRequest::Link { .. } => AnalysisKind::Link,
            AnalysisRequest::Image { .. } => AnalysisKind::Image,
        }
    }

    /// Reject bad input before anything goes over the wire.
    pub fn validate(&self) -> Result<()> {
        match self {
            AnalysisRequest::Text { content } => {
                if content.trim().is_empty() {
                    return Err(Error::Validation("Please enter some text to analyze".to_string()));
                }
            }
            AnalysisRequest::Link { url } => {
                let url = url.trim();
                if url.is_empty() {
                    return Err(Error::Validation("Please enter a URL to analyze".to_string()));
                }
                match reqwest::Url::parse(url) {
                    Ok(parsed) if parsed.has_host() => {}
                    _ => {
                        return Err(Error::Validation(format!("Not a valid URL: {}", url)));
                    }
                }
            }
            AnalysisRequest::Image { bytes } => {
                check_image(bytes)?;
            }
        }
        Ok(())
    }

    /// The text stored alongside a history row; images keep none.
    pub fn history_content(&self) -> Option<String> {
        match self {
            AnalysisRequest::Text { content } => Some(content.trim().to_string()),
            AnalysisRequest::Link { url } => Some(url.trim().to_string()),
            AnalysisRequest::Image { .. } => None,
        }
    }

    pub fn to_payload(&self) -> Result<AnalyzePayload> {
        let kind = self.kind();
        Ok(match self {
            AnalysisRequest::Text { content } => AnalyzePayload {
                kind,
                content: Some(content.trim().to_string()),
                image_base64: None,
            },
            AnalysisRequest::Link { url } => AnalyzePayload {
                kind,
                content: Some(url.trim().to_string()),
                image_base64: None,
            },
            AnalysisRequest::Image { bytes } => AnalyzePayload {
                kind,
                content: None,
                image_base64: Some(image_data_uri(bytes)?),
            },
        })
    }
}

/// Wire body of the analyze call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyzePayload {
    #[serde(rename = "type")]
    pub kind: AnalysisKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(rename = "imageBase64", skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
}

/// Size limits plus a full decode; a readable header alone is not enough.
fn check_image(bytes: &[u8]) -> Result<image::ImageFormat> {
    if bytes.is_empty() {
        return Err(Error::Validation("Image file is empty".to_string()));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(Error::Validation(format!(
            "Image is {:.1}MB; the limit is 10MB",
            bytes.len() as f64 / (1024.0 * 1024.0)
        )));
    }
    let format = sniff_format(bytes)?;
    image::load_from_memory_with_format(bytes, format)
        .map_err(|e| Error::Validation(format!("Image could not be decoded: {}", e)))?;
    Ok(format)
}

fn sniff_format(bytes: &[u8]) -> Result<image::ImageFormat> {
    image::guess_format(bytes).map_err(|_| Error::Validation("Unsupported image format".to_string()))
}

/// Encode image bytes as a `data:<mime>;base64,...` URI.
///
/// Only the format is sniffed here; `validate` already decoded the image.
pub fn image_data_uri(bytes: &[u8]) -> Result<String> {
    let format = sniff_format(bytes)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", format.to_mime_type(), encoded))
}

/// Categorical authenticity classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Verdict {
    Verified,
    Suspicious,
    Fake,
    #[default]
    Unknown,
}

impl Verdict {
    /// Lenient parse; older rows use legitimate / uncertain / scam.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "verified" | "legitimate" => Verdict::Verified,
            "suspicious" | "uncertain" => Verdict::Suspicious,
            "fake" | "scam" => Verdict::Fake,
            _ => Verdict::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Verified => "verified",
            Verdict::Suspicious => "suspicious",
            Verdict::Fake => "fake",
            Verdict::Unknown => "unknown",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Verified => "Verified",
            Verdict::Suspicious => "Suspicious",
            Verdict::Fake => "Fake",
            Verdict::Unknown => "Unknown",
        }
    }
}

impl From<String> for Verdict {
    fn from(s: String) -> Self {
        Verdict::parse(&s)
    }
}

/// A named 0-100 sub-score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicator {
    pub label: String,
    #[serde(deserialize_with = "percent")]
    pub value: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum EvidenceKind {
    #[default]
    Info,
    Warning,
    Danger,
    Success,
}

impl From<String> for EvidenceKind {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "warning" => EvidenceKind::Warning,
            "danger" => EvidenceKind::Danger,
            "success" => EvidenceKind::Success,
            _ => EvidenceKind::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(rename = "type")]
    pub kind: EvidenceKind,
    pub text: String,
}

/// The structured verdict returned by the analyze call. Treated as opaque
/// by the client: displayed, stored, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub verdict: Verdict,
    #[serde(deserialize_with = "percent")]
    pub confidence: u8,
    pub explanation: String,
    #[serde(default)]
    pub indicators: Vec<Indicator>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub suggested_action: String,
}

impl AnalysisResult {
    /// Neutral result used when the model's reply could not be understood.
    pub fn fallback() -> Self {
        let neutral = |label: &str| Indicator {
            label: label.to_string(),
            value: 50,
        };
        Self {
            verdict: Verdict::Unknown,
            confidence: 50,
            explanation: "Unable to complete analysis. Please try again with different content."
                .to_string(),
            indicators: vec![
                neutral("AI-Generated Probability"),
                neutral("Scam Likelihood"),
                neutral("Manipulation Risk"),
                neutral("Emotional Manipulation"),
            ],
            evidence: vec![Evidence {
                kind: EvidenceKind::Info,
                text: "Analysis was inconclusive".to_string(),
            }],
            suggested_action:
                "Try rephrasing your content or providing more context for better analysis."
                    .to_string(),
        }
    }
}

/// Accept any JSON number and clamp it into 0..=100.
pub(crate) fn percent<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    Ok(value.round().clamp(0.0, 100.0) as u8)
}

/// Decode a content body into `T`, or `None` when nothing usable is in it.
///
/// Tries the whole body first, then the outermost `{...}` span.
pub(crate) fn decode_structured<T: serde::de::DeserializeOwned>(body: &str) -> Option<T> {
    if let Ok(parsed) = serde_json::from_str::<T>(body) {
        return Some(parsed);
    }
    // Some gateways wrap the model text in a JSON string.
    let unwrapped = serde_json::from_str::<String>(body).ok();
    let text = unwrapped.as_deref().unwrap_or(body);
    extract_json_object(text).and_then(|span| serde_json::from_str::<T>(span).ok())
}

/// Surface `{error}` bodies and non-success statuses as classified errors.
pub(crate) fn check_response(response: &FunctionResponse) -> Result<()> {
    if let Ok(serde_json::Value::Object(map)) =
        serde_json::from_str::<serde_json::Value>(&response.body)
    {
        if let Some(message) = map.get("error").and_then(|e| e.as_str()) {
            return Err(Error::classify(response.status, message));
        }
    }
    if !response.is_success() {
        return Err(Error::classify(response.status, response.body.trim()));
    }
    Ok(())
}

/// Transport failures are errors; unreadable content becomes the fallback.
pub fn decode_analysis(response: &FunctionResponse) -> Result<AnalysisResult> {
    check_response(response)?;
    Ok(decode_structured(&response.body).unwrap_or_else(|| {
        warn!(bytes = response.body.len(), "analysis reply not understood, using fallback");
        AnalysisResult::fallback()
    }))
}

/// Invokes the remote analyze function.
#[derive(Clone)]
pub struct AnalysisClient {
    functions: Arc<dyn RemoteFunctions>,
}

impl AnalysisClient {
    pub fn new(functions: Arc<dyn RemoteFunctions>) -> Self {
        Self { functions }
    }

    /// One request, no retries. The result replaces any previous one.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        request.validate()?;
        let payload = request.to_payload()?;
        debug!(kind = %payload.kind, "submitting analysis");

        let body = serde_json::to_value(&payload)?;
        let response = self.functions.invoke(ANALYZE_FUNCTION, &body).await?;
        decode_analysis(&response)
    }
}

#[cfg(test)]
pub(crate) fn sample_result() -> AnalysisResult {
    AnalysisResult {
        verdict: Verdict::Fake,
        confidence: 92,
        explanation: "Classic advance-fee lottery scam wording.".to_string(),
        indicators: vec![
            Indicator {
                label: "Scam Likelihood".to_string(),
                value: 95,
            },
            Indicator {
                label: "AI-Generated Probability".to_string(),
                value: 30,
            },
        ],
        evidence: vec![Evidence {
            kind: EvidenceKind::Danger,
            text: "Promises an unrealistic prize".to_string(),
        }],
        suggested_action: "Do not reply or share personal details.".to_string(),
    }
}

#[cfg(test)]
pub(crate) fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::new(2, 2);
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::functions::fake::FakeFunctions;
    use std::io::Cursor;

    fn ok(body: &str) -> FunctionResponse {
        FunctionResponse {
            status: 200,
            body: body.to_string(),
        }
    }

    #[test]
    fn well_formed_result_round_trips() {
        let original = sample_result();
        let body = serde_json::to_string(&original).unwrap();
        assert!(body.contains("\"suggestedAction\""));
        assert_eq!(decode_analysis(&ok(&body)).unwrap(), original);
    }

    #[test]
    fn malformed_body_yields_fallback() {
        for body in ["", "not json at all", "{\"verdict\": ", "[1, 2, 3]"] {
            let result = decode_analysis(&ok(body)).unwrap();
            assert_eq!(result.verdict, Verdict::Unknown);
            assert_eq!(result.confidence, 50);
            assert!(!result.explanation.is_empty());
            assert!(result.indicators.iter().all(|i| i.value == 50));
        }
    }

    #[test]
    fn json_wrapped_in_prose_is_extracted() {
        let body = "Sure! Here is the analysis:\n```json\n{\"verdict\":\"suspicious\",\"confidence\":70,\
                    \"explanation\":\"Urgency cues.\",\"indicators\":[],\"evidence\":[],\
                    \"suggestedAction\":\"Verify independently.\"}\n```";
        let result = decode_analysis(&ok(body)).unwrap();
        assert_eq!(result.verdict, Verdict::Suspicious);
        assert_eq!(result.confidence, 70);
    }

    #[test]
    fn out_of_range_scores_are_clamped() {
        let body = r#"{"verdict":"scam","confidence":140,"explanation":"x",
            "indicators":[{"label":"Scam Likelihood","value":-5},{"label":"Risk","value":66.6}],
            "evidence":[{"type":"critical","text":"odd"}]}"#;
        let result = decode_analysis(&ok(body)).unwrap();
        assert_eq!(result.verdict, Verdict::Fake);
        assert_eq!(result.confidence, 100);
        assert_eq!(result.indicators[0].value, 0);
        assert_eq!(result.indicators[1].value, 67);
        assert_eq!(result.evidence[0].kind, EvidenceKind::Info);
        assert_eq!(result.suggested_action, "");
    }

    #[test]
    fn error_bodies_are_classified() {
        let rate = FunctionResponse {
            status: 429,
            body: r#"{"error":"Rate limit exceeded. Please try again later."}"#.to_string(),
        };
        assert!(matches!(decode_analysis(&rate), Err(Error::RateLimited(_))));

        let quota = FunctionResponse {
            status: 402,
            body: r#"{"error":"Payment required. Please add credits to your workspace."}"#
                .to_string(),
        };
        assert!(matches!(decode_analysis(&quota), Err(Error::QuotaExceeded(_))));

        let generic = FunctionResponse {
            status: 500,
            body: r#"{"error":"AI analysis failed"}"#.to_string(),
        };
        assert!(matches!(
            decode_analysis(&generic),
            Err(Error::Remote { status: 500, .. })
        ));

        let bare = FunctionResponse {
            status: 503,
            body: "upstream unavailable".to_string(),
        };
        assert!(matches!(decode_analysis(&bare), Err(Error::Remote { status: 503, .. })));
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert!(matches!(
            AnalysisRequest::text("   \n").validate(),
            Err(Error::Validation(_))
        ));
        assert!(matches!(AnalysisRequest::link("").validate(), Err(Error::Validation(_))));
        assert!(matches!(
            AnalysisRequest::link("not a url").validate(),
            Err(Error::Validation(_))
        ));
        assert!(AnalysisRequest::link(" https://example.com/win ").validate().is_ok());
    }

    #[test]
    fn image_is_sent_as_data_uri() {
        let request = AnalysisRequest::image(png_bytes());
        let payload = request.to_payload().unwrap();
        assert_eq!(payload.kind, AnalysisKind::Image);
        assert!(payload.content.is_none());
        assert!(payload
            .image_base64
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[test]
    fn bad_images_are_rejected() {
        assert!(AnalysisRequest::image(Vec::new()).validate().is_err());
        assert!(AnalysisRequest::image(b"plain text".to_vec()).validate().is_err());

        let mut truncated = png_bytes();
        truncated.truncate(12);
        assert!(AnalysisRequest::image(truncated).validate().is_err());

        let oversized = vec![0u8; MAX_IMAGE_BYTES + 1];
        assert!(AnalysisRequest::image(oversized).validate().is_err());
    }

    #[test]
    fn image_cut_short_in_its_data_is_rejected() {
        let mut cut = png_bytes();
        cut.truncate(cut.len() - 16);
        // The header still parses, only the pixel data is missing.
        assert!(image::ImageReader::with_format(Cursor::new(&cut), image::ImageFormat::Png)
            .into_dimensions()
            .is_ok());
        assert!(matches!(
            AnalysisRequest::image(cut).validate(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn text_payload_is_trimmed() {
        let payload = AnalysisRequest::text("  hello  ").to_payload().unwrap();
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({"type": "text", "content": "hello"}));
    }

    #[tokio::test]
    async fn analyze_invokes_remote_once() {
        let fake = Arc::new(FakeFunctions::new());
        fake.respond(200, &serde_json::to_string(&sample_result()).unwrap());
        let client = AnalysisClient::new(fake.clone());

        let result = client
            .analyze(&AnalysisRequest::text("Congratulations! You've won $1,000,000"))
            .await
            .unwrap();
        assert_eq!(result, sample_result());
        assert_eq!(fake.call_count(), 1);
        assert_eq!(fake.calls.lock().unwrap()[0].0, ANALYZE_FUNCTION);
    }

    #[tokio::test]
    async fn invalid_request_makes_no_remote_call() {
        let fake = Arc::new(FakeFunctions::new());
        let client = AnalysisClient::new(fake.clone());
        let err = client.analyze(&AnalysisRequest::text("")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(fake.call_count(), 0);
    }
}
