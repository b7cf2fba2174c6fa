pub mod auth;
pub mod functions;
pub mod rest;

pub use auth::AuthClient;
pub use functions::{ByteStream, FunctionResponse, HttpFunctions, RemoteFunctions};
pub use rest::RestClient;

use reqwest::Response;

use crate::error::Error;

/// Pull a human-readable message out of an error response body.
///
/// Hosted services disagree on the field name, so the usual suspects are
/// tried in order before falling back to the raw text.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["error_description", "msg", "message", "error"] {
            if let Some(text) = value.get(field).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }
    body.trim().to_string()
}

/// Turn a non-success response into a classified error.
pub(crate) async fn status_error(response: Response) -> Error {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    Error::classify(status, error_message(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_known_fields() {
        assert_eq!(error_message(r#"{"error_description":"Invalid login credentials"}"#), "Invalid login credentials");
        assert_eq!(error_message(r#"{"msg":"Token has expired"}"#), "Token has expired");
        assert_eq!(error_message(r#"{"error":"Rate limit exceeded"}"#), "Rate limit exceeded");
        assert_eq!(error_message("  plain text  "), "plain text");
    }
}
