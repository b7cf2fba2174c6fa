use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::error_message;
use crate::error::{Error, Result};
use crate::session::{Session, User};

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self.expires_at.or_else(|| {
            self.expires_in
                .map(|secs| chrono::Utc::now().timestamp() + secs)
        });
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Client for the hosted auth service (`/auth/v1`).
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl AuthClient {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: serde_json::Value, bearer: Option<&str>) -> Result<String> {
        debug!(path, "auth request");
        let mut request = self
            .client
            .post(self.url(path))
            .header("apikey", &self.anon_key)
            .json(&body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            if status.as_u16() == 429 {
                return Err(Error::RateLimited(error_message(&text)));
            }
            return Err(Error::Auth(error_message(&text)));
        }
        Ok(text)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<()> {
        validate_credentials(email, password)?;
        self.post("signup", json!({ "email": email.trim(), "password": password }), None)
            .await?;
        info!("account created");
        Ok(())
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        validate_credentials(email, password)?;
        let body = self
            .post(
                "token?grant_type=password",
                json!({ "email": email.trim(), "password": password }),
                None,
            )
            .await?;
        let token: TokenResponse = serde_json::from_str(&body)?;
        Ok(token.into_session())
    }

    /// Send a one-time code by SMS.
    pub async fn send_phone_otp(&self, phone: &str) -> Result<()> {
        let phone = normalize_phone(phone)?;
        self.post("otp", json!({ "phone": phone }), None).await?;
        Ok(())
    }

    pub async fn verify_phone_otp(&self, phone: &str, token: &str) -> Result<Session> {
        let phone = normalize_phone(phone)?;
        if token.len() != 6 || !token.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::Validation("Please enter a valid 6-digit OTP".to_string()));
        }
        let body = self
            .post("verify", json!({ "type": "sms", "phone": phone, "token": token }), None)
            .await?;
        let token: TokenResponse = serde_json::from_str(&body)?;
        Ok(token.into_session())
    }

    pub async fn sign_out(&self, session: &Session) -> Result<()> {
        self.post("logout", json!({}), Some(&session.access_token))
            .await?;
        Ok(())
    }
}

fn validate_credentials(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() || !email.contains('@') {
        return Err(Error::Validation("Please enter a valid email address".to_string()));
    }
    if password.is_empty() {
        return Err(Error::Validation("Please enter your password".to_string()));
    }
    Ok(())
}

/// E.164-ish: strip spaces and dashes, require digits, prefix `+`.
pub fn normalize_phone(phone: &str) -> Result<String> {
    let digits: String = phone
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '(' && *c != ')')
        .collect();
    let bare = digits.strip_prefix('+').unwrap_or(&digits);
    if bare.len() < 7 || !bare.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::Validation("Please enter a valid phone number".to_string()));
    }
    Ok(format!("+{}", bare))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_gets_plus_prefix() {
        assert_eq!(normalize_phone("1 555-010-0199").unwrap(), "+15550100199");
        assert_eq!(normalize_phone("+44 20 7946 0958").unwrap(), "+442079460958");
        assert!(normalize_phone("call me").is_err());
    }

    #[test]
    fn token_response_computes_expiry() {
        let body = r#"{"access_token":"a","token_type":"bearer","expires_in":3600,
            "refresh_token":"r","user":{"id":"u1","email":"a@b.c","phone":""}}"#;
        let token: TokenResponse = serde_json::from_str(body).unwrap();
        let before = chrono::Utc::now().timestamp();
        let session = token.into_session();
        assert_eq!(session.user.id, "u1");
        assert!(session.expires_at.unwrap() >= before + 3600);
    }

    #[test]
    fn credentials_are_checked_locally() {
        assert!(matches!(validate_credentials("nope", "pw"), Err(Error::Validation(_))));
        assert!(matches!(validate_credentials("a@b.c", ""), Err(Error::Validation(_))));
        assert!(validate_credentials("a@b.c", "pw").is_ok());
    }
}
