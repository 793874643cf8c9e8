//! HTTP client for the phone OTP backend.
//!
//! The backend answers both endpoints with `{ "success": bool, "message"?: .., "error"?: .. }`
//! and issues no token; a verified OTP only gates creation of the local session.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const SEND_OTP_PATH: &str = "/v1/auth/send-otp";
const VERIFY_OTP_PATH: &str = "/v1/auth/verify-otp";
const HEALTH_PATH: &str = "/health";

#[derive(Debug)]
pub enum OtpError {
    Transport(String),
    Body(String),
}

impl core::fmt::Display for OtpError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            OtpError::Transport(s) => write!(f, "transport error: {}", s),
            OtpError::Body(s) => write!(f, "unreadable otp response: {}", s),
        }
    }
}

impl std::error::Error for OtpError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpOutcome {
    pub success: bool,
    pub message: Option<String>,
}

#[derive(Deserialize)]
struct OtpResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendOtpRequest<'a> {
    phone_number: &'a str,
    name: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyOtpRequest<'a> {
    phone_number: &'a str,
    otp: &'a str,
}

/// Seam used by the login flows so they can be exercised without the backend.
pub trait OtpVerifier {
    fn send_otp(&self, phone_number: &str) -> Result<OtpOutcome, OtpError>;
    fn verify_otp(&self, phone_number: &str, otp: &str) -> Result<OtpOutcome, OtpError>;
    /// True when the backend answers its health check with a 2xx.
    fn health(&self) -> Result<bool, OtpError>;
}

pub struct OtpClient {
    agent: ureq::Agent,
    base_url: String,
}

impl OtpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        OtpClient {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<OtpOutcome, OtpError> {
        let resp = self
            .agent
            .post(&self.url(path))
            .set("Accept", "application/json")
            .send_json(body);
        // Rejections come back as 4xx with the same JSON envelope.
        let text = match resp {
            Ok(r) => r.into_string().map_err(|e| OtpError::Transport(e.to_string()))?,
            Err(ureq::Error::Status(_, r)) => r.into_string().unwrap_or_default(),
            Err(ureq::Error::Transport(t)) => return Err(OtpError::Transport(t.to_string())),
        };
        parse_outcome(&text)
    }
}

impl OtpVerifier for OtpClient {
    fn send_otp(&self, phone_number: &str) -> Result<OtpOutcome, OtpError> {
        self.post(
            SEND_OTP_PATH,
            &SendOtpRequest {
                phone_number,
                name: None,
            },
        )
    }

    fn verify_otp(&self, phone_number: &str, otp: &str) -> Result<OtpOutcome, OtpError> {
        self.post(VERIFY_OTP_PATH, &VerifyOtpRequest { phone_number, otp })
    }

    fn health(&self) -> Result<bool, OtpError> {
        match self.agent.get(&self.url(HEALTH_PATH)).call() {
            Ok(_) => Ok(true),
            Err(ureq::Error::Status(_, _)) => Ok(false),
            Err(ureq::Error::Transport(t)) => Err(OtpError::Transport(t.to_string())),
        }
    }
}

fn parse_outcome(body: &str) -> Result<OtpOutcome, OtpError> {
    let parsed: OtpResponse = serde_json::from_str(body).map_err(|e| OtpError::Body(e.to_string()))?;
    Ok(OtpOutcome {
        success: parsed.success,
        message: parsed.message.or(parsed.error),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_bodies_use_camel_case() {
        let send = serde_json::to_value(SendOtpRequest {
            phone_number: "+919800000000",
            name: None,
        })
        .unwrap();
        assert_eq!(send, serde_json::json!({"phoneNumber": "+919800000000", "name": null}));

        let verify = serde_json::to_value(VerifyOtpRequest {
            phone_number: "+919800000000",
            otp: "123456",
        })
        .unwrap();
        assert_eq!(verify["otp"], "123456");
    }

    #[test]
    fn outcome_falls_back_to_error_field() {
        let ok = parse_outcome(r#"{"success": true, "message": "OTP sent"}"#).unwrap();
        assert!(ok.success);
        assert_eq!(ok.message.as_deref(), Some("OTP sent"));

        let rejected = parse_outcome(r#"{"success": false, "error": "Invalid OTP"}"#).unwrap();
        assert!(!rejected.success);
        assert_eq!(rejected.message.as_deref(), Some("Invalid OTP"));

        assert!(parse_outcome("<html>").is_err());
    }

    #[test]
    fn urls_ignore_trailing_slash() {
        let client = OtpClient::new("https://otp.example.com/", Duration::from_secs(1));
        assert_eq!(client.url(SEND_OTP_PATH), "https://otp.example.com/v1/auth/send-otp");
    }
}
