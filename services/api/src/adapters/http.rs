//! services/api/src/adapters/http.rs
//!
//! Shared plumbing for the adapters that talk to plain JSON/HTTP providers.

use creation_core::ports::{PortError, PortResult};
use reqwest::{Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Builds the client shared by the reqwest-based adapters.
pub fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("creation-studio/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Maps a transport failure to a port error, without leaking the raw reqwest error type.
pub fn transport_error(provider: &str, err: reqwest::Error) -> PortError {
    if err.is_timeout() {
        PortError::Unexpected(format!("{} did not respond in time", provider))
    } else {
        PortError::Unexpected(format!("{} request failed: {}", provider, err))
    }
}

/// Passes successful responses through and turns error statuses into port errors,
/// keeping the provider's own message when it sends one.
pub async fn ensure_success(provider: &str, response: Response) -> PortResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = provider_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    });

    Err(match status {
        StatusCode::NOT_FOUND => PortError::NotFound(format!("{}: {}", provider, message)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized,
        _ => PortError::Unexpected(format!(
            "{} returned {}: {}",
            provider,
            status.as_u16(),
            message
        )),
    })
}

/// Pulls a human-readable message out of the error shapes our providers use:
/// `{"error": "..."}`, `{"error": {"message": "..."}}` and `{"errors": [{"message": "..."}]}`.
fn provider_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let message = match &value["error"] {
        Value::String(s) => Some(s.as_str()),
        Value::Object(_) => value["error"]["message"].as_str(),
        _ => value["errors"][0]["message"].as_str(),
    };
    message.map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_message_understands_known_shapes() {
        assert_eq!(
            provider_message(r#"{"error":"Invalid API key"}"#).as_deref(),
            Some("Invalid API key")
        );
        assert_eq!(
            provider_message(r#"{"error":{"message":"Upload preset not found"}}"#).as_deref(),
            Some("Upload preset not found")
        );
        assert_eq!(
            provider_message(r#"{"errors":[{"message":"not found","code":"resource_not_found"}]}"#)
                .as_deref(),
            Some("not found")
        );
        assert_eq!(provider_message("<html>bad gateway</html>"), None);
    }
}
