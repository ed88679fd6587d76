use std::time::Duration;

use reqwest::Client;

use super::error::NotifyError;
use super::types::PushMessage;

/// HTTP client for the push relay that turns a [`PushMessage`] into a
/// browser notification.
#[derive(Debug, Clone)]
pub struct PushRelay {
    token: Option<String>,
    client: Client,
    url: String,
}

impl PushRelay {
    pub fn new(url: String, token: Option<String>) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { token, client, url })
    }

    pub async fn send(&self, message: &PushMessage) -> Result<(), NotifyError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .json(message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(NotifyError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(NotifyError::RelayError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}
