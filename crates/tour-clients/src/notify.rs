//! Notification provider client.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use tour_core::{NotificationDispatcher, NotificationRequest, TourError};

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub base_url: String,
    pub api_token: String,
    pub timeout_secs: u64,
}

/// HTTP client for the push/SMS/email provider.
#[derive(Debug, Clone)]
pub struct NotifyClient {
    config: NotifyConfig,
    client: Client,
}

impl NotifyClient {
    pub fn new(config: NotifyConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create notification HTTP client")?;

        Ok(Self { config, client })
    }

    fn auth_header(&self) -> Option<String> {
        let token = self.config.api_token.trim();
        if token.is_empty() {
            None
        } else {
            Some(format!("Bearer {}", token))
        }
    }

    async fn send(&self, request: &NotificationRequest) -> Result<()> {
        let url = format!(
            "{}/v1/notifications",
            self.config.base_url.trim_end_matches('/')
        );

        let mut builder = self.client.post(&url).json(request);
        if let Some(auth) = self.auth_header() {
            builder = builder.header("Authorization", auth);
        }

        let response = builder
            .send()
            .await
            .context("Failed to send notification")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Notification request failed: {} {}",
                status,
                body
            ));
        }

        tracing::debug!(user_id = %request.user_id, "Notification accepted");
        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for NotifyClient {
    async fn dispatch(&self, request: &NotificationRequest) -> Result<(), TourError> {
        self.send(request)
            .await
            .map_err(|err| TourError::external(format!("{:#}", err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(token: &str) -> NotifyClient {
        NotifyClient::new(NotifyConfig {
            base_url: "http://localhost:9".to_string(),
            api_token: token.to_string(),
            timeout_secs: 1,
        })
        .unwrap()
    }

    #[test]
    fn blank_token_sends_no_auth_header() {
        assert!(client("  ").auth_header().is_none());
        assert_eq!(client("abc").auth_header().as_deref(), Some("Bearer abc"));
    }
}
