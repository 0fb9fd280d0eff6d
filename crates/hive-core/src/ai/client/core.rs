//! Core chat client: HTTP setup and error mapping

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use tracing::{debug, warn};

use super::error::ChatError;
use crate::ai::retry::RetryConfig;
use crate::config::ChatApiConfig;

/// HTTP client for the chat assistant API
#[derive(Clone)]
pub struct ChatClient {
    http: Client,
    config: ChatApiConfig,
    retry: RetryConfig,
}

impl ChatClient {
    pub fn new(config: ChatApiConfig, retry: RetryConfig) -> Result<Self> {
        // No overall request timeout: replies stream for as long as the model talks
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            config,
            retry,
        })
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Endpoint for streamed chat replies
    pub fn chat_url(&self) -> String {
        format!("{}/chat", self.config.api_url.trim_end_matches('/'))
    }

    /// Build a POST request with auth and SSE headers
    pub(super) fn build_request(&self, url: &str) -> RequestBuilder {
        let mut request = self
            .http
            .post(url)
            .header("accept", "text/event-stream")
            .header("content-type", "application/json");

        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        debug!("Built chat request to {}", url);
        request
    }

    /// Turn non-success responses into `ChatError::Http`
    pub(super) async fn handle_error_response(
        &self,
        response: Response,
    ) -> Result<Response, ChatError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!("Chat API error {}: {}", status, body);
        Err(ChatError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_url_trims_slash() {
        let config = ChatApiConfig {
            api_url: "https://chat.example.edu/api/".to_string(),
            ..ChatApiConfig::default()
        };
        let client = ChatClient::new(config, RetryConfig::default()).unwrap();
        assert_eq!(client.chat_url(), "https://chat.example.edu/api/chat");
    }
}
