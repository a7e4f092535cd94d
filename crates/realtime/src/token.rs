//! Streaming credential provider
//!
//! The event channel authenticates with a short-lived token minted by the
//! REST API for one service request.

use reqwest::Client;
use serde::Deserialize;

use crate::config::Config;
use crate::error::{RealtimeError, RealtimeResult};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    data: Option<TokenData>,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    token: Option<String>,
}

/// REST client for `/api/web-socket/token/{id}`
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: Client,
    base_url: String,
    session_token: Option<String>,
    api_key: Option<String>,
}

impl TokenClient {
    pub fn new(config: &Config) -> RealtimeResult<Self> {
        let http = Client::builder().timeout(config.http_timeout()).build()?;

        Ok(Self {
            http,
            base_url: config.api_url.clone(),
            session_token: config.session_token.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Mint a streaming token for `service_request_id`
    pub async fn fetch_token(&self, service_request_id: &str) -> RealtimeResult<String> {
        let url = format!(
            "{}/api/web-socket/token/{}",
            self.base_url, service_request_id
        );

        let mut req_builder = self.http.post(&url);
        if let Some(token) = &self.session_token {
            req_builder = req_builder.bearer_auth(token);
        }
        if let Some(key) = &self.api_key {
            req_builder = req_builder.header("x-api-key", key.as_str());
        }

        let response = req_builder
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                service_request_id = %service_request_id,
                status = status.as_u16(),
                "Token request rejected"
            );
            return Err(RealtimeError::AuthenticationMissing);
        }

        let body: TokenResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "Token response was not valid JSON");
                return Err(RealtimeError::AuthenticationMissing);
            }
        };

        match body.data.and_then(|d| d.token) {
            Some(token) if !token.trim().is_empty() => {
                tracing::debug!(service_request_id = %service_request_id, "Obtained streaming token");
                Ok(token)
            }
            _ => Err(RealtimeError::AuthenticationMissing),
        }
    }
}
