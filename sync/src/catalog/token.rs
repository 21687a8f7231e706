//! Bearer-token acquisition for the catalog API.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::Credentials;
use crate::error::ClientError;

/// Source of a currently valid catalog bearer token.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, ClientError>;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    provider: &'a str,
    refresh: bool,
}

#[derive(Deserialize)]
struct LoginResponse {
    access_token: Option<String>,
}

/// Exchanges credentials for a fresh token on every call.
pub struct SupersetLogin {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl SupersetLogin {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            credentials,
        }
    }
}

#[async_trait::async_trait]
impl TokenProvider for SupersetLogin {
    async fn token(&self) -> Result<String, ClientError> {
        let url = format!("{}/api/v1/security/login", self.base_url);
        let body = LoginRequest {
            username: &self.credentials.username,
            password: &self.credentials.password,
            provider: &self.credentials.provider,
            refresh: self.credentials.refresh,
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::Login(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(status = %status.as_u16(), "Catalog login rejected");
            return Err(ClientError::Login(format!("status {}: {message}", status.as_u16())));
        }

        let parsed: LoginResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Login(format!("unreadable login response: {e}")))?;

        match parsed.access_token {
            Some(token) if !token.is_empty() => {
                tracing::debug!(username = %self.credentials.username, "Obtained catalog access token");
                Ok(token)
            }
            _ => Err(ClientError::Login("response has no access_token".to_string())),
        }
    }
}

/// Reuses a token from the inner provider until `ttl` has elapsed.
pub struct CachedTokenProvider<P> {
    inner: P,
    ttl: Duration,
    cached: Mutex<Option<(String, Instant)>>,
}

impl<P: TokenProvider> CachedTokenProvider<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl<P: TokenProvider> TokenProvider for CachedTokenProvider<P> {
    async fn token(&self) -> Result<String, ClientError> {
        let mut cached = self.cached.lock().await;
        if let Some((token, fetched_at)) = cached.as_ref()
            && fetched_at.elapsed() < self.ttl
        {
            return Ok(token.clone());
        }

        let token = self.inner.token().await?;
        *cached = Some((token.clone(), Instant::now()));
        Ok(token)
    }
}
