//! Remote metadata sink.
//!
//! Exchanges credentials for a bearer token, then delivers the digest once per
//! interval until the consumer accepts it or the retry budget runs out.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use switchbank_core::config::join_url;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{MetadataSink, PublishAttempt};
use crate::config::{PublishMethod, PublisherConfig};
use crate::error::{DeviceError, Result};
use crate::metadata::MetadataDigest;

/// `username:password` split on the first colon.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn parse(raw: &str) -> Result<Self> {
        let (username, password) = raw
            .split_once(':')
            .ok_or_else(|| DeviceError::Publish("credentials must be 'username:password'".into()))?;
        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The HTTP calls a remote publish cycle makes.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Exchange credentials for a bearer token.
    async fn authenticate(&self, url: &str, credentials: &Credentials) -> Result<String>;

    /// Send the digest; returns the response status code.
    async fn deliver(
        &self,
        method: PublishMethod,
        url: &str,
        token: &str,
        digest: &MetadataDigest,
    ) -> Result<u16>;
}

/// Remote sink driving one publish cycle per call.
pub struct RemoteSink {
    config: PublisherConfig,
    transport: Arc<dyn RemoteTransport>,
}

impl RemoteSink {
    pub fn new(config: PublisherConfig, transport: Arc<dyn RemoteTransport>) -> Self {
        Self { config, transport }
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.config.endpoint.as_deref()
    }
}

#[async_trait]
impl MetadataSink for RemoteSink {
    fn name(&self) -> &str {
        "remote"
    }

    async fn publish(&self, digest: &MetadataDigest) -> Result<u32> {
        let (Some(url), Some(method), Some(raw_credentials)) = (
            self.config.url(),
            self.config.method,
            self.config.credentials.as_deref(),
        ) else {
            return Err(DeviceError::Publish(
                "'metadataPublisher' configuration is invalid".into(),
            ));
        };

        let credentials = Credentials::parse(raw_credentials)?;
        let auth_url = join_url(&self.config.server, &self.config.auth_path);
        let token = self.transport.authenticate(&auth_url, &credentials).await?;
        debug!(username = %credentials.username, "publisher authenticated");

        let mut attempt = PublishAttempt::new(
            self.config.retries,
            Duration::from_millis(self.config.interval),
        );
        let mut ticker = interval_at(Instant::now() + attempt.interval(), attempt.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !attempt.begin() {
                return Err(DeviceError::Publish(attempt.failure_reason()));
            }

            match self.transport.deliver(method, &url, &token, digest).await {
                Ok(status) if (200..300).contains(&status) => {
                    attempt.succeed();
                    info!(url = %url, attempts = attempt.attempts(), "metadata delivered");
                    return Ok(attempt.attempts());
                }
                Ok(status) => {
                    warn!(url = %url, status, attempt = attempt.attempts(), "metadata delivery rejected");
                    attempt.reject(format!("status {}", status));
                    if attempt.is_finished() {
                        return Err(DeviceError::Publish(attempt.failure_reason()));
                    }
                }
                Err(e) => {
                    attempt.abort(e.to_string());
                    return Err(DeviceError::Publish(attempt.failure_reason()));
                }
            }
        }
    }
}

/// reqwest based transport.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

#[cfg(feature = "http")]
impl HttpTransport {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .unwrap_or_default();
        Self {
            client,
            timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(feature = "http")]
impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn authenticate(&self, url: &str, credentials: &Credentials) -> Result<String> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&serde_json::json!({
                "username": credentials.username,
                "password": credentials.password(),
            }))
            .send()
            .await
            .map_err(|e| DeviceError::Http(format!("authentication request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(DeviceError::Http(format!(
                "authentication rejected: {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response.json().await?;
        body.get("token")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| DeviceError::Http("authentication response has no token".into()))
    }

    async fn deliver(
        &self,
        method: PublishMethod,
        url: &str,
        token: &str,
        digest: &MetadataDigest,
    ) -> Result<u16> {
        let request = match method {
            PublishMethod::Patch => self.client.patch(url),
            PublishMethod::Post => self.client.post(url),
            PublishMethod::Put => self.client.put(url),
        };

        let response = request
            .timeout(self.timeout)
            .header("Authorization", format!("Bearer {}", token))
            .json(digest)
            .send()
            .await
            .map_err(|e| DeviceError::Http(format!("metadata request failed: {}", e)))?;

        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_split_on_first_colon() {
        let credentials = Credentials::parse("admin:pa:ss").unwrap();
        assert_eq!(credentials.username, "admin");
        assert_eq!(credentials.password(), "pa:ss");
        assert!(Credentials::parse("admin").is_err());
    }

    #[test]
    fn test_credentials_debug_redacted() {
        let credentials = Credentials::parse("admin:secret").unwrap();
        assert!(!format!("{:?}", credentials).contains("secret"));
    }
}
