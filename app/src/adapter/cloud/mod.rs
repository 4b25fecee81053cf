#![allow(async_fn_in_trait)]

mod protocol;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use infrastructure::HttpClientConfig;
use moka::future::Cache;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::port::DeviceCloud;

pub use protocol::{CloudRequest, CloudResponse};

#[derive(Debug, Clone, Deserialize)]
pub struct CloudConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub terminal_uuid: String,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_concurrency() -> usize {
    12
}

fn default_token_ttl_minutes() -> u64 {
    45
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
impl AuthToken {
    pub fn for_testing(token: &str) -> Self {
        Self(token.to_owned())
    }
}

#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
pub enum CloudError {
    #[display("cloud login failed: {_0}")]
    Auth(#[error(not(source))] String),
    #[display("cloud transport error after {attempts} attempts: {message}")]
    Transport { attempts: u32, message: String },
    #[display("cloud reported error {code}: {message}")]
    Api { code: i64, message: String },
}

/// One outbound POST to the cloud endpoint. Seam between the client's
/// token/retry/gating machinery and the actual HTTP stack.
pub trait CloudTransport {
    async fn post(&self, url: &str, request: &CloudRequest<'_>) -> anyhow::Result<CloudResponse>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: ClientWithMiddleware,
}

impl CloudTransport for HttpTransport {
    async fn post(&self, url: &str, request: &CloudRequest<'_>) -> anyhow::Result<CloudResponse> {
        let response = self.client.post(url).json(request).send().await?;

        let payload = response
            .json::<serde_json::Value>()
            .await
            .context("Error reading cloud response body")?;

        Ok(CloudResponse::from(payload))
    }
}

/// Single point of contact with the device cloud. Owns the auth-token
/// lifecycle and the process-wide concurrency gate; constructed once at
/// startup and shared by cloning (all clones share cache and gate).
///
/// The upstream API enforces an undocumented rate limit, so every
/// outbound call passes through one bounded semaphore.
#[derive(Clone)]
pub struct CloudClient<T = HttpTransport> {
    transport: T,
    config: Arc<CloudConfig>,
    token_cache: Cache<(), AuthToken>,
    gate: Arc<Semaphore>,
}

impl CloudClient {
    pub fn new(config: CloudConfig) -> anyhow::Result<Self> {
        let client = HttpClientConfig::new(None)
            .with_timeout(Duration::from_secs(config.request_timeout_secs))
            .new_tracing_client()?;

        Ok(Self::from_parts(config, HttpTransport { client }))
    }
}

impl<T: CloudTransport> CloudClient<T> {
    fn from_parts(config: CloudConfig, transport: T) -> Self {
        let token_cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(Duration::from_secs(config.token_ttl_minutes * 60))
            .build();

        let gate = Arc::new(Semaphore::new(config.max_concurrency.max(1)));

        Self {
            transport,
            config: Arc::new(config),
            token_cache,
            gate,
        }
    }

    #[cfg(test)]
    fn with_transport(config: CloudConfig, transport: T) -> Self {
        Self::from_parts(config, transport)
    }

    /// Returns the cached token, logging in on a cache miss. Concurrent
    /// misses share a single in-flight login (single-flight via the
    /// cache), so a cold fan-out performs exactly one credential
    /// exchange.
    pub async fn get_auth_token(&self) -> Result<AuthToken, CloudError> {
        self.token_cache
            .try_get_with((), self.login())
            .await
            .map_err(|e: Arc<CloudError>| (*e).clone())
    }

    /// Warms the token cache. Called before a multi-device batch so the
    /// ensuing fan-out reuses one token.
    pub async fn refresh_token_if_absent(&self) -> Result<AuthToken, CloudError> {
        self.get_auth_token().await
    }

    /// Drops the cached token; the next call logs in again.
    pub async fn invalidate_token(&self) {
        self.token_cache.invalidate(&()).await;
    }

    #[tracing::instrument(skip(self))]
    async fn login(&self) -> Result<AuthToken, CloudError> {
        tracing::info!("Fetching new auth token from device cloud");

        let request = CloudRequest::Login {
            app_type: protocol::APP_TYPE,
            username: &self.config.username,
            password: &self.config.password,
            terminal_uuid: &self.config.terminal_uuid,
        };

        let response = self.send(&request, None).await?;

        if response.is_error() {
            return Err(CloudError::Auth(response.error_message().to_owned()));
        }

        match response.token() {
            Some(token) => Ok(AuthToken(token.to_owned())),
            None => Err(CloudError::Auth("login response contains no token".to_owned())),
        }
    }

    pub async fn get_devices(&self) -> Result<CloudResponse, CloudError> {
        let token = self.get_auth_token().await?;
        let response = self.send(&CloudRequest::GetDeviceList, Some(&token)).await?;
        classify(response)
    }

    pub async fn get_device_state(&self, device_id: &str) -> Result<CloudResponse, CloudError> {
        let token = self.get_auth_token().await?;
        let request = CloudRequest::Passthrough {
            device_id,
            request_data: serde_json::json!({"system": {"get_sysinfo": {}}}),
        };

        let response = self.send(&request, Some(&token)).await?;
        classify(response)
    }

    async fn send(&self, request: &CloudRequest<'_>, token: Option<&AuthToken>) -> Result<CloudResponse, CloudError> {
        let _permit = self.gate.acquire().await.map_err(|_| CloudError::Transport {
            attempts: 0,
            message: "concurrency gate closed".to_owned(),
        })?;

        let url = match token {
            Some(token) => format!("{}/?token={}", self.config.base_url, token.as_str()),
            None => format!("{}/", self.config.base_url),
        };

        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.transport.post(&url, request).await {
                Ok(response) => {
                    if response.is_error() {
                        tracing::error!(
                            "Cloud request failed with error code {}: {}",
                            response.error_code(),
                            response.error_message()
                        );
                    }
                    return Ok(response);
                }
                Err(e) => {
                    last_error = format!("{:#}", e);
                    if attempt < max_attempts {
                        let delay = backoff_delay(attempt);
                        tracing::warn!(
                            "Cloud request attempt {}/{} failed, retrying in {:?}: {}",
                            attempt,
                            max_attempts,
                            delay,
                            last_error
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(CloudError::Transport {
            attempts: max_attempts,
            message: last_error,
        })
    }
}

impl<T: CloudTransport> DeviceCloud for CloudClient<T> {
    async fn refresh_token_if_absent(&self) -> Result<AuthToken, CloudError> {
        CloudClient::refresh_token_if_absent(self).await
    }

    async fn set_device_state(
        &self,
        device_id: &str,
        request_data: serde_json::Value,
        token: &AuthToken,
    ) -> Result<CloudResponse, CloudError> {
        let request = CloudRequest::Passthrough {
            device_id,
            request_data,
        };

        let response = self.send(&request, Some(token)).await?;
        classify(response)
    }
}

fn classify(response: CloudResponse) -> Result<CloudResponse, CloudError> {
    if response.is_error() {
        return Err(CloudError::Api {
            code: response.error_code(),
            message: response.error_message().to_owned(),
        });
    }

    Ok(response)
}

/// Exponential backoff from 250ms, capped at 2s.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = Duration::from_millis(250) * 2u32.saturating_pow(attempt.saturating_sub(1).min(4));
    exp.min(Duration::from_secs(2))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::join_all;

    use super::*;

    #[derive(Clone, Default)]
    struct Counters {
        posts: Arc<AtomicUsize>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    struct FakeTransport {
        counters: Counters,
        fail: bool,
        response: serde_json::Value,
    }

    impl FakeTransport {
        fn ok(counters: &Counters, response: serde_json::Value) -> Self {
            Self {
                counters: counters.clone(),
                fail: false,
                response,
            }
        }

        fn failing(counters: &Counters) -> Self {
            Self {
                counters: counters.clone(),
                fail: true,
                response: serde_json::Value::Null,
            }
        }
    }

    impl CloudTransport for FakeTransport {
        async fn post(&self, _url: &str, _request: &CloudRequest<'_>) -> anyhow::Result<CloudResponse> {
            self.counters.posts.fetch_add(1, Ordering::SeqCst);

            let current = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.counters.max_in_flight.fetch_max(current, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(5)).await;
            self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                anyhow::bail!("connection reset");
            }

            Ok(CloudResponse::from(self.response.clone()))
        }
    }

    fn test_config(max_concurrency: usize, max_attempts: u32) -> CloudConfig {
        CloudConfig {
            base_url: "http://cloud.test".to_owned(),
            username: "user@example.com".to_owned(),
            password: "hunter2".to_owned(),
            terminal_uuid: "b5f8c9a0".to_owned(),
            max_concurrency,
            token_ttl_minutes: 45,
            request_timeout_secs: 30,
            max_attempts,
        }
    }

    fn login_response() -> serde_json::Value {
        serde_json::json!({"error_code": 0, "result": {"token": "token-1"}})
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_token_misses_share_one_login() {
        let counters = Counters::default();
        let client = CloudClient::with_transport(test_config(12, 3), FakeTransport::ok(&counters, login_response()));

        let (a, b, c) = tokio::join!(client.get_auth_token(), client.get_auth_token(), client.get_auth_token());

        assert_eq!(a.unwrap(), AuthToken::for_testing("token-1"));
        assert_eq!(b.unwrap(), AuthToken::for_testing("token-1"));
        assert_eq!(c.unwrap(), AuthToken::for_testing("token-1"));
        assert_eq!(counters.posts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_token_is_reused_until_invalidated() {
        let counters = Counters::default();
        let client = CloudClient::with_transport(test_config(12, 3), FakeTransport::ok(&counters, login_response()));

        client.get_auth_token().await.unwrap();
        client.get_auth_token().await.unwrap();
        assert_eq!(counters.posts.load(Ordering::SeqCst), 1);

        client.invalidate_token().await;
        client.get_auth_token().await.unwrap();
        assert_eq!(counters.posts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failures_retry_up_to_the_attempt_limit() {
        let counters = Counters::default();
        let client = CloudClient::with_transport(test_config(12, 3), FakeTransport::failing(&counters));

        let err = client.get_auth_token().await.unwrap_err();

        match err {
            CloudError::Transport { attempts, message } => {
                assert_eq!(attempts, 3);
                assert!(message.contains("connection reset"));
            }
            other => panic!("expected Transport error, got {:?}", other),
        }

        assert_eq!(counters.posts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_gate_caps_in_flight_requests() {
        let counters = Counters::default();
        let client = CloudClient::with_transport(
            test_config(2, 1),
            FakeTransport::ok(&counters, serde_json::json!({"error_code": 0})),
        );
        let token = AuthToken::for_testing("token-1");

        let device_ids: Vec<String> = (0..8).map(|i| format!("d{}", i)).collect();
        let results = join_all(
            device_ids
                .iter()
                .map(|id| client.set_device_state(id, serde_json::json!({}), &token)),
        )
        .await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(counters.posts.load(Ordering::SeqCst), 8);
        assert!(counters.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_millis(250));
        assert_eq!(backoff_delay(2), Duration::from_millis(500));
        assert_eq!(backoff_delay(3), Duration::from_secs(1));
        assert_eq!(backoff_delay(4), Duration::from_secs(2));
        assert_eq!(backoff_delay(10), Duration::from_secs(2));
    }

    #[test]
    fn classify_rejects_cloud_reported_failures() {
        let err = classify(CloudResponse::from(serde_json::json!({
            "error_code": -1,
            "msg": "Device is offline"
        })));

        match err {
            Err(CloudError::Api { code, message }) => {
                assert_eq!(code, -1);
                assert_eq!(message, "Device is offline");
            }
            other => panic!("expected Api error, got {:?}", other),
        }

        assert!(classify(CloudResponse::from(serde_json::json!({"error_code": 0}))).is_ok());
    }
}
