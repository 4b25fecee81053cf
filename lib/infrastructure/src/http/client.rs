use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::{self, HeaderMap};
use reqwest_middleware::ClientWithMiddleware;
use reqwest_tracing::TracingMiddleware;

#[derive(Debug, Clone, Default)]
pub struct HttpClientConfig {
    bearer_token: Option<String>,
    timeout: Option<Duration>,
}

impl HttpClientConfig {
    pub fn new(bearer_token: Option<String>) -> Self {
        Self {
            bearer_token,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn new_tracing_client(&self) -> anyhow::Result<ClientWithMiddleware> {
        let mut headers = HeaderMap::new();

        if let Some(token) = &self.bearer_token {
            let mut auth_value = header::HeaderValue::from_str(format!("Bearer {}", token).as_str())
                .context("Invalid bearer token")?;
            auth_value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, auth_value);
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build()?;

        Ok(reqwest_middleware::ClientBuilder::new(client)
            .with(TracingMiddleware::default())
            .build())
    }
}
