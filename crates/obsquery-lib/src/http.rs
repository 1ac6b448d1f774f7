//! Authenticated HTTP access to the query service.
//!
//! Core operations never build requests themselves; they are handed an
//! [`ApiTransport`] and ask it to perform one call. [`HttpApiClient`] is the
//! production implementation, constructed once per process through
//! [`HttpApiClient::shared`] and read-only afterwards.

use std::sync::OnceLock;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tracing::{debug, info, trace};

use crate::config::ApiConfig;
use crate::diagnostics::excerpt;
use crate::error::{Error, Result};

const ERROR_BODY_LIMIT: usize = 500;

/// Process-wide client, built on first use.
static SHARED: OnceLock<std::result::Result<HttpApiClient, String>> = OnceLock::new();

/// The "make one authenticated call" capability the core depends on.
///
/// Implementations return the raw response body for 2xx responses and a
/// typed transport error for everything else.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn call(&self, method: Method, path: &str, body: Option<&Value>) -> Result<String>;
}

/// reqwest-backed transport with a fixed per-call timeout.
#[derive(Debug)]
pub struct HttpApiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpApiClient {
    /// Build a standalone client. Most callers want [`HttpApiClient::shared`].
    pub fn new(config: &ApiConfig) -> Result<Self> {
        Self::build(config).map_err(|message| Error::ClientInit { message })
    }

    /// Return the process-wide client, constructing it from `config` on the
    /// first call. Later calls ignore `config` and return the same instance.
    pub fn shared(config: &ApiConfig) -> Result<&'static HttpApiClient> {
        match SHARED.get_or_init(|| Self::build(config)) {
            Ok(client) => Ok(client),
            Err(message) => Err(Error::ClientInit {
                message: message.clone(),
            }),
        }
    }

    fn build(config: &ApiConfig) -> std::result::Result<Self, String> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("obsquery/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| e.to_string())?;

        info!(
            base_url = %config.base_url,
            timeout_secs = config.timeout.as_secs(),
            api_key_configured = config.api_key.is_some(),
            "HTTP client initialised"
        );

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ApiTransport for HttpApiClient {
    async fn call(&self, method: Method, path: &str, body: Option<&Value>) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or(Error::MissingApiKey)?;
        let url = format!("{}{}", self.base_url, path);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(api_key)
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            trace!(%method, path, body = %body, "request body");
            request = request.json(body);
        }

        debug!(%method, path, "sending request");
        let response = request.send().await?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = response.text().await?;

        debug!(
            %method,
            path,
            status = status.as_u16(),
            bytes = text.len(),
            "received response"
        );
        trace!(path, body = %excerpt(&text, 2_000), "response body");

        check_status(status, retry_after, text)
    }
}

/// Map an HTTP status onto the transport error taxonomy.
pub(crate) fn check_status(
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: String,
) -> Result<String> {
    if status.is_success() {
        return Ok(body);
    }

    let body = excerpt(body.trim(), ERROR_BODY_LIMIT);
    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(Error::RateLimited { retry_after_secs }),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Unauthorized {
            status: status.as_u16(),
            body,
        }),
        _ => Err(Error::HttpStatus {
            status: status.as_u16(),
            body,
        }),
    }
}
