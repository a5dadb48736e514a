//! HTTP transport for the filess.io REST API
//!
//! Every call is an authenticated JSON request/response cycle. Transient
//! authorization failures (401) and network failures are retried with a
//! linear backoff; every other failure is surfaced immediately.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-attempt network timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Total attempts per logical request
pub const MAX_ATTEMPTS: u32 = 3;

/// Backoff unit; attempt `n` waits `n * BACKOFF_STEP` before sending
pub const BACKOFF_STEP: Duration = Duration::from_millis(100);

/// Maximum length of response body to log
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Envelope wrapping every successful response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiResponse {
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Non-2xx response from the API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("API error (status {status}): {message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl ApiError {
    /// Build from a raw response body, preferring a JSON `{"error": "..."}` message
    pub fn from_body(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| body.to_string());
        Self { status, message }
    }
}

/// Errors returned by [`ApiClient`]
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("API token is empty")]
    EmptyToken,

    #[error("invalid request URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("error creating HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("error marshaling request body: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("error making request: {0}")]
    Request(#[source] reqwest::Error),

    #[error("error reading response body: {0}")]
    ReadBody(#[source] reqwest::Error),

    #[error("error unmarshaling response: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ClientError {
    /// HTTP status of a structured API error
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api(e) => Some(e.status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND.as_u16())
    }

    /// Network failures and 401 responses may succeed on a later attempt
    fn is_retryable(&self) -> bool {
        match self {
            ClientError::Request(_) | ClientError::ReadBody(_) => true,
            ClientError::Api(e) => e.status == StatusCode::UNAUTHORIZED.as_u16(),
            _ => false,
        }
    }
}

fn truncate_for_log(body: &str) -> String {
    if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    }
}

/// Authenticated session against the filess.io API
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    api_token: String,
    http: Client,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a new client
    ///
    /// The token is not checked here; an empty token fails each request.
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Result<Self, ClientError> {
        let http = Client::builder()
            .user_agent(concat!("filess-provider/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            base_url: base_url.into(),
            api_token: api_token.into(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, ClientError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post<B>(&self, path: &str, body: &B) -> Result<ApiResponse, ClientError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let payload = serde_json::to_vec(body).map_err(ClientError::Serialize)?;
        self.request(Method::POST, path, Some(payload)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ClientError> {
        self.request(Method::DELETE, path, None).await
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        let raw = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        Url::parse(&raw).map_err(|source| ClientError::InvalidUrl { url: raw, source })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        payload: Option<Vec<u8>>,
    ) -> Result<ApiResponse, ClientError> {
        if self.api_token.is_empty() {
            return Err(ClientError::EmptyToken);
        }
        let url = self.url(path)?;

        let mut attempt = 0;
        loop {
            if attempt > 0 {
                tokio::time::sleep(BACKOFF_STEP * attempt).await;
            }

            tracing::debug!("{} {} (attempt {}/{})", method, path, attempt + 1, MAX_ATTEMPTS);
            match self.send_once(method.clone(), url.clone(), payload.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    tracing::debug!("{} {} failed, retrying: {}", method, path, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One attempt; the request is rebuilt from the serialized payload each time
    async fn send_once(
        &self,
        method: Method,
        url: Url,
        payload: Option<Vec<u8>>,
    ) -> Result<ApiResponse, ClientError> {
        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&self.api_token)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");
        if let Some(payload) = payload {
            request = request.body(payload);
        }

        let response = request.send().await.map_err(ClientError::Request)?;
        let status = response.status();
        let body = response.text().await.map_err(ClientError::ReadBody)?;

        if !status.is_success() {
            tracing::debug!("API error: {} - {}", status, truncate_for_log(&body));
            return Err(ApiError::from_body(status.as_u16(), &body).into());
        }

        serde_json::from_str(&body).map_err(ClientError::Deserialize)
    }
}
