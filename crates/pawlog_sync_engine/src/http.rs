//! HTTP transport implementation.
//!
//! Posts JSON sync requests to `{server_url}/v1/sync` with `reqwest`.
//! Status codes are mapped onto [`SyncError`] so that the coordinator
//! retries only transient failures.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use async_trait::async_trait;
use parking_lot::RwLock;
use pawlog_sync_protocol::{SyncDomain, SyncRequest, SyncResponse};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use tracing::debug;

/// HTTP-based sync transport.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
    last_error: RwLock<Option<String>>,
}

impl HttpTransport {
    /// Creates a transport for the server named in `config`.
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        Self::with_headers(config, HeaderMap::new())
    }

    /// Creates a transport that sends `headers` with every request.
    ///
    /// Used when talking to a server without a fronting gateway, for
    /// example to pass the principal header in development.
    pub fn with_headers(config: &SyncConfig, headers: HeaderMap) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| SyncError::transport_fatal(format!("failed to build http client: {e}")))?;
        let path = SyncDomain::Logs.endpoint_path().unwrap_or("/v1/sync");
        Ok(Self {
            client,
            endpoint: format!("{}{}", config.server_url.trim_end_matches('/'), path),
            auth_token: config.auth_token.clone(),
            last_error: RwLock::new(None),
        })
    }

    /// Builds a single-header map.
    pub fn header(name: &str, value: &str) -> SyncResult<HeaderMap> {
        let name = HeaderName::try_from(name)
            .map_err(|e| SyncError::transport_fatal(format!("invalid header name: {e}")))?;
        let value = HeaderValue::try_from(value)
            .map_err(|e| SyncError::transport_fatal(format!("invalid header value: {e}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(name, value);
        Ok(headers)
    }

    /// Returns the endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn record(&self, result: SyncResult<SyncResponse>) -> SyncResult<SyncResponse> {
        *self.last_error.write() = result.as_ref().err().map(ToString::to_string);
        result
    }

    async fn post(&self, request: &SyncRequest) -> SyncResult<SyncResponse> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(map_send_error)?;
        let status = response.status();
        debug!(endpoint = %self.endpoint, status = status.as_u16(), "sync call answered");

        if status.is_success() {
            let body = response.bytes().await.map_err(map_body_error)?;
            return decode_response(&body);
        }

        let body = response.text().await.unwrap_or_default();
        Err(map_status(status, body))
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn sync(&self, request: &SyncRequest) -> SyncResult<SyncResponse> {
        let result = self.post(request).await;
        self.record(result)
    }
}

fn map_send_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout
    } else if err.is_builder() {
        SyncError::transport_fatal(err.to_string())
    } else {
        SyncError::transport_retryable(err.to_string())
    }
}

/// A body cut off mid-read is a network failure, not a protocol one.
fn map_body_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout
    } else {
        SyncError::transport_retryable(format!("failed to read response body: {err}"))
    }
}

fn decode_response(body: &[u8]) -> SyncResult<SyncResponse> {
    serde_json::from_slice(body)
        .map_err(|e| SyncError::Protocol(format!("failed to decode response: {e}")))
}

fn map_status(status: StatusCode, body: String) -> SyncError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SyncError::Ownership(body),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            SyncError::transport_retryable(format!("{status}: {body}"))
        }
        s if s.is_server_error() => SyncError::ServerError {
            status: s.as_u16(),
            message: body,
        },
        s => SyncError::Protocol(format!("{s}: {body}")),
    }
}
