use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use super::request::{ApiRequest, ApiResponse, Method};
use crate::config::ClientConfig;
use crate::error::{AppServicesError, TransportError};

/// Sends one request and reports whatever status came back.
///
/// Implementations never interpret status codes; that is the client's job.
#[async_trait]
pub trait Transport: Send + Sync {
    /// # Errors
    ///
    /// Returns `TransportError` only when no response was received.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

// ─── Reqwest ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Returns `AppServicesError::HttpClient` if the TLS backend fails to
    /// initialise.
    pub fn new(config: &ClientConfig) -> Result<Self, AppServicesError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.http_timeout())
            .build()
            .map_err(|err| AppServicesError::HttpClient(err.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api_base_url().to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path());
        let mut builder = match request.method() {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
            Method::Delete => self.client.delete(url),
        };
        if let Some(token) = request.bearer() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_builder() {
                TransportError::InvalidRequest(err.to_string())
            } else {
                TransportError::Unreachable(err.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|err| TransportError::Unreachable(err.to_string()))?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        tracing::debug!(
            method = request.method().as_str(),
            path = request.path(),
            status,
            "api response"
        );
        Ok(ApiResponse::new(status, body))
    }
}

// ─── Stub ───────────────────────────────────────────────────────────────────

/// What a `StubTransport` should do with one request.
#[derive(Debug, Clone)]
pub enum StubReply {
    Respond(ApiResponse),
    /// Respond after a pause, measured on the tokio clock.
    Delayed(Duration, ApiResponse),
    Unreachable,
}

type StubHandler = dyn Fn(&ApiRequest) -> StubReply + Send + Sync;

/// In-memory transport for tests and offline prototyping. Every request is
/// recorded before the handler answers it.
pub struct StubTransport {
    handler: Box<StubHandler>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl StubTransport {
    pub fn new(handler: impl Fn(&ApiRequest) -> StubReply + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded requests to `path`.
    #[must_use]
    pub fn count(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|request| request.path() == path)
            .count()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        match (self.handler)(request) {
            StubReply::Respond(response) => Ok(response),
            StubReply::Delayed(delay, response) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            StubReply::Unreachable => Err(TransportError::Unreachable(format!(
                "stub refused {}",
                request.path()
            ))),
        }
    }
}
