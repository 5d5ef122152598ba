use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REGISTER_PATH: &str = "/api/auth/register";
pub const REFRESH_PATH: &str = "/api/auth/refresh";
pub const LOGOUT_PATH: &str = "/api/auth/logout";
pub const ME_PATH: &str = "/api/auth/me";

/// Endpoints whose 401s are final: they never trigger a token refresh.
pub const AUTH_ENDPOINTS: [&str; 4] = [LOGIN_PATH, REGISTER_PATH, REFRESH_PATH, LOGOUT_PATH];

pub const FORBIDDEN_MESSAGE: &str = "You do not have permission to access this resource";
pub const NETWORK_MESSAGE: &str = "Network error. Please check your connection.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// An outbound API call. `path` is relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<Value>,
    bearer: Option<String>,
    retried: bool,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            bearer: None,
            retried: false,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Decode` if `body` cannot be represented as JSON.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    #[must_use]
    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }

    /// Mark the request as a replay after a token refresh.
    #[must_use]
    pub fn into_retry(mut self, token: String) -> Self {
        self.bearer = Some(token);
        self.retried = true;
        self
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    #[must_use]
    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    #[must_use]
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    #[must_use]
    pub fn is_auth_endpoint(&self) -> bool {
        AUTH_ENDPOINTS
            .iter()
            .any(|endpoint| self.path.contains(endpoint))
    }
}

/// A received HTTP response with its body parsed as JSON.
///
/// Non-JSON bodies are kept as a JSON string; an empty body is `Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `message` field of the body, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.body.get("message").and_then(Value::as_str)
    }

    /// `false` only when the body explicitly says `"success": false`.
    #[must_use]
    pub fn envelope_success(&self) -> bool {
        self.body
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    /// Decode the envelope's `data` member.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Envelope` when the envelope reports failure and
    /// `ApiError::Decode` when `data` is missing or has the wrong shape.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        self.ensure_envelope_success()?;
        let data = self
            .body
            .get("data")
            .ok_or_else(|| ApiError::Decode("response has no data member".into()))?;
        Ok(T::deserialize(data)?)
    }

    /// Decode a named member, looked up under `data` first and then at the
    /// top level of the body.
    ///
    /// # Errors
    ///
    /// Same as [`ApiResponse::data`].
    pub fn field<T: DeserializeOwned>(&self, key: &str) -> Result<T, ApiError> {
        self.ensure_envelope_success()?;
        let value = self
            .body
            .get("data")
            .and_then(|data| data.get(key))
            .or_else(|| self.body.get(key))
            .ok_or_else(|| ApiError::Decode(format!("response has no {key} member")))?;
        Ok(T::deserialize(value)?)
    }

    fn ensure_envelope_success(&self) -> Result<(), ApiError> {
        if self.envelope_success() {
            Ok(())
        } else {
            Err(ApiError::Envelope(
                self.message().unwrap_or("request failed").to_string(),
            ))
        }
    }

    /// Map a non-2xx response to its error class.
    #[must_use]
    pub fn into_error(self) -> ApiError {
        let message = self
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", self.status));
        match self.status {
            401 => ApiError::Unauthorized { message },
            403 => ApiError::Forbidden { message },
            404 => ApiError::NotFound { message },
            422 => ApiError::Validation {
                message,
                errors: validation_errors(&self.body),
            },
            status @ 500..=599 => ApiError::Server { status, message },
            status => ApiError::Http { status, message },
        }
    }
}

fn validation_errors(body: &Value) -> BTreeMap<String, Vec<String>> {
    let Some(errors) = body.get("errors").and_then(Value::as_object) else {
        return BTreeMap::new();
    };
    errors
        .iter()
        .map(|(field, messages)| {
            let list = match messages {
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                Value::String(single) => vec![single.clone()],
                _ => Vec::new(),
            };
            (field.clone(), list)
        })
        .collect()
}

/// Pull the new access token out of a refresh or login response.
///
/// Servers have shipped it as `data.access_token`, a bare `access_token`, and
/// doubly wrapped as `data.data.access_token`; all three are accepted in that
/// order.
#[must_use]
pub fn extract_access_token(body: &Value) -> Option<String> {
    ["/data/access_token", "/access_token", "/data/data/access_token"]
        .iter()
        .filter_map(|pointer| body.pointer(pointer))
        .filter_map(Value::as_str)
        .find(|token| !token.is_empty())
        .map(str::to_string)
}
