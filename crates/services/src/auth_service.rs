use std::sync::{Arc, PoisonError, RwLock};

use serde::Deserialize;

use quiz_core::model::{Credentials, Registration, User};

use crate::error::ApiError;
use crate::http::request::{LOGIN_PATH, LOGOUT_PATH, ME_PATH, REFRESH_PATH, REGISTER_PATH};
use crate::http::{ApiClient, ApiRequest, ApiResponse, extract_access_token};

/// Result of a registration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The account is active and signed in.
    Active(User),
    /// The account exists but needs approval before it can sign in.
    PendingApproval { message: Option<String> },
}

#[derive(Debug, Deserialize)]
struct SessionPayload {
    #[serde(default)]
    user: Option<User>,
}

/// Sign-in state on top of the API client.
pub struct AuthService {
    client: Arc<ApiClient>,
    user: RwLock<Option<User>>,
}

impl AuthService {
    #[must_use]
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            user: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current_user().is_some()
    }

    /// # Errors
    ///
    /// Returns `ApiError::Envelope` when the server answers without a token,
    /// or the error of the failed request.
    pub async fn login(&self, credentials: &Credentials) -> Result<User, ApiError> {
        let request = ApiRequest::post(LOGIN_PATH).json(credentials)?;
        let response = self.client.send(request).await?;

        let Some(token) = session_token(&response) else {
            return Err(ApiError::Envelope(
                response.message().unwrap_or("login failed").to_string(),
            ));
        };
        let user = session_user(&response)?;
        self.client.tokens().set(&token).await?;
        self.set_user(Some(user.clone()));
        tracing::info!(user_id = %user.id, "signed in");
        Ok(user)
    }

    /// Register an account. Internal accounts come back signed in; others
    /// wait for approval.
    ///
    /// # Errors
    ///
    /// Returns the error of the failed request.
    pub async fn register(&self, registration: &Registration) -> Result<RegisterOutcome, ApiError> {
        let request = ApiRequest::post(REGISTER_PATH).json(registration)?;
        let response = self.client.send(request).await?;

        if let Some(token) = session_token(&response) {
            let user = session_user(&response)?;
            self.client.tokens().set(&token).await?;
            self.set_user(Some(user.clone()));
            tracing::info!(user_id = %user.id, "registered and signed in");
            return Ok(RegisterOutcome::Active(user));
        }
        if !response.envelope_success() {
            return Err(ApiError::Envelope(
                response.message().unwrap_or("registration failed").to_string(),
            ));
        }
        tracing::info!("registration pending approval");
        Ok(RegisterOutcome::PendingApproval {
            message: response.message().map(str::to_string),
        })
    }

    /// Sign out. The local token is cleared even if the server call fails.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Storage` only if the token cannot be removed.
    pub async fn logout(&self) -> Result<(), ApiError> {
        if let Err(err) = self.client.send(ApiRequest::post(LOGOUT_PATH)).await {
            tracing::warn!(error = %err, "logout request failed");
        }
        self.set_user(None);
        self.client.tokens().clear().await?;
        tracing::info!("signed out");
        Ok(())
    }

    /// Explicitly renew the token. Returns `false` when the server did not
    /// hand out a new one.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Storage` if the new token cannot be stored.
    pub async fn refresh_token(&self) -> Result<bool, ApiError> {
        let response = match self.client.send(ApiRequest::post(REFRESH_PATH)).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "token refresh failed");
                return Ok(false);
            }
        };
        match session_token(&response) {
            Some(token) => {
                self.client.tokens().set(&token).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Load the signed-in user from `GET /api/auth/me`.
    ///
    /// # Errors
    ///
    /// Returns the error of the failed request; the cached user is cleared.
    pub async fn fetch_user(&self) -> Result<User, ApiError> {
        let result = match self.client.send(ApiRequest::get(ME_PATH)).await {
            Ok(response) => response.data::<User>(),
            Err(err) => Err(err),
        };
        match result {
            Ok(user) => {
                self.set_user(Some(user.clone()));
                Ok(user)
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to fetch user");
                self.set_user(None);
                Err(err)
            }
        }
    }

    /// Resolve the signed-in user, without a network call when no token is
    /// stored. Authentication failures yield `None`.
    ///
    /// # Errors
    ///
    /// Returns storage errors and failures other than an expired session.
    pub async fn check_auth(&self) -> Result<Option<User>, ApiError> {
        if self.client.tokens().get().await?.is_none() {
            self.set_user(None);
            return Ok(None);
        }
        match self.fetch_user().await {
            Ok(user) => Ok(Some(user)),
            Err(ApiError::Unauthorized { .. } | ApiError::RefreshFailed(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn set_user(&self, user: Option<User>) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = user;
    }
}

/// Token of a successful login/register/refresh envelope.
fn session_token(response: &ApiResponse) -> Option<String> {
    if response.envelope_success() {
        extract_access_token(&response.body)
    } else {
        None
    }
}

fn session_user(response: &ApiResponse) -> Result<User, ApiError> {
    let payload: SessionPayload = response.data()?;
    payload
        .user
        .ok_or_else(|| ApiError::Decode("session response has no user".into()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use storage::{InMemoryStore, KeyValueStore, keys};

    use super::*;
    use crate::collab::{RecordingNavigator, TracingNotifier};
    use crate::http::{StubReply, StubTransport, TokenStore};

    fn service(
        kv: Arc<InMemoryStore>,
        handler: impl Fn(&ApiRequest) -> StubReply + Send + Sync + 'static,
    ) -> (AuthService, Arc<StubTransport>) {
        let transport = Arc::new(StubTransport::new(handler));
        let client = ApiClient::new(
            transport.clone(),
            TokenStore::new(kv),
            Arc::new(TracingNotifier),
            Arc::new(RecordingNavigator::new()),
        );
        (AuthService::new(Arc::new(client)), transport)
    }

    fn reply(status: u16, body: serde_json::Value) -> StubReply {
        StubReply::Respond(ApiResponse::new(status, body))
    }

    fn user_json() -> serde_json::Value {
        json!({"id": 7, "name": "Lan Anh", "email": "lan@example.com", "role": "student"})
    }

    #[tokio::test]
    async fn login_stores_token_and_user() {
        let kv = Arc::new(InMemoryStore::new());
        let (auth, transport) = service(kv.clone(), |_| {
            reply(
                200,
                json!({"success": true, "data": {"access_token": "tok", "user": user_json()}}),
            )
        });

        let user = auth
            .login(&Credentials {
                email: "lan@example.com".into(),
                password: "secret".into(),
            })
            .await
            .unwrap();
        assert_eq!(user.name, "Lan Anh");
        assert!(auth.is_authenticated());
        assert_eq!(kv.get(keys::ACCESS_TOKEN).await.unwrap().as_deref(), Some("tok"));
        assert_eq!(transport.requests()[0].body().unwrap()["email"], "lan@example.com");
    }

    #[tokio::test]
    async fn login_without_token_is_rejected() {
        let kv = Arc::new(InMemoryStore::new());
        let (auth, _) = service(kv.clone(), |_| {
            reply(200, json!({"success": false, "message": "Sai mật khẩu"}))
        });
        let err = auth
            .login(&Credentials {
                email: "a@b.c".into(),
                password: "x".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::Envelope("Sai mật khẩu".into()));
        assert_eq!(kv.get(keys::ACCESS_TOKEN).await.unwrap(), None);
    }

    #[tokio::test]
    async fn register_distinguishes_pending_accounts() {
        let kv = Arc::new(InMemoryStore::new());
        let (auth, _) = service(kv, |_| {
            reply(201, json!({"success": true, "message": "Awaiting approval"}))
        });
        let outcome = auth
            .register(&Registration {
                name: "New".into(),
                email: "new@example.com".into(),
                password: "pw".into(),
                password_confirmation: "pw".into(),
            })
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RegisterOutcome::PendingApproval {
                message: Some("Awaiting approval".into())
            }
        );
        assert!(!auth.is_authenticated());
    }

    #[tokio::test]
    async fn logout_clears_token_even_when_server_fails() {
        let kv = Arc::new(InMemoryStore::with_entries([(keys::ACCESS_TOKEN, "tok")]));
        let (auth, _) = service(kv.clone(), |_| StubReply::Unreachable);
        auth.logout().await.unwrap();
        assert_eq!(kv.get(keys::ACCESS_TOKEN).await.unwrap(), None);
    }

    #[tokio::test]
    async fn check_auth_skips_network_without_token() {
        let kv = Arc::new(InMemoryStore::new());
        let (auth, transport) = service(kv, |_| reply(200, json!({"success": true})));
        assert_eq!(auth.check_auth().await.unwrap(), None);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn check_auth_loads_user() {
        let kv = Arc::new(InMemoryStore::with_entries([(keys::ACCESS_TOKEN, "tok")]));
        let (auth, _) = service(kv, |_| {
            reply(200, json!({"success": true, "data": user_json()}))
        });
        let user = auth.check_auth().await.unwrap().unwrap();
        assert_eq!(user.initials(), "LA");
        assert_eq!(auth.current_user(), Some(user));
    }

    #[tokio::test]
    async fn explicit_refresh_reports_outcome() {
        let kv = Arc::new(InMemoryStore::with_entries([(keys::ACCESS_TOKEN, "old")]));
        let (auth, _) = service(kv.clone(), |_| {
            reply(200, json!({"success": true, "data": {"access_token": "new"}}))
        });
        assert!(auth.refresh_token().await.unwrap());
        assert_eq!(kv.get(keys::ACCESS_TOKEN).await.unwrap().as_deref(), Some("new"));

        let (auth, _) = service(kv, |_| reply(401, json!({})));
        assert!(!auth.refresh_token().await.unwrap());
    }
}
