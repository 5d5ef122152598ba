use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use super::request::{
    ApiRequest, ApiResponse, FORBIDDEN_MESSAGE, NETWORK_MESSAGE, REFRESH_PATH,
    extract_access_token,
};
use super::token::TokenStore;
use super::transport::Transport;
use crate::collab::{Navigator, NoticeKind, Notifier, Route};
use crate::error::ApiError;

type RefreshResult = Result<String, ApiError>;

enum RefreshState {
    Idle,
    /// One refresh is on the wire; everyone else waits for its outcome.
    Refreshing {
        waiters: Vec<oneshot::Sender<RefreshResult>>,
    },
}

/// Authenticated request pipeline.
///
/// Attaches the bearer token, turns statuses into [`ApiError`]s, and recovers
/// from expired tokens: the first request to hit a 401 refreshes the token,
/// requests that 401 meanwhile wait for that same refresh, then every one of
/// them is replayed once with the new token.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    tokens: TokenStore,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    refresh: Mutex<RefreshState>,
}

impl ApiClient {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        tokens: TokenStore,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            transport,
            tokens,
            notifier,
            navigator,
            refresh: Mutex::new(RefreshState::Idle),
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    #[must_use]
    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    #[must_use]
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Whether a token refresh is currently in flight.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock_refresh(), RefreshState::Refreshing { .. })
    }

    /// Send a request with the stored token attached.
    ///
    /// # Errors
    ///
    /// Returns the `ApiError` matching the response status, a network error
    /// when nothing came back, or `ApiError::RefreshFailed` when an expired
    /// token could not be renewed.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let token = self.tokens.get().await?;
        let request = request.with_bearer(token);

        let first = self.dispatch(&request).await;
        match first {
            Err(ApiError::Unauthorized { .. })
                if !request.is_retried() && !request.is_auth_endpoint() =>
            {
                let token = self.refresh_or_wait().await?;
                tracing::debug!(path = request.path(), "replaying request with refreshed token");
                self.dispatch(&request.into_retry(token)).await
            }
            other => other,
        }
    }

    /// One round trip without refresh handling.
    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(path = request.path(), error = %err, "request got no response");
                self.notifier.notify(NoticeKind::Error, NETWORK_MESSAGE);
                return Err(err.into());
            }
        };
        if response.is_success() {
            return Ok(response);
        }

        let err = response.into_error();
        if matches!(err, ApiError::Forbidden { .. }) {
            self.notifier.notify(NoticeKind::Error, FORBIDDEN_MESSAGE);
        }
        tracing::debug!(path = request.path(), error = %err, "request failed");
        Err(err)
    }

    /// Join the in-flight refresh, or start one if none is running.
    async fn refresh_or_wait(&self) -> RefreshResult {
        let waiter = {
            let mut state = self.lock_refresh();
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing {
                        waiters: Vec::new(),
                    };
                    None
                }
            }
        };

        if let Some(rx) = waiter {
            tracing::debug!("token refresh in flight, request queued");
            return rx.await.unwrap_or_else(|_| {
                Err(ApiError::RefreshFailed(Box::new(ApiError::Decode(
                    "token refresh was abandoned".into(),
                ))))
            });
        }

        let mut guard = RefreshGuard {
            client: self,
            armed: true,
        };
        let outcome = self.perform_refresh().await;

        if let Err(err) = &outcome {
            tracing::warn!(error = %err, "token refresh failed, signing out");
            if let Err(clear_err) = self.tokens.clear().await {
                tracing::error!(error = %clear_err, "failed to clear access token");
            }
            self.navigator.navigate(Route::signin_expired());
        }

        guard.armed = false;
        let waiters = self.take_waiters();
        tracing::debug!(queued = waiters.len(), ok = outcome.is_ok(), "token refresh settled");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
        outcome
    }

    async fn perform_refresh(&self) -> RefreshResult {
        let wrap = |err: ApiError| ApiError::RefreshFailed(Box::new(err));

        let current = self
            .tokens
            .get()
            .await
            .map_err(|err| wrap(err.into()))?
            .ok_or_else(|| wrap(ApiError::NoToken))?;

        let request = ApiRequest::post(REFRESH_PATH).with_bearer(Some(current));
        let response = self.dispatch(&request).await.map_err(wrap)?;
        let token = extract_access_token(&response.body).ok_or_else(|| {
            wrap(ApiError::Decode(
                "refresh response carried no access token".into(),
            ))
        })?;

        self.tokens.set(&token).await.map_err(|err| wrap(err.into()))?;
        tracing::info!("access token refreshed");
        Ok(token)
    }

    /// Return to idle and hand back whoever was waiting, atomically.
    fn take_waiters(&self) -> Vec<oneshot::Sender<RefreshResult>> {
        match mem::replace(&mut *self.lock_refresh(), RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        }
    }

    fn lock_refresh(&self) -> MutexGuard<'_, RefreshState> {
        self.refresh.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resets the gate if the refreshing future is dropped before it settles, so
/// waiters see an error instead of hanging.
struct RefreshGuard<'a> {
    client: &'a ApiClient,
    armed: bool,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            drop(self.client.take_waiters());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::{Value, json};
    use storage::{InMemoryStore, KeyValueStore, keys};

    use super::*;
    use crate::collab::{RecordingNavigator, RecordingNotifier};
    use crate::http::request::LOGIN_PATH;
    use crate::http::transport::{StubReply, StubTransport};

    struct Harness {
        client: ApiClient,
        transport: Arc<StubTransport>,
        kv: Arc<InMemoryStore>,
        notifier: Arc<RecordingNotifier>,
        navigator: Arc<RecordingNavigator>,
    }

    fn harness(
        token: Option<&str>,
        handler: impl Fn(&ApiRequest) -> StubReply + Send + Sync + 'static,
    ) -> Harness {
        let kv = Arc::new(match token {
            Some(token) => InMemoryStore::with_entries([(keys::ACCESS_TOKEN, token)]),
            None => InMemoryStore::new(),
        });
        let transport = Arc::new(StubTransport::new(handler));
        let notifier = Arc::new(RecordingNotifier::new());
        let navigator = Arc::new(RecordingNavigator::new());
        let client = ApiClient::new(
            transport.clone(),
            TokenStore::new(kv.clone()),
            notifier.clone(),
            navigator.clone(),
        );
        Harness {
            client,
            transport,
            kv,
            notifier,
            navigator,
        }
    }

    fn ok(body: Value) -> StubReply {
        StubReply::Respond(ApiResponse::new(200, body))
    }

    fn status(code: u16) -> StubReply {
        StubReply::Respond(ApiResponse::new(code, json!({"message": "nope"})))
    }

    #[tokio::test]
    async fn attaches_stored_bearer_token() {
        let h = harness(Some("abc"), |_| ok(json!({"success": true})));
        h.client.send(ApiRequest::get("/api/documents")).await.unwrap();
        assert_eq!(h.transport.requests()[0].bearer(), Some("abc"));
    }

    #[tokio::test]
    async fn refreshes_once_and_replays_on_401() {
        let h = harness(Some("old"), |req| match (req.path(), req.bearer()) {
            (REFRESH_PATH, _) => ok(json!({"data": {"access_token": "new"}})),
            (_, Some("new")) => ok(json!({"success": true, "data": 1})),
            _ => status(401),
        });

        let response = h.client.send(ApiRequest::get("/api/documents")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(h.transport.count(REFRESH_PATH), 1);
        assert_eq!(h.transport.count("/api/documents"), 2);
        assert_eq!(
            h.kv.get(keys::ACCESS_TOKEN).await.unwrap().as_deref(),
            Some("new")
        );
        assert!(!h.client.is_refreshing());
    }

    #[tokio::test]
    async fn replay_that_still_fails_is_not_retried_again() {
        let h = harness(Some("old"), |req| match req.path() {
            REFRESH_PATH => ok(json!({"access_token": "new"})),
            _ => status(401),
        });

        let err = h.client.send(ApiRequest::get("/api/documents")).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized { .. }));
        assert_eq!(h.transport.count(REFRESH_PATH), 1);
        assert_eq!(h.transport.count("/api/documents"), 2);
        let replay = &h.transport.requests()[2];
        assert!(replay.is_retried());
    }

    #[tokio::test]
    async fn auth_endpoints_never_trigger_refresh() {
        let h = harness(Some("old"), |_| status(401));
        let err = h
            .client
            .send(ApiRequest::post(LOGIN_PATH))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized { .. }));
        assert_eq!(h.transport.count(REFRESH_PATH), 0);
        assert!(h.navigator.routes().is_empty());
    }

    #[tokio::test]
    async fn failed_refresh_signs_out() {
        let h = harness(Some("old"), |_| status(401));
        let err = h.client.send(ApiRequest::get("/api/auth/me")).await.unwrap_err();

        let ApiError::RefreshFailed(inner) = err else {
            panic!("expected refresh failure, got {err:?}");
        };
        assert!(matches!(*inner, ApiError::Unauthorized { .. }));
        assert_eq!(h.kv.get(keys::ACCESS_TOKEN).await.unwrap(), None);
        assert_eq!(h.navigator.routes(), vec![Route::signin_expired()]);
        assert!(!h.client.is_refreshing());
    }

    #[tokio::test]
    async fn missing_token_fails_refresh_without_calling_server() {
        let h = harness(None, |_| status(401));
        let err = h.client.send(ApiRequest::get("/api/auth/me")).await.unwrap_err();
        assert_eq!(err, ApiError::RefreshFailed(Box::new(ApiError::NoToken)));
        assert_eq!(h.transport.count(REFRESH_PATH), 0);
        assert_eq!(h.navigator.routes().len(), 1);
    }

    #[tokio::test]
    async fn refresh_response_without_token_is_a_failure() {
        let h = harness(Some("old"), |req| match req.path() {
            REFRESH_PATH => ok(json!({"success": true, "data": {}})),
            _ => status(401),
        });
        let err = h.client.send(ApiRequest::get("/api/auth/me")).await.unwrap_err();
        assert!(matches!(err, ApiError::RefreshFailed(inner) if matches!(*inner, ApiError::Decode(_))));
    }

    #[tokio::test]
    async fn forbidden_and_network_errors_notify() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let h = harness(Some("t"), move |_| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                status(403)
            } else {
                StubReply::Unreachable
            }
        });

        let forbidden = h.client.send(ApiRequest::get("/api/admin")).await.unwrap_err();
        assert!(matches!(forbidden, ApiError::Forbidden { .. }));
        let offline = h.client.send(ApiRequest::get("/api/admin")).await.unwrap_err();
        assert!(offline.is_network());

        let notices = h.notifier.notices();
        assert_eq!(
            notices,
            vec![
                (NoticeKind::Error, FORBIDDEN_MESSAGE.to_string()),
                (NoticeKind::Error, NETWORK_MESSAGE.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn forbidden_keeps_server_message_for_caller() {
        let h = harness(Some("t"), |_| {
            StubReply::Respond(ApiResponse::new(
                403,
                json!({"message": "Exam not published yet"}),
            ))
        });

        let err = h
            .client
            .send(ApiRequest::get("/api/exams/x/start"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::Forbidden {
                message: "Exam not published yet".into()
            }
        );
        assert_eq!(
            h.notifier.notices(),
            vec![(NoticeKind::Error, FORBIDDEN_MESSAGE.to_string())]
        );
        assert_eq!(h.transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn other_statuses_pass_through_without_notice() {
        let h = harness(Some("t"), |_| status(404));
        let err = h.client.send(ApiRequest::get("/api/nothing")).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
        assert!(h.notifier.notices().is_empty());
    }
}
