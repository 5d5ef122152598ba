use std::sync::Arc;

use quiz_core::{Clock, RetryPolicy};
use quiz_core::model::{CategoryId, Slug};
use storage::Storage;

use crate::auth_service::AuthService;
use crate::collab::{Navigator, Notifier};
use crate::config::ClientConfig;
use crate::error::AppServicesError;
use crate::http::{ApiClient, ReqwestTransport, TokenStore, Transport};
use crate::preferences_service::PreferencesService;
use crate::progress::{DocumentProgressService, ExamProgressService};
use crate::sync::{CategoryProgressSink, LocalBackup, ProgressSync};

/// Everything a front end needs, built once and passed around.
///
/// Long-lived pieces are shared; per-document, per-exam, and per-category
/// services are created on demand. Dropping the context releases them all.
#[derive(Clone)]
pub struct AppServices {
    clock: Clock,
    storage: Storage,
    client: Arc<ApiClient>,
    auth: Arc<AuthService>,
    preferences: Arc<PreferencesService>,
}

impl AppServices {
    /// Build services against the configured backend and `SQLite` state.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the database or HTTP client cannot be
    /// initialised.
    pub async fn connect(
        config: &ClientConfig,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(config.db_url()).await?;
        let transport = Arc::new(ReqwestTransport::new(config)?);
        tracing::info!(base_url = transport.base_url(), "quiz client ready");
        Ok(Self::from_parts(
            storage,
            transport,
            notifier,
            navigator,
            Clock::default(),
        ))
    }

    /// Assemble services from explicit parts, mainly for tests.
    #[must_use]
    pub fn from_parts(
        storage: Storage,
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
        clock: Clock,
    ) -> Self {
        let tokens = TokenStore::new(Arc::clone(&storage.kv));
        let client = Arc::new(ApiClient::new(transport, tokens, notifier, navigator));
        let auth = Arc::new(AuthService::new(Arc::clone(&client)));
        let preferences = Arc::new(PreferencesService::new(Arc::clone(&storage.kv)));
        Self {
            clock,
            storage,
            client,
            auth,
            preferences,
        }
    }

    #[must_use]
    pub fn client(&self) -> Arc<ApiClient> {
        Arc::clone(&self.client)
    }

    #[must_use]
    pub fn auth(&self) -> Arc<AuthService> {
        Arc::clone(&self.auth)
    }

    #[must_use]
    pub fn preferences(&self) -> Arc<PreferencesService> {
        Arc::clone(&self.preferences)
    }

    #[must_use]
    pub fn documents(&self, slug: Slug) -> DocumentProgressService {
        DocumentProgressService::new(self.client(), slug)
    }

    #[must_use]
    pub fn exams(&self, slug: Slug) -> ExamProgressService {
        ExamProgressService::new(self.client(), slug)
    }

    /// Sync engine posting to one category's progress endpoint.
    #[must_use]
    pub fn category_sync(&self, category_id: CategoryId) -> ProgressSync {
        let sink = Arc::new(CategoryProgressSink::new(self.client(), category_id));
        ProgressSync::with_options(sink, RetryPolicy::default(), self.clock)
    }

    #[must_use]
    pub fn local_backup(&self) -> LocalBackup {
        LocalBackup::new(Arc::clone(&self.storage.kv), self.clock)
    }
}
