use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use quiz_core::model::{CategoryId, CategoryProgress, DocumentProgress, ProgressId, Slug};

use crate::collab::{DOCUMENT_PROGRESS_DETAILS_ROUTE, Route};
use crate::error::ApiError;
use crate::http::{ApiClient, ApiRequest};

/// Learning progress through one document.
pub struct DocumentProgressService {
    client: Arc<ApiClient>,
    slug: Slug,
    progress_id: RwLock<Option<ProgressId>>,
}

impl DocumentProgressService {
    #[must_use]
    pub fn new(client: Arc<ApiClient>, slug: Slug) -> Self {
        Self {
            client,
            slug,
            progress_id: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn slug(&self) -> &Slug {
        &self.slug
    }

    #[must_use]
    pub fn progress_id(&self) -> Option<ProgressId> {
        *self
            .progress_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the document, or resume the progress already open on the server.
    ///
    /// # Errors
    ///
    /// Returns the error of the failed request.
    pub async fn start(&self) -> Result<DocumentProgress, ApiError> {
        self.open("start").await
    }

    /// Abandon the current progress and open a fresh one.
    ///
    /// # Errors
    ///
    /// Returns the error of the failed request.
    pub async fn restart(&self) -> Result<DocumentProgress, ApiError> {
        self.open("restart").await
    }

    /// # Errors
    ///
    /// Returns the error of the failed request.
    pub async fn update_category_progress(
        &self,
        category_id: CategoryId,
        progress: &CategoryProgress,
    ) -> Result<Value, ApiError> {
        let path = format!("/api/documents/category/{category_id}/progress");
        let response = self
            .client
            .send(ApiRequest::post(path).json(progress)?)
            .await?;
        Ok(response.body)
    }

    /// Complete the document and open its progress details. `None` when no
    /// progress was started.
    ///
    /// # Errors
    ///
    /// Returns the error of the failed request; no navigation happens then.
    pub async fn complete(&self) -> Result<Option<Value>, ApiError> {
        let Some(progress_id) = self.progress_id() else {
            tracing::debug!(slug = %self.slug, "no active document progress to complete");
            return Ok(None);
        };
        let path = format!("/api/documents/{}/complete", self.slug);
        let response = self.client.send(ApiRequest::post(path)).await?;

        self.client.navigator().navigate(
            Route::named(DOCUMENT_PROGRESS_DETAILS_ROUTE).param("progressId", progress_id),
        );
        tracing::info!(slug = %self.slug, %progress_id, "document completed");
        Ok(Some(response.body))
    }

    async fn open(&self, action: &str) -> Result<DocumentProgress, ApiError> {
        let path = format!("/api/documents/{}/{action}", self.slug);
        let response = self.client.send(ApiRequest::post(path)).await?;
        let progress: DocumentProgress = response.field("progress")?;
        *self
            .progress_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(progress.id);
        tracing::debug!(slug = %self.slug, progress_id = %progress.id, action, "document progress opened");
        Ok(progress)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use storage::InMemoryStore;

    use super::*;
    use crate::collab::{RecordingNavigator, TracingNotifier};
    use crate::http::{ApiResponse, StubReply, StubTransport, TokenStore};

    fn service() -> (DocumentProgressService, Arc<StubTransport>, Arc<RecordingNavigator>) {
        let transport = Arc::new(StubTransport::new(|req| {
            let body = if req.path().ends_with("/start") {
                json!({"success": true, "data": {"progress": {"id": 41}}})
            } else if req.path().ends_with("/restart") {
                json!({"progress": {"id": 42, "status": "in_progress"}})
            } else {
                json!({"success": true})
            };
            StubReply::Respond(ApiResponse::new(200, body))
        }));
        let navigator = Arc::new(RecordingNavigator::new());
        let client = ApiClient::new(
            transport.clone(),
            TokenStore::new(Arc::new(InMemoryStore::new())),
            Arc::new(TracingNotifier),
            navigator.clone(),
        );
        let slug = Slug::new("java-basics").unwrap();
        (
            DocumentProgressService::new(Arc::new(client), slug),
            transport,
            navigator,
        )
    }

    #[tokio::test]
    async fn complete_without_progress_is_a_no_op() {
        let (documents, transport, navigator) = service();
        assert_eq!(documents.complete().await.unwrap(), None);
        assert!(transport.requests().is_empty());
        assert!(navigator.routes().is_empty());
    }

    #[tokio::test]
    async fn start_then_complete_navigates_to_details() {
        let (documents, transport, navigator) = service();
        let progress = documents.start().await.unwrap();
        assert_eq!(progress.id, ProgressId::new(41));

        documents.complete().await.unwrap().unwrap();
        assert_eq!(
            transport.requests()[1].path(),
            "/api/documents/java-basics/complete"
        );
        assert_eq!(
            navigator.last(),
            Some(Route::named(DOCUMENT_PROGRESS_DETAILS_ROUTE).param("progressId", 41))
        );
    }

    #[tokio::test]
    async fn restart_replaces_progress_id() {
        let (documents, _, _) = service();
        documents.start().await.unwrap();
        let progress = documents.restart().await.unwrap();
        assert_eq!(progress.status.as_deref(), Some("in_progress"));
        assert_eq!(documents.progress_id(), Some(ProgressId::new(42)));
    }

    #[tokio::test]
    async fn category_progress_posts_snapshot() {
        let (documents, transport, _) = service();
        let snapshot = CategoryProgress {
            current_question_index: 2,
            correct_count: 1,
            answered_count: 2,
            time_spent_seconds: 40,
            completed: false,
        };
        documents
            .update_category_progress(CategoryId::new(5), &snapshot)
            .await
            .unwrap();
        let request = &transport.requests()[0];
        assert_eq!(request.path(), "/api/documents/category/5/progress");
        assert_eq!(request.body().unwrap()["answered_count"], 2);
    }
}
