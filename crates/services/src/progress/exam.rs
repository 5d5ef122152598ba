use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use quiz_core::model::{AttemptCompletion, AttemptId, ExamAnswer, ExamAttempt, Slug};

use crate::collab::{EXAM_ATTEMPT_DETAILS_ROUTE, Route};
use crate::error::ApiError;
use crate::http::{ApiClient, ApiRequest};

/// Attempts at one exam.
pub struct ExamProgressService {
    client: Arc<ApiClient>,
    slug: Slug,
    attempt_id: RwLock<Option<AttemptId>>,
}

impl ExamProgressService {
    #[must_use]
    pub fn new(client: Arc<ApiClient>, slug: Slug) -> Self {
        Self {
            client,
            slug,
            attempt_id: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn slug(&self) -> &Slug {
        &self.slug
    }

    #[must_use]
    pub fn attempt_id(&self) -> Option<AttemptId> {
        *self
            .attempt_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start an attempt or resume the open one.
    ///
    /// # Errors
    ///
    /// Returns the error of the failed request.
    pub async fn start(&self) -> Result<ExamAttempt, ApiError> {
        self.open("start").await
    }

    /// Close the current attempt and begin a new one.
    ///
    /// # Errors
    ///
    /// Returns the error of the failed request.
    pub async fn restart(&self) -> Result<ExamAttempt, ApiError> {
        self.open("restart").await
    }

    /// Record one answer. `None` when no attempt is open.
    ///
    /// # Errors
    ///
    /// Returns the error of the failed request.
    pub async fn save_answer(&self, answer: &ExamAnswer) -> Result<Option<Value>, ApiError> {
        let Some(attempt_id) = self.attempt_id() else {
            tracing::debug!(slug = %self.slug, "no active attempt, answer not saved");
            return Ok(None);
        };
        let path = format!("/api/exams/attempts/{attempt_id}/answer");
        let response = self
            .client
            .send(ApiRequest::post(path).json(answer)?)
            .await?;
        Ok(Some(response.body))
    }

    /// Submit the attempt and open its results. `None` when no attempt is
    /// open.
    ///
    /// # Errors
    ///
    /// Returns the error of the failed request; no navigation happens then.
    pub async fn complete(&self, time_spent_seconds: u64) -> Result<Option<Value>, ApiError> {
        let Some(attempt_id) = self.attempt_id() else {
            return Ok(None);
        };
        let path = format!("/api/exams/attempts/{attempt_id}/complete");
        let body = AttemptCompletion { time_spent_seconds };
        let response = self
            .client
            .send(ApiRequest::post(path).json(&body)?)
            .await?;

        // The backend may report the attempt under a different exam slug.
        let exam_slug = response
            .field::<ExamAttempt>("attempt")
            .ok()
            .and_then(|attempt| attempt.exam)
            .map_or_else(|| self.slug.clone(), |exam| exam.slug);

        self.client.navigator().navigate(
            Route::named(EXAM_ATTEMPT_DETAILS_ROUTE)
                .param("examSlug", &exam_slug)
                .param("attemptId", attempt_id),
        );
        tracing::info!(slug = %exam_slug, %attempt_id, time_spent_seconds, "exam attempt completed");
        Ok(Some(response.body))
    }

    async fn open(&self, action: &str) -> Result<ExamAttempt, ApiError> {
        let path = format!("/api/exams/{}/{action}", self.slug);
        let response = self.client.send(ApiRequest::post(path)).await?;
        let attempt: ExamAttempt = response.field("attempt")?;
        *self
            .attempt_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(attempt.id);
        tracing::debug!(slug = %self.slug, attempt_id = %attempt.id, action, "exam attempt opened");
        Ok(attempt)
    }
}
