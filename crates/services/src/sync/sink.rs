use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use quiz_core::model::CategoryId;

use crate::error::ApiError;
use crate::http::{ApiClient, ApiRequest};

/// Where progress payloads end up.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// # Errors
    ///
    /// Returns the `ApiError` of the failed save; its failure class decides
    /// whether the payload is retried, requeued, or dropped.
    async fn save(&self, payload: &Value) -> Result<(), ApiError>;
}

/// Posts to `/api/documents/category/{id}/progress`.
pub struct CategoryProgressSink {
    client: Arc<ApiClient>,
    category_id: CategoryId,
}

impl CategoryProgressSink {
    #[must_use]
    pub fn new(client: Arc<ApiClient>, category_id: CategoryId) -> Self {
        Self {
            client,
            category_id,
        }
    }

    #[must_use]
    pub fn path(&self) -> String {
        format!("/api/documents/category/{}/progress", self.category_id)
    }
}

#[async_trait]
impl ProgressSink for CategoryProgressSink {
    async fn save(&self, payload: &Value) -> Result<(), ApiError> {
        let request = ApiRequest::post(self.path()).json(payload)?;
        let response = self.client.send(request).await?;
        if response.envelope_success() {
            Ok(())
        } else {
            Err(ApiError::Envelope(
                response.message().unwrap_or("progress rejected").to_string(),
            ))
        }
    }
}
