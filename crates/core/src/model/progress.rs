use serde::{Deserialize, Serialize};

use crate::model::ids::{AttemptId, ChoiceId, ProgressId, QuestionId, Slug};

/// Snapshot of a practice session sent to
/// `POST /api/documents/category/{id}/progress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryProgress {
    pub current_question_index: usize,
    pub correct_count: u32,
    pub answered_count: u32,
    pub time_spent_seconds: u64,
    #[serde(default)]
    pub completed: bool,
}

/// One answered exam question, sent to `POST /api/exams/attempts/{id}/answer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamAnswer {
    pub question_id: QuestionId,
    pub selected_choice_ids: Vec<ChoiceId>,
    #[serde(default)]
    pub time_spent_seconds: u64,
    #[serde(default)]
    pub is_flagged: bool,
}

/// Body of `POST /api/exams/attempts/{id}/complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptCompletion {
    pub time_spent_seconds: u64,
}

/// Server-side learning progress for a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentProgress {
    pub id: ProgressId,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

/// Exam the attempt belongs to, when the backend embeds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamRef {
    pub slug: Slug,
}

/// Server-side exam attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamAttempt {
    pub id: AttemptId,
    #[serde(default)]
    pub exam: Option<ExamRef>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub completed_at: Option<String>,
}
