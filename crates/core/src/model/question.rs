use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{ChoiceId, QuestionId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question {0} has no choices")]
    NoChoices(QuestionId),
    #[error("question {question} repeats choice {choice}")]
    DuplicateChoice {
        question: QuestionId,
        choice: ChoiceId,
    },
}

/// One selectable answer of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: ChoiceId,
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

impl Choice {
    #[must_use]
    pub fn new(id: ChoiceId, text: impl Into<String>, is_correct: bool) -> Self {
        Self {
            id,
            text: text.into(),
            is_correct,
        }
    }
}

/// A multiple-choice question. Several choices may be correct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    prompt: String,
    choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    explanation: Option<String>,
}

impl Question {
    /// Builds a question, rejecting empty or duplicated choice lists.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::NoChoices` or `QuestionError::DuplicateChoice`.
    pub fn new(
        id: QuestionId,
        prompt: impl Into<String>,
        choices: Vec<Choice>,
    ) -> Result<Self, QuestionError> {
        if choices.is_empty() {
            return Err(QuestionError::NoChoices(id));
        }
        let mut seen = HashSet::with_capacity(choices.len());
        for choice in &choices {
            if !seen.insert(choice.id) {
                return Err(QuestionError::DuplicateChoice {
                    question: id,
                    choice: choice.id,
                });
            }
        }

        Ok(Self {
            id,
            prompt: prompt.into(),
            choices,
            explanation: None,
        })
    }

    #[must_use]
    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    /// Ids of every choice flagged correct.
    #[must_use]
    pub fn correct_choice_ids(&self) -> HashSet<ChoiceId> {
        self.choices
            .iter()
            .filter(|c| c.is_correct)
            .map(|c| c.id)
            .collect()
    }

    #[must_use]
    pub fn is_choice_correct(&self, choice_id: ChoiceId) -> bool {
        self.choices
            .iter()
            .any(|c| c.is_correct && c.id == choice_id)
    }

    /// True iff `selected` is exactly the set of correct choices. No partial credit.
    #[must_use]
    pub fn is_answered_correctly(&self, selected: &HashSet<ChoiceId>) -> bool {
        self.correct_choice_ids() == *selected
    }
}
