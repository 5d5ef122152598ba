use thiserror::Error;

use crate::model::{PreferencesError, QuestionError, SlugError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Preferences(#[from] PreferencesError),
}
