mod ids;
mod preferences;
mod progress;
mod question;
mod user;

pub use ids::{
    AttemptId, CategoryId, ChoiceId, ParseIdError, ProgressId, QuestionId, Slug, SlugError, UserId,
};
pub use preferences::{
    AccessibilityPreferences, DarkModePreference, Language, PreferencesError, TypographySettings,
};
pub use progress::{
    AttemptCompletion, CategoryProgress, DocumentProgress, ExamAnswer, ExamAttempt, ExamRef,
};
pub use question::{Choice, Question, QuestionError};
pub use user::{Credentials, Registration, Role, User};
