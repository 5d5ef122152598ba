use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for parsing an id from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to parse {kind} from string")]
pub struct ParseIdError {
    kind: &'static str,
}

// Backend ids are plain positive integers; each resource gets its own newtype
// so a choice id can never be sent where a question id is expected.
macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            #[must_use]
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            #[must_use]
            pub fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map(Self::new)
                    .map_err(|_| ParseIdError {
                        kind: stringify!($name),
                    })
            }
        }
    };
}

numeric_id!(
    /// Identifies a question within a document category or exam.
    QuestionId
);
numeric_id!(
    /// Identifies one answer choice of a question.
    ChoiceId
);
numeric_id!(
    /// Identifies a document category whose progress is synced.
    CategoryId
);
numeric_id!(
    /// Identifies a document learning progress record.
    ProgressId
);
numeric_id!(
    /// Identifies an exam attempt.
    AttemptId
);
numeric_id!(UserId);

// ─── Slug ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SlugError {
    #[error("slug must not be empty")]
    Empty,
    #[error("slug contains a path separator: {0}")]
    InvalidCharacter(String),
}

/// URL slug of a document or exam, as used in `/api/documents/{slug}/...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    /// Validates and wraps a slug.
    ///
    /// # Errors
    ///
    /// Returns `SlugError::Empty` for blank input and
    /// `SlugError::InvalidCharacter` when the slug would escape its path segment.
    pub fn new(raw: impl Into<String>) -> Result<Self, SlugError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SlugError::Empty);
        }
        if trimmed.contains(['/', '?', '#']) {
            return Err(SlugError::InvalidCharacter(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Slug {
    type Error = SlugError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Slug> for String {
    fn from(value: Slug) -> Self {
        value.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Slug {
    type Err = SlugError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_and_parse() {
        let id = QuestionId::new(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(" 42 ".parse::<QuestionId>().unwrap(), id);
        assert_eq!(format!("{:?}", ChoiceId::new(7)), "ChoiceId(7)");
    }

    #[test]
    fn invalid_id_reports_kind() {
        let err = "abc".parse::<AttemptId>().unwrap_err();
        assert_eq!(err.to_string(), "failed to parse AttemptId from string");
    }

    #[test]
    fn ids_serialize_as_bare_numbers() {
        let json = serde_json::to_string(&vec![ChoiceId::new(1), ChoiceId::new(2)]).unwrap();
        assert_eq!(json, "[1,2]");
    }

    #[test]
    fn slug_is_trimmed_and_validated() {
        assert_eq!(Slug::new("  java-basics ").unwrap().as_str(), "java-basics");
        assert_eq!(Slug::new("   "), Err(SlugError::Empty));
        assert!(matches!(
            Slug::new("a/b"),
            Err(SlugError::InvalidCharacter(_))
        ));
    }
}
