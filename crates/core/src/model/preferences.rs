use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum PreferencesError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("unknown dark mode preference: {0}")]
    UnknownDarkMode(String),
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Vi,
    En,
}

impl Language {
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Language::Vi => "vi",
            Language::En => "en",
        }
    }

    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Language::Vi => Language::En,
            Language::En => Language::Vi,
        }
    }

    /// Picks a language from a locale tag such as `en-US`, if supported.
    #[must_use]
    pub fn from_locale(locale: &str) -> Option<Self> {
        let lower = locale.to_ascii_lowercase();
        if lower.starts_with("vi") {
            Some(Language::Vi)
        } else if lower.starts_with("en") {
            Some(Language::En)
        } else {
            None
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = PreferencesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vi" => Ok(Language::Vi),
            "en" => Ok(Language::En),
            other => Err(PreferencesError::UnsupportedLanguage(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DarkModePreference {
    Dark,
    Light,
    #[default]
    System,
}

impl DarkModePreference {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DarkModePreference::Dark => "dark",
            DarkModePreference::Light => "light",
            DarkModePreference::System => "system",
        }
    }

    /// Resolves the preference against the platform's current scheme.
    #[must_use]
    pub fn is_dark(self, system_prefers_dark: bool) -> bool {
        match self {
            DarkModePreference::Dark => true,
            DarkModePreference::Light => false,
            DarkModePreference::System => system_prefers_dark,
        }
    }
}

impl FromStr for DarkModePreference {
    type Err = PreferencesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dark" => Ok(DarkModePreference::Dark),
            "light" => Ok(DarkModePreference::Light),
            "system" => Ok(DarkModePreference::System),
            other => Err(PreferencesError::UnknownDarkMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessibilityPreferences {
    pub font_size: String,
    pub high_contrast: bool,
    pub reduced_motion: bool,
    pub keyboard_mode: bool,
}

impl Default for AccessibilityPreferences {
    fn default() -> Self {
        Self {
            font_size: "normal".to_string(),
            high_contrast: false,
            reduced_motion: false,
            keyboard_mode: false,
        }
    }
}

/// Reading settings for question explanations. Missing fields keep defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TypographySettings {
    pub explanation_line_length: u32,
    pub mobile_line_length: u32,
    pub line_height: f64,
    pub font_size: f64,
}

impl Default for TypographySettings {
    fn default() -> Self {
        Self {
            explanation_line_length: 80,
            mobile_line_length: 60,
            line_height: 1.7,
            font_size: 0.95,
        }
    }
}

impl TypographySettings {
    /// # Errors
    ///
    /// Returns `PreferencesError::NonPositive` for zero or negative sizes.
    pub fn validate(self) -> Result<Self, PreferencesError> {
        let checks = [
            ("explanation_line_length", f64::from(self.explanation_line_length)),
            ("mobile_line_length", f64::from(self.mobile_line_length)),
            ("line_height", self.line_height),
            ("font_size", self.font_size),
        ];
        for (field, value) in checks {
            if value <= 0.0 || !value.is_finite() {
                return Err(PreferencesError::NonPositive { field, value });
            }
        }
        Ok(self)
    }
}
