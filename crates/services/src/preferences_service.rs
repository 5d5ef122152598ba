use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use quiz_core::model::{AccessibilityPreferences, DarkModePreference, Language, TypographySettings};
use storage::{KeyValueStore, keys};

use crate::error::PreferencesServiceError;

/// Reads and writes per-device preferences.
///
/// A stored value that no longer parses is logged and treated as unset.
pub struct PreferencesService {
    kv: Arc<dyn KeyValueStore>,
}

impl PreferencesService {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    // ─── Language ───────────────────────────────────────────────────────────

    /// Stored language, else the one matching `system_locale`, else Vietnamese.
    ///
    /// # Errors
    ///
    /// Returns `PreferencesServiceError::Storage` if the store cannot be read.
    pub async fn language(
        &self,
        system_locale: Option<&str>,
    ) -> Result<Language, PreferencesServiceError> {
        if let Some(stored) = self.load_parsed::<Language>(keys::LANGUAGE).await? {
            return Ok(stored);
        }
        Ok(system_locale
            .and_then(Language::from_locale)
            .unwrap_or_default())
    }

    /// # Errors
    ///
    /// Returns `PreferencesServiceError::Storage` if the value cannot be stored.
    pub async fn set_language(&self, language: Language) -> Result<(), PreferencesServiceError> {
        self.kv.set(keys::LANGUAGE, language.code()).await?;
        Ok(())
    }

    /// Switch between Vietnamese and English and return the new language.
    ///
    /// # Errors
    ///
    /// Returns `PreferencesServiceError::Storage` on store failures.
    pub async fn toggle_language(
        &self,
        system_locale: Option<&str>,
    ) -> Result<Language, PreferencesServiceError> {
        let next = self.language(system_locale).await?.toggled();
        self.set_language(next).await?;
        Ok(next)
    }

    // ─── Dark mode ──────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns `PreferencesServiceError::Storage` if the store cannot be read.
    pub async fn dark_mode(&self) -> Result<DarkModePreference, PreferencesServiceError> {
        Ok(self
            .load_parsed::<DarkModePreference>(keys::DARK_MODE)
            .await?
            .unwrap_or_default())
    }

    /// # Errors
    ///
    /// Returns `PreferencesServiceError::Storage` if the value cannot be stored.
    pub async fn set_dark_mode(
        &self,
        preference: DarkModePreference,
    ) -> Result<(), PreferencesServiceError> {
        self.kv.set(keys::DARK_MODE, preference.as_str()).await?;
        Ok(())
    }

    // ─── Accessibility ──────────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns `PreferencesServiceError::Storage` if the store cannot be read.
    pub async fn accessibility(&self) -> Result<AccessibilityPreferences, PreferencesServiceError> {
        self.load_json(keys::ACCESSIBILITY).await
    }

    /// # Errors
    ///
    /// Returns `PreferencesServiceError` if the value cannot be encoded or stored.
    pub async fn set_accessibility(
        &self,
        preferences: &AccessibilityPreferences,
    ) -> Result<(), PreferencesServiceError> {
        self.store_json(keys::ACCESSIBILITY, preferences).await
    }

    // ─── Typography ─────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns `PreferencesServiceError::Storage` if the store cannot be read.
    pub async fn typography(&self) -> Result<TypographySettings, PreferencesServiceError> {
        let settings: TypographySettings = self.load_json(keys::TYPOGRAPHY).await?;
        match settings.validate() {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::warn!(error = %err, "stored typography settings invalid, using defaults");
                Ok(TypographySettings::default())
            }
        }
    }

    /// Validate and store new typography settings.
    ///
    /// # Errors
    ///
    /// Returns `PreferencesServiceError::Preferences` for non-positive sizes
    /// and `Storage`/`Serialization` errors from the write.
    pub async fn set_typography(
        &self,
        settings: TypographySettings,
    ) -> Result<TypographySettings, PreferencesServiceError> {
        let settings = settings.validate()?;
        self.store_json(keys::TYPOGRAPHY, &settings).await?;
        Ok(settings)
    }

    /// # Errors
    ///
    /// Returns `PreferencesServiceError::Storage` if the value cannot be removed.
    pub async fn reset_typography(&self) -> Result<TypographySettings, PreferencesServiceError> {
        self.kv.remove(keys::TYPOGRAPHY).await?;
        Ok(TypographySettings::default())
    }

    // ─── Helpers ────────────────────────────────────────────────────────────

    async fn load_parsed<T>(&self, key: &str) -> Result<Option<T>, PreferencesServiceError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = self.kv.get(key).await? else {
            return Ok(None);
        };
        match raw.parse::<T>() {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::warn!(key, error = %err, "ignoring stored preference");
                Ok(None)
            }
        }
    }

    async fn load_json<T>(&self, key: &str) -> Result<T, PreferencesServiceError>
    where
        T: DeserializeOwned + Default,
    {
        let Some(raw) = self.kv.get(key).await? else {
            return Ok(T::default());
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::warn!(key, error = %err, "ignoring stored preference");
                Ok(T::default())
            }
        }
    }

    async fn store_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), PreferencesServiceError> {
        let raw = serde_json::to_string(value)?;
        self.kv.set(key, &raw).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use storage::InMemoryStore;

    use super::*;

    fn service(entries: &[(&'static str, &'static str)]) -> (PreferencesService, Arc<InMemoryStore>) {
        let kv = Arc::new(InMemoryStore::with_entries(entries.iter().copied()));
        (PreferencesService::new(kv.clone()), kv)
    }

    #[tokio::test]
    async fn language_prefers_stored_then_locale_then_vietnamese() {
        let (prefs, _) = service(&[]);
        assert_eq!(prefs.language(None).await.unwrap(), Language::Vi);
        assert_eq!(prefs.language(Some("en-GB")).await.unwrap(), Language::En);
        assert_eq!(prefs.language(Some("fr-FR")).await.unwrap(), Language::Vi);

        let (prefs, _) = service(&[(keys::LANGUAGE, "en")]);
        assert_eq!(prefs.language(Some("vi-VN")).await.unwrap(), Language::En);
    }

    #[tokio::test]
    async fn toggle_persists_new_language() {
        let (prefs, kv) = service(&[(keys::LANGUAGE, "vi")]);
        assert_eq!(prefs.toggle_language(None).await.unwrap(), Language::En);
        assert_eq!(kv.get(keys::LANGUAGE).await.unwrap().as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn invalid_stored_values_fall_back_to_defaults() {
        let (prefs, _) = service(&[
            (keys::LANGUAGE, "klingon"),
            (keys::DARK_MODE, "sepia"),
            (keys::ACCESSIBILITY, "not json"),
            (keys::TYPOGRAPHY, r#"{"lineHeight": -1}"#),
        ]);
        assert_eq!(prefs.language(None).await.unwrap(), Language::Vi);
        assert_eq!(prefs.dark_mode().await.unwrap(), DarkModePreference::System);
        assert_eq!(
            prefs.accessibility().await.unwrap(),
            AccessibilityPreferences::default()
        );
        assert_eq!(
            prefs.typography().await.unwrap(),
            TypographySettings::default()
        );
    }

    #[tokio::test]
    async fn typography_is_validated_and_partial_json_keeps_defaults() {
        let (prefs, kv) = service(&[(keys::TYPOGRAPHY, r#"{"fontSize": 1.1}"#)]);
        let loaded = prefs.typography().await.unwrap();
        assert!((loaded.font_size - 1.1).abs() < f64::EPSILON);
        assert_eq!(loaded.explanation_line_length, 80);

        let bad = TypographySettings {
            mobile_line_length: 0,
            ..TypographySettings::default()
        };
        assert!(matches!(
            prefs.set_typography(bad).await,
            Err(PreferencesServiceError::Preferences(_))
        ));

        prefs.reset_typography().await.unwrap();
        assert_eq!(kv.get(keys::TYPOGRAPHY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn accessibility_round_trips_with_camel_case_keys() {
        let (prefs, kv) = service(&[]);
        let wanted = AccessibilityPreferences {
            font_size: "large".into(),
            high_contrast: true,
            reduced_motion: false,
            keyboard_mode: true,
        };
        prefs.set_accessibility(&wanted).await.unwrap();
        let raw = kv.get(keys::ACCESSIBILITY).await.unwrap().unwrap();
        assert!(raw.contains("\"highContrast\":true"));
        assert_eq!(prefs.accessibility().await.unwrap(), wanted);
    }
}
